mod config;
mod game;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use rebound::Session;

use config::ClientConfig;
use game::GameState;

#[derive(Parser)]
#[command(name = "rebound")]
#[command(about = "Networked bouncing square client")]
struct Args {
    #[arg(
        short,
        long,
        help = "Server address to connect to (e.g., 127.0.0.1:55555)"
    )]
    server: Option<SocketAddr>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let mut config = ClientConfig::default();
    if let Some(server) = args.server {
        config.server = server;
    }

    let session = Session::connect(config.server)
        .with_context(|| format!("failed to connect to {}", config.server))?;

    run_game(session, &config);
    Ok(())
}

/// Fixed-cadence simulation loop: integrate motion, synchronize, pace.
/// Runs until the session reports the connection lost.
fn run_game(mut session: Session, config: &ClientConfig) {
    let mut game = GameState::new(config);
    let tick = Duration::from_secs(1) / config.tick_rate;
    let mut next_tick = Instant::now() + tick;

    while session.is_connected() {
        game.step();
        session.tick(&mut game.entity, Instant::now());

        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        }
        next_tick += tick;
    }

    log::warn!("Connection lost, shutting down");
    session.disconnect();
}
