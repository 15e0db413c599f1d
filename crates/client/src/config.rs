use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use rebound::{DEFAULT_PORT, DEFAULT_TICK_RATE};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub tick_rate: u32,
    pub width: f64,
    pub height: f64,
    pub square_size: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            tick_rate: DEFAULT_TICK_RATE,
            width: 800.0,
            height: 600.0,
            square_size: 80.0,
        }
    }
}
