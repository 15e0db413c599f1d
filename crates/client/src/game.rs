use rebound::{EntityState, normalize_direction};

use crate::config::ClientConfig;

/// Local simulation of the bouncing square: straight-line motion reflected
/// off the arena walls. The session owns all synchronization; this only
/// produces and accepts [`EntityState`] values.
pub struct GameState {
    pub entity: EntityState,
    width: f64,
    height: f64,
    square_size: f64,
}

impl GameState {
    pub fn new(config: &ClientConfig) -> Self {
        let entity = EntityState {
            x: rand_unit() * (config.width - config.square_size),
            y: rand_unit() * (config.height - config.square_size),
            velocity: 3.0 * std::f64::consts::SQRT_2,
            direction: 5.0,
            color: [255, 0, 0],
        };
        Self {
            entity,
            width: config.width,
            height: config.height,
            square_size: config.square_size,
        }
    }

    /// One tick of motion integration.
    pub fn step(&mut self) {
        let radians = self.entity.direction.to_radians();
        self.entity.x += self.entity.velocity * radians.cos();
        self.entity.y += self.entity.velocity * radians.sin();

        if self.entity.x <= 0.0 || self.entity.x + self.square_size >= self.width {
            self.entity.direction = 180.0 - self.entity.direction;
        }
        if self.entity.y <= 0.0 || self.entity.y + self.square_size >= self.height {
            self.entity.direction = -self.entity.direction;
        }
        self.entity.direction = normalize_direction(self.entity.direction);
    }
}

fn rand_unit() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64,
    );
    (hasher.finish() % 10000) as f64 / 10000.0
}
