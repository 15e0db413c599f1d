use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 55555;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Full-state resync cadence, independent of delta traffic.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);
pub const READ_CHUNK_SIZE: usize = 1024;
pub const HANDSHAKE_READ_SIZE: usize = 1024;
pub const RETRY_BACKOFF: Duration = Duration::from_millis(10);

pub const HANDSHAKE_STATUS_SUCCESS: &str = "SUCCESS";

/// Canonical wire precision: numeric fields are rounded to 2 decimals before
/// comparison and transmission, so float noise never generates traffic.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[inline]
pub fn normalize_direction(degrees: f64) -> f64 {
    let mut normalized = degrees % 360.0;
    if normalized < 0.0 {
        normalized += 360.0;
    }
    normalized
}

/// The synchronized payload: a single moving entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub x: f64,
    pub y: f64,
    pub velocity: f64,
    pub direction: f64,
    pub color: [u8; 3],
}

impl EntityState {
    pub fn rounded(&self) -> Self {
        Self {
            x: round2(self.x),
            y: round2(self.y),
            velocity: round2(self.velocity),
            direction: round2(self.direction),
            color: self.color,
        }
    }

    /// Overwrites only the fields present in the patch. The server sends full
    /// state by convention, but corrections are applied as partial patches.
    pub fn apply(&mut self, patch: &StatePatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(velocity) = patch.velocity {
            self.velocity = velocity;
        }
        if let Some(direction) = patch.direction {
            self.direction = direction;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
    }
}

/// A subset of [`EntityState`] fields. Absent fields are omitted from the
/// wire entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
}

impl StatePatch {
    pub fn full(state: &EntityState) -> Self {
        Self {
            x: Some(state.x),
            y: Some(state.y),
            velocity: Some(state.velocity),
            direction: Some(state.direction),
            color: Some(state.color),
        }
    }

    /// Fields of `current` whose rounded value differs from `prev`. With no
    /// baseline every field counts as changed.
    pub fn diff(prev: Option<&EntityState>, current: &EntityState) -> Self {
        let current = current.rounded();
        let Some(prev) = prev else {
            return Self::full(&current);
        };
        let prev = prev.rounded();
        Self {
            x: (current.x != prev.x).then_some(current.x),
            y: (current.y != prev.y).then_some(current.y),
            velocity: (current.velocity != prev.velocity).then_some(current.velocity),
            direction: (current.direction != prev.direction).then_some(current.direction),
            color: (current.color != prev.color).then_some(current.color),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.velocity.is_none()
            && self.direction.is_none()
            && self.color.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "CONNECT")]
    Connect,
    #[serde(rename = "delta")]
    Delta { state: StatePatch },
    #[serde(rename = "snapshot")]
    Snapshot { state: EntityState },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "response")]
    Response { status: String },
    #[serde(rename = "authoritative")]
    Authoritative { state: StatePatch },
}
