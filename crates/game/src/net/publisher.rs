use std::time::Instant;

use super::protocol::{ClientMessage, EntityState, StatePatch, SNAPSHOT_INTERVAL};

/// Computes per-tick outbound traffic: a delta when anything changed, plus a
/// periodic full snapshot as a resync safety net.
#[derive(Debug)]
pub struct StatePublisher {
    last_sent: Option<EntityState>,
    last_snapshot_at: Instant,
}

impl StatePublisher {
    pub fn new(now: Instant) -> Self {
        Self {
            last_sent: None,
            last_snapshot_at: now,
        }
    }

    /// Returns zero, one, or two messages for this tick. After any message,
    /// the change-detection baseline reflects the full state as of the send.
    pub fn publish(&mut self, state: &EntityState, now: Instant) -> Vec<ClientMessage> {
        let mut out = Vec::with_capacity(2);
        let current = state.rounded();

        let delta = StatePatch::diff(self.last_sent.as_ref(), &current);
        if !delta.is_empty() {
            out.push(ClientMessage::Delta { state: delta });
            self.last_sent = Some(current);
        }

        if now.duration_since(self.last_snapshot_at) >= SNAPSHOT_INTERVAL {
            out.push(ClientMessage::Snapshot { state: current });
            self.last_snapshot_at = now;
            // A snapshot carries every field, so it is a full baseline too.
            self.last_sent = Some(current);
        }

        out
    }
}
