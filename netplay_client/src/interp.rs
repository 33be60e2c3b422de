//! Interpolation.
//!
//! The room host reports remote players at whatever rate it likes. The client
//! keeps the last reported position per session and, every fixed tick, moves
//! the displayed position a constant fraction of the way there.

use std::collections::HashMap;

use netplay_shared::{math::Vec2, net::SessionId};

/// Fraction of the remaining distance covered per tick.
pub const INTERPOLATION_FACTOR: f32 = 0.2;

/// Last known authoritative position per remote session.
#[derive(Debug, Default)]
pub struct ServerPositions {
    positions: HashMap<SessionId, Vec2>,
}

impl ServerPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, session_id: SessionId, position: Vec2) {
        self.positions.insert(session_id, position);
    }

    pub fn get(&self, session_id: &SessionId) -> Option<Vec2> {
        self.positions.get(session_id).copied()
    }

    pub fn remove(&mut self, session_id: &SessionId) -> Option<Vec2> {
        self.positions.remove(session_id)
    }
}

/// One tick of exponential smoothing toward `target`.
pub fn smooth_toward(current: Vec2, target: Vec2) -> Vec2 {
    current.lerp(target, INTERPOLATION_FACTOR)
}
