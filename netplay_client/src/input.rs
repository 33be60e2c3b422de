//! Input handling.
//!
//! In a real client this would integrate with windowing and raw keyboard
//! events. Here the keyboard is anything that can answer "is this key held",
//! sampled once per fixed tick into an [`InputSnapshot`].

use std::str::FromStr;

use anyhow::bail;
use netplay_shared::{math::Vec2, net::InputSnapshot};

/// Units moved per tick along each held axis.
pub const VELOCITY: f32 = 2.0;

/// Cursor keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
}

impl FromStr for Key {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Key::Left),
            "right" => Ok(Key::Right),
            "up" => Ok(Key::Up),
            "down" => Ok(Key::Down),
            other => bail!("unknown key {other:?}"),
        }
    }
}

/// Source of current keyboard state.
pub trait KeyboardState {
    fn is_down(&self, key: Key) -> bool;
}

/// Plain set of held cursor keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorKeys {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl CursorKeys {
    /// Parses a comma separated list such as `"left,up"`.
    pub fn parse_list(list: &str) -> anyhow::Result<Self> {
        let mut keys = CursorKeys::default();
        for part in list.split(',').filter(|p| !p.trim().is_empty()) {
            keys.press(part.parse()?);
        }
        Ok(keys)
    }

    pub fn press(&mut self, key: Key) {
        *self.slot(key) = true;
    }

    fn slot(&mut self, key: Key) -> &mut bool {
        match key {
            Key::Left => &mut self.left,
            Key::Right => &mut self.right,
            Key::Up => &mut self.up,
            Key::Down => &mut self.down,
        }
    }
}

impl KeyboardState for CursorKeys {
    fn is_down(&self, key: Key) -> bool {
        match key {
            Key::Left => self.left,
            Key::Right => self.right,
            Key::Up => self.up,
            Key::Down => self.down,
        }
    }
}

/// Samples the keyboard into the snapshot for `tick`.
pub fn sample_input(keys: &impl KeyboardState, tick: u32) -> InputSnapshot {
    InputSnapshot {
        left: keys.is_down(Key::Left),
        right: keys.is_down(Key::Right),
        up: keys.is_down(Key::Up),
        down: keys.is_down(Key::Down),
        tick,
    }
}

/// Displacement for one tick of held input.
///
/// Left wins over right and up wins over down; the two axes combine.
pub fn movement(input: &InputSnapshot) -> Vec2 {
    let mut delta = Vec2::ZERO;
    if input.left {
        delta.x -= VELOCITY;
    } else if input.right {
        delta.x += VELOCITY;
    }
    if input.up {
        delta.y -= VELOCITY;
    } else if input.down {
        delta.y += VELOCITY;
    }
    delta
}
