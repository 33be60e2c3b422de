//! `netplay_client`
//!
//! Client-side systems:
//! - Room connection (join handshake + non-blocking message channels)
//! - Input sampling into per-tick snapshots
//! - Fixed timestep accumulator
//! - Local prediction (no reconciliation)
//! - Interpolation of remote players toward their last server position

pub mod client;
pub mod input;
pub mod interp;
pub mod scene;
pub mod timestep;

pub use client::{Room, RoomConnector, TcpConnector};
pub use scene::GameScene;
