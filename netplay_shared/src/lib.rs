//! `netplay_shared`
//!
//! Types shared by the room client and anything that talks to it.
//!
//! Design goals:
//! - Explicit, versionable wire types (serde + JSON frames).
//! - The client never owns authoritative state; it only mirrors notifications.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
