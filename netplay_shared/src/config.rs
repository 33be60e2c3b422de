//! Configuration system.
//!
//! Loads client configuration from JSON strings (file IO left to app).

use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Room host address, e.g. `127.0.0.1:2567`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Name of the room to join or create.
    #[serde(default = "default_room_name")]
    pub room_name: String,
    /// Viewport width, sent as a join option.
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    /// Viewport height, sent as a join option.
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
    /// Render frame rate of the headless client.
    #[serde(default = "default_frame_hz")]
    pub frame_hz: u32,
}

fn default_server_addr() -> String {
    "127.0.0.1:2567".to_string()
}

fn default_room_name() -> String {
    "my_room".to_string()
}

fn default_screen_width() -> u32 {
    800
}

fn default_screen_height() -> u32 {
    600
}

fn default_frame_hz() -> u32 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            room_name: default_room_name(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            frame_hz: default_frame_hz(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
