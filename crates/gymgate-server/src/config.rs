//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`; `0` auto-assigns).
    pub port: u16,
    /// Seconds a fresh connection may take to send its registration frame
    /// (`0` disables the bound).
    pub registration_timeout_secs: u64,
    /// Idle bound on the liveness read in seconds (`0`, the default, keeps
    /// the read unbounded; the blocking read is the disconnect detector).
    pub idle_timeout_secs: u64,
    /// Outbound frame queue depth per connection.
    pub channel_capacity: usize,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            registration_timeout_secs: 30,
            idle_timeout_secs: 0,
            channel_capacity: 32,
            max_message_size: 64 * 1024,
        }
    }
}
