//! Network configuration types for the Gabriel gateway.

use std::path::PathBuf;
use std::time::Duration;

/// Default port clients connect to.
pub const DEFAULT_PORT: u16 = 9098;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
    /// Per-connection settings.
    pub connection: ConnectionConfig,
    /// Maximum time to wait for an HTTP request (including the WebSocket
    /// upgrade handshake) to complete.
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tls: None,
            connection: ConnectionConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file.
    pub cert_path: PathBuf,
    /// Path to the TLS private key file.
    pub key_path: PathBuf,
}

/// Per-connection configuration controlling backpressure and message limits.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of each session's outbound queue (welcome, results, error replies).
    pub outbound_channel_capacity: usize,
    /// Maximum time to wait for space in a session's outbound queue.
    pub send_timeout: Duration,
    /// Largest incoming WebSocket message accepted. `None` keeps the
    /// WebSocket library's default limit.
    pub max_message_size: Option<usize>,
    /// WebSocket write buffer size in bytes.
    pub ws_write_buffer_size: usize,
    /// Maximum WebSocket write buffer size in bytes.
    pub ws_max_write_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 256,
            send_timeout: Duration::from_secs(5),
            max_message_size: None,
            ws_write_buffer_size: 131_072,     // 128 KB
            ws_max_write_buffer_size: 524_288, // 512 KB
        }
    }
}
