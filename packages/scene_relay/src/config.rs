use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::RelayError;

// =============================================================================
// File config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
//   relay.toml:      [server]
//                    producer_port = 9091
//
//   env var:         RELAY_SERVER__PRODUCER_PORT=9091   (double underscore = nesting)

/// Placeholder forwarded by `POST /log` when the body carries no message.
pub const DEFAULT_PLACEHOLDER: &str = "(empty)";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener addresses (lives under `[server]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_producer_port")]
    pub producer_port: u16,
    #[serde(default = "default_consumer_port")]
    pub consumer_port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            producer_port: default_producer_port(),
            consumer_port: default_consumer_port(),
        }
    }
}

/// Fan-out tuning knobs (lives under `[relay]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    /// Upper bound on how long one fan-out waits for a single peer's queue.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Outbound frames buffered per connection before sends start waiting.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
            placeholder: default_placeholder(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    9090
}
fn default_producer_port() -> u16 {
    9091
}
fn default_consumer_port() -> u16 {
    9092
}
fn default_send_timeout_ms() -> u64 {
    5000
}
fn default_outbound_buffer() -> usize {
    64
}
fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

/// Build a figment that layers: defaults → relay.toml (if given) → RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_SERVER__HOST=127.0.0.1`  →  `server.host = "127.0.0.1"`
///   `RELAY_RELAY__SEND_TIMEOUT_MS=250`  →  `relay.send_timeout_ms = 250`
pub fn load_config(config_path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the relay)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub http_addr: SocketAddr,
    pub producer_addr: SocketAddr,
    pub consumer_addr: SocketAddr,
    pub send_timeout: Duration,
    pub outbound_buffer: usize,
    pub placeholder: String,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, RelayError> {
        let host: IpAddr = fc
            .server
            .host
            .parse()
            .map_err(|e| RelayError::Config(format!("server.host {:?}: {}", fc.server.host, e)))?;

        if fc.relay.outbound_buffer == 0 {
            return Err(RelayError::Config(
                "relay.outbound_buffer must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            http_addr: SocketAddr::new(host, fc.server.http_port),
            producer_addr: SocketAddr::new(host, fc.server.producer_port),
            consumer_addr: SocketAddr::new(host, fc.server.consumer_port),
            send_timeout: Duration::from_millis(fc.relay.send_timeout_ms),
            outbound_buffer: fc.relay.outbound_buffer,
            placeholder: fc.relay.placeholder.clone(),
        })
    }

    /// Everything on 127.0.0.1 with OS-assigned ports.
    pub fn ephemeral() -> Self {
        let localhost: SocketAddr = ([127, 0, 0, 1], 0).into();
        Self {
            http_addr: localhost,
            producer_addr: localhost,
            consumer_addr: localhost,
            send_timeout: Duration::from_millis(default_send_timeout_ms()),
            outbound_buffer: default_outbound_buffer(),
            placeholder: default_placeholder(),
        }
    }
}
