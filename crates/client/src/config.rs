//! Client configuration from environment variables.

use std::time::Duration;

use awachat_shared::CHAT_SOCKET_PATH;

use crate::error::ConfigError;
use crate::ws::ReconnectConfig;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Tunables of the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Path appended to the socket origin, e.g. `/api/ws/chat`.
    pub socket_path: String,
    pub reconnect: ReconnectConfig,
    pub heartbeat_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            socket_path: CHAT_SOCKET_PATH.to_string(),
            reconnect: ReconnectConfig::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Everything the binary needs to start a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Origin of the chat server (`http://` or `https://`).
    pub base_url: String,
    pub manager: ManagerConfig,
}

impl ClientConfig {
    /// Read configuration from the process environment.
    ///
    /// Environment variables:
    /// - `AWACHAT_BASE_URL`: server origin (default: "http://localhost:8080")
    /// - `AWACHAT_WS_PATH`: socket path (default: "/api/ws/chat")
    /// - `AWACHAT_RECONNECT_DELAY_MS`: delay between reconnect attempts (default: 3000)
    /// - `AWACHAT_RECONNECT_MAX_ATTEMPTS`: reconnect budget (default: 5)
    /// - `AWACHAT_HEARTBEAT_INTERVAL_MS`: heartbeat period (default: 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ManagerConfig::default();

        let base_url = lookup("AWACHAT_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let socket_path = lookup("AWACHAT_WS_PATH").unwrap_or(defaults.socket_path);

        let delay = parse_number(&lookup, "AWACHAT_RECONNECT_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.reconnect.delay);
        let max_attempts = match parse_number(&lookup, "AWACHAT_RECONNECT_MAX_ATTEMPTS")? {
            Some(n) => u32::try_from(n).map_err(|_| ConfigError {
                key: "AWACHAT_RECONNECT_MAX_ATTEMPTS".into(),
                value: n.to_string(),
                reason: "out of range".into(),
            })?,
            None => defaults.reconnect.max_attempts,
        };
        let heartbeat_interval = match parse_number(&lookup, "AWACHAT_HEARTBEAT_INTERVAL_MS")? {
            Some(0) => {
                return Err(ConfigError {
                    key: "AWACHAT_HEARTBEAT_INTERVAL_MS".into(),
                    value: "0".into(),
                    reason: "must be greater than zero".into(),
                })
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.heartbeat_interval,
        };

        Ok(Self {
            base_url,
            manager: ManagerConfig {
                socket_path,
                reconnect: ReconnectConfig {
                    max_attempts,
                    delay,
                },
                heartbeat_interval,
            },
        })
    }
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim().parse::<u64>().map(Some).map_err(|e| ConfigError {
        key: key.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })
}
