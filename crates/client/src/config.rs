//! Client configuration

use std::env;
use std::time::Duration;

/// Bound on a single connection attempt (10 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Application-level keepalive interval while connected (30 seconds)
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// First reconnection delay; doubles before each further attempt
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Consecutive reconnection attempts before the session is marked failed
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Typing indicators expire this long after their last refresh
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(4);

/// Messages requested per history page
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// Client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the request/response API, e.g. "https://api.plexmcp.com/api/v1"
    pub api_base_url: String,
    /// Live channel endpoint, e.g. "wss://api.plexmcp.com/ws"
    pub ws_url: String,

    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub typing_ttl: Duration,
    pub history_page_size: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: env::var("TICKETLINK_API_URL")
                .map_err(|_| ConfigError::Missing("TICKETLINK_API_URL"))?,
            ws_url: env::var("TICKETLINK_WS_URL")
                .map_err(|_| ConfigError::Missing("TICKETLINK_WS_URL"))?,
            connect_timeout: env_duration_ms("TICKETLINK_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT),
            keepalive_interval: env_duration_ms(
                "TICKETLINK_KEEPALIVE_INTERVAL_MS",
                DEFAULT_KEEPALIVE_INTERVAL,
            ),
            reconnect_base_delay: env_duration_ms(
                "TICKETLINK_RECONNECT_BASE_DELAY_MS",
                DEFAULT_RECONNECT_BASE_DELAY,
            ),
            max_reconnect_attempts: env_u32(
                "TICKETLINK_MAX_RECONNECT_ATTEMPTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ),
            typing_ttl: env_duration_ms("TICKETLINK_TYPING_TTL_MS", DEFAULT_TYPING_TTL),
            history_page_size: env_u32("TICKETLINK_HISTORY_PAGE_SIZE", DEFAULT_HISTORY_PAGE_SIZE),
        })
    }

    /// Build a configuration for explicit endpoints, all tunables at defaults
    pub fn for_endpoints(api_base_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_url: ws_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            typing_ttl: DEFAULT_TYPING_TTL,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }
}

fn env_duration_ms(var: &str, default: Duration) -> Duration {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_u32(var: &str, default: u32) -> u32 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
