//! Configuration for the murmur sync client.
//!
//! Loaded from TOML or built in code. Every timeout the sync layer relies on
//! is listed here explicitly; none are left to transport defaults.

use murmur_sync_core::ReconnectPolicy;
use murmur_sync_types::SyncError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the sync client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Event channel endpoint (default: ws://localhost:3002).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-call persistence timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Connection handshake timeout in milliseconds (default: 20000).
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Automatic reconnection after an unexpected drop.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// How long a pending send waits for its echo before the durable
    /// result is applied, in milliseconds (default: 1000).
    #[serde(default = "default_echo_grace_ms")]
    pub echo_grace_ms: u64,
    /// Local typing idle window in milliseconds (default: 1000).
    #[serde(default = "default_typing_idle_ms")]
    pub typing_idle_ms: u64,
    /// Max age of a peer's typing entry in milliseconds (default: 3000).
    #[serde(default = "default_typing_expiry_ms")]
    pub typing_expiry_ms: u64,
    /// Typing expiry sweep interval in milliseconds (default: 1000).
    #[serde(default = "default_presence_sweep_ms")]
    pub presence_sweep_ms: u64,
    /// Inbound event buffer capacity, for the session sink and observers (default: 256).
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Reconnection backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a single delay in milliseconds (default: 5000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retries before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Random jitter added to each delay in milliseconds (default: 500).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

// Default value functions
fn default_endpoint() -> String {
    "ws://localhost:3002".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_handshake_timeout_ms() -> u64 {
    20_000
}

fn default_echo_grace_ms() -> u64 {
    1_000
}

fn default_typing_idle_ms() -> u64 {
    1_000
}

fn default_typing_expiry_ms() -> u64 {
    3_000
}

fn default_presence_sweep_ms() -> u64 {
    1_000
}

fn default_event_buffer() -> usize {
    256
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_jitter_ms() -> u64 {
    500
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_ms: default_request_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            reconnect: ReconnectConfig::default(),
            echo_grace_ms: default_echo_grace_ms(),
            typing_idle_ms: default_typing_idle_ms(),
            typing_expiry_ms: default_typing_expiry_ms(),
            presence_sweep_ms: default_presence_sweep_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl SyncConfig {
    /// Create a configuration for `endpoint` with default timings.
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every duration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("echo_grace_ms", self.echo_grace_ms),
            ("typing_idle_ms", self.typing_idle_ms),
            ("typing_expiry_ms", self.typing_expiry_ms),
            ("presence_sweep_ms", self.presence_sweep_ms),
            ("reconnect.base_delay_ms", self.reconnect.base_delay_ms),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be greater than zero", field)));
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(ConfigError::Invalid(
                "reconnect.max_delay_ms must not be below reconnect.base_delay_ms".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be greater than zero".into()));
        }
        Ok(())
    }

    /// Set the per-call persistence timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the connection handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the reconnection attempt cap.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    /// Set the reconnection jitter bound.
    pub fn with_reconnect_jitter(mut self, jitter: Duration) -> Self {
        self.reconnect.max_jitter_ms = jitter.as_millis() as u64;
        self
    }

    /// Set the echo grace window.
    pub fn with_echo_grace(mut self, grace: Duration) -> Self {
        self.echo_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Set the local typing idle window.
    pub fn with_typing_idle(mut self, idle: Duration) -> Self {
        self.typing_idle_ms = idle.as_millis() as u64;
        self
    }

    /// Set the peer typing expiry.
    pub fn with_typing_expiry(mut self, expiry: Duration) -> Self {
        self.typing_expiry_ms = expiry.as_millis() as u64;
        self
    }

    /// Per-call persistence timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Connection handshake timeout.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Echo grace window.
    pub fn echo_grace(&self) -> Duration {
        Duration::from_millis(self.echo_grace_ms)
    }

    /// Local typing idle window.
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    /// Peer typing expiry.
    pub fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms)
    }

    /// Typing sweep interval.
    pub fn presence_sweep(&self) -> Duration {
        Duration::from_millis(self.presence_sweep_ms)
    }

    /// Backoff policy for the connection state machine.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
            max_jitter: Duration::from_millis(self.reconnect.max_jitter_ms),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}
