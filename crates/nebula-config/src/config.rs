//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest accepted retry backoff multiplier.
pub const MAX_BACKOFF_MULTIPLIER: f64 = 16.0;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Network transport settings.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Game server host name or address.
    pub server_address: String,
    /// Game server port.
    pub server_port: u16,
    /// Upper bound on a single connect handshake, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Connect attempts made before giving up and reporting a terminal failure.
    pub max_connect_attempts: u32,
    /// Initial capacity of the receive buffer in bytes.
    pub inbound_buffer_bytes: usize,
    /// Largest frame payload accepted from or sent to the server, in bytes.
    pub max_frame_bytes: u32,
    /// Delay before the first automatic retry, in milliseconds.
    pub retry_initial_delay_ms: u64,
    /// Cap on the delay between automatic retries, in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Multiplier applied to the retry delay after each failure.
    pub retry_backoff_multiplier: f64,
    /// Jitter factor (0.0 - 1.0) applied as +/- to each retry delay.
    pub retry_jitter: f64,
    /// How long a request may wait for any reply before the UI is told, in
    /// milliseconds. 0 disables the signal.
    pub reply_wait_threshold_ms: u64,
    /// Send queue length at which a warning is logged.
    pub queue_warn_len: usize,
    /// Disable Nagle's algorithm on the client socket.
    pub tcp_nodelay: bool,
    /// Enable TCP keepalive probes.
    pub keepalive_enabled: bool,
    /// Idle time before the first keepalive probe, in seconds.
    pub keepalive_idle_secs: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 7777,
            connect_timeout_ms: 10_000,
            max_connect_attempts: 3,
            inbound_buffer_bytes: 64 * 1024,
            max_frame_bytes: 1_048_576,
            retry_initial_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            retry_backoff_multiplier: 2.0,
            retry_jitter: 0.25,
            reply_wait_threshold_ms: 3_000,
            queue_warn_len: 1024,
            tcp_nodelay: true,
            keepalive_enabled: true,
            keepalive_idle_secs: 60,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values the transport cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let net = &self.network;
        if net.server_address.trim().is_empty() {
            return Err(ConfigError::Invalid("server_address is empty".into()));
        }
        if net.max_connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_connect_attempts must be at least 1".into(),
            ));
        }
        if net.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be non-zero".into(),
            ));
        }
        if net.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("max_frame_bytes must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&net.retry_jitter) {
            return Err(ConfigError::Invalid(format!(
                "retry_jitter {} is outside 0.0..=1.0",
                net.retry_jitter
            )));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&net.retry_backoff_multiplier) {
            return Err(ConfigError::Invalid(format!(
                "retry_backoff_multiplier {} is outside 1.0..={MAX_BACKOFF_MULTIPLIER}",
                net.retry_backoff_multiplier
            )));
        }
        if net.retry_max_delay_ms < net.retry_initial_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry_max_delay_ms {} is below retry_initial_delay_ms {}",
                net.retry_max_delay_ms, net.retry_initial_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("server_port: 7777"));
        assert!(ron_str.contains("connect_timeout_ms: 10000"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(network: (server_port: 9000))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.network.server_port, 9000);
        assert_eq!(config.network.max_connect_attempts, 3);
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.network.server_address = "10.0.0.1".to_string();
        config.network.max_connect_attempts = 5;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.network.connect_timeout_ms = 2_500;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().network.connect_timeout_ms, 2_500);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.network.max_connect_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_jitter() {
        let mut config = Config::default();
        config.network.retry_jitter = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_unbounded_backoff_multiplier() {
        for multiplier in [1e30, f64::INFINITY, 0.5, 16.5] {
            let mut config = Config::default();
            config.network.retry_backoff_multiplier = multiplier;
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "multiplier {multiplier} should be rejected"
            );
        }

        let mut config = Config::default();
        config.network.retry_backoff_multiplier = 16.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nan_multiplier_from_file() {
        let config: Config =
            ron::from_str("(network: (retry_backoff_multiplier: NaN))").unwrap();
        assert!(config.network.retry_backoff_multiplier.is_nan());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_max_delay_below_initial() {
        let mut config = Config::default();
        config.network.retry_initial_delay_ms = 5_000;
        config.network.retry_max_delay_ms = 1_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(network: (max_frame_bytes: 0))",
        )
        .unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }
}
