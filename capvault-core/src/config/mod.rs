use std::time::Duration;

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config as Cfg, Environment, File};
use serde::Deserialize;
use validator::Validate;

use crate::error::ClientError;

/// Runtime settings shared by every capvault client.
///
/// Loaded from an optional `capvault` config file, then `CAPVAULT__*`
/// environment variables (after `.env` is read).
#[derive(Debug, Deserialize, Clone, Validate)]
pub struct Settings {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    /// Delay between authorization status polls.
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
    /// How long a single authorization may stay pending.
    #[serde(default = "default_auth_timeout_secs")]
    #[validate(range(min = 1))]
    pub auth_timeout_secs: u64,
    /// Upper bound on concurrent per-server calls during a fan-out.
    #[serde(default = "default_max_in_flight")]
    #[validate(range(min = 1))]
    pub max_in_flight: usize,
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,
}

fn default_service_name() -> String {
    "capvault-client".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_auth_timeout_secs() -> u64 {
    60
}

fn default_max_in_flight() -> usize {
    8
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
            poll_interval_ms: default_poll_interval_ms(),
            auth_timeout_secs: default_auth_timeout_secs(),
            max_in_flight: default_max_in_flight(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();

        Self::from_builder(
            Cfg::builder()
                .add_source(File::with_name("capvault").required(false))
                .add_source(Environment::with_prefix("CAPVAULT").separator("__")),
        )
    }

    /// Build settings from an arbitrary source stack and validate them.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ClientError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.auth_timeout(), Duration::from_secs(60));
        assert_eq!(settings.max_in_flight, 8);
        assert!(settings.otlp_endpoint.is_none());
    }

    #[test]
    fn test_settings_from_partial_source() {
        let settings = Settings::from_builder(Cfg::builder().add_source(File::from_str(
            "poll_interval_ms = 250\nmax_in_flight = 2",
            FileFormat::Toml,
        )))
        .unwrap();

        assert_eq!(settings.poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.max_in_flight, 2);
        assert_eq!(settings.auth_timeout_secs, 60);
        assert_eq!(settings.service_name, "capvault-client");
    }

    #[test]
    fn test_settings_rejects_zero_fanout() {
        let result = Settings::from_builder(
            Cfg::builder().add_source(File::from_str("max_in_flight = 0", FileFormat::Toml)),
        );
        assert!(matches!(result, Err(ClientError::Validation(_))));
    }

    #[test]
    fn test_settings_rejects_zero_timeouts() {
        for source in ["request_timeout_secs = 0", "connect_timeout_secs = 0"] {
            let result = Settings::from_builder(
                Cfg::builder().add_source(File::from_str(source, FileFormat::Toml)),
            );
            assert!(
                matches!(result, Err(ClientError::Validation(_))),
                "{} should be rejected",
                source
            );
        }
    }
}
