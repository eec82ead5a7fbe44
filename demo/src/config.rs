//! Demo configuration.

use std::path::Path;

use serde::Deserialize;

use server::logging::LoggingConfig;

/// Demo configuration loaded from a TOML file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listening address handed to the builder.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Publish loop settings.
    #[serde(default)]
    pub publish: PublishConfig,

    /// Number of in-process `/stream` subscribers to spawn.
    #[serde(default = "default_subscribers")]
    pub subscribers: usize,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
    /// Milliseconds between publishes.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Number of payloads to publish before shutting the fan down.
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_listen() -> String {
    "0.0.0.0:50051".to_string()
}

fn default_subscribers() -> usize {
    4
}

fn default_interval_ms() -> u64 {
    20
}

fn default_count() -> usize {
    100
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            count: default_count(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            publish: PublishConfig::default(),
            subscribers: default_subscribers(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listen, "0.0.0.0:50051");
        assert_eq!(config.publish.interval_ms, 20);
        assert_eq!(config.publish.count, 100);
        assert_eq!(config.subscribers, 4);
    }

    #[test]
    fn test_overrides() {
        let config: Config = toml::from_str(
            r#"
            listen = "127.0.0.1:9000"
            subscribers = 2

            [publish]
            interval_ms = 5
            count = 10

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.publish.count, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(toml::from_str::<Config>("unknown_knob = 1").is_err());
    }
}
