use crate::indexing::{RebuildConfig, UpdaterConfig};
use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Index locations and engine settings
    #[validate(nested)]
    #[serde(default)]
    pub index: SearchConfig,

    /// Writer coordinator settings
    #[validate(nested)]
    #[serde(default)]
    pub updater: UpdaterConfig,

    /// Rebuild orchestrator settings
    #[validate(nested)]
    #[serde(default)]
    pub rebuild: RebuildConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("WIKI_INDEXER_CONFIG")
            .unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: WIKI_INDEXER_)
            .add_source(
                config::Environment::with_prefix("WIKI_INDEXER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse_and_validate() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.updater.poll_interval_secs, 30);
        assert_eq!(config.rebuild.max_queue_size, 1000);
        assert!(config.rebuild.rebuild_on_empty_index);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_invalid_nested_values_are_rejected() {
        let mut config = Config::default();
        config.updater.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.index.writer_heap_size = 1_000;
        assert!(config.validate().is_err());
    }
}
