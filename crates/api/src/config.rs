//! Service configuration

use serde::{Deserialize, Serialize};

/// Environment variable prefix, e.g. `DRIVER_MONITOR__BIND_ADDRESS=127.0.0.1:9000`
pub const ENV_PREFIX: &str = "DRIVER_MONITOR";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub log_format: LogFormat,
    /// Most recent alerts kept in memory
    pub alert_history_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            log_format: LogFormat::Pretty,
            alert_history_capacity: 50,
        }
    }
}

impl ServiceConfig {
    /// Load from an optional TOML file, then environment overrides
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.alert_history_capacity, 50);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("driver-monitor-{}.toml", std::process::id()));
        std::fs::write(&path, "bind_address = \"127.0.0.1:9000\"\nlog_format = \"json\"\n").unwrap();

        let config = ServiceConfig::load(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.alert_history_capacity, 50);
    }
}
