//! Coordinator configuration

use std::time::Duration;

use alerting::SosConfig;
use dms::{DetectionMode, DmsConfig};
use serde::{Deserialize, Serialize};

use crate::CoordinatorError;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080/api";

/// Environment variable prefix, e.g. `DMS__DETECTION_INTERVAL_MS=200`
pub const ENV_PREFIX: &str = "DMS";

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Requested detection mode
    pub mode: DetectionMode,
    /// Landmark model for local detection
    pub local_model_path: Option<String>,
    /// Sensor Data Service base URL
    pub backend_url: Option<String>,
    /// Tick period (ms)
    pub detection_interval_ms: u64,
    /// Consecutive tick failures before switching mode
    pub max_failed_attempts_before_fallback: u32,
    /// Upper bound on a single service call (ms)
    pub request_timeout_ms: u64,
    pub dms: DmsConfig,
    pub sos: SosConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Backend,
            local_model_path: None,
            backend_url: Some(DEFAULT_BACKEND_URL.to_string()),
            detection_interval_ms: 100,
            max_failed_attempts_before_fallback: 3,
            request_timeout_ms: 3_000,
            dms: DmsConfig::default(),
            sos: SosConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load from an optional TOML file, then `DMS__*` environment overrides
    pub fn load(path: Option<&str>) -> Result<Self, CoordinatorError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }
        let config: Self = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.detection_interval_ms == 0 {
            return Err(CoordinatorError::Config(
                "detection_interval_ms must be positive".into(),
            ));
        }
        if self.max_failed_attempts_before_fallback == 0 {
            return Err(CoordinatorError::Config(
                "max_failed_attempts_before_fallback must be at least 1".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(CoordinatorError::Config(
                "request_timeout_ms must be positive".into(),
            ));
        }
        if !self.has_mode(DetectionMode::Local) && !self.has_mode(DetectionMode::Backend) {
            return Err(CoordinatorError::Config(
                "neither local_model_path nor backend_url is configured".into(),
            ));
        }
        self.dms.validate()?;
        self.sos
            .validate()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;
        Ok(())
    }

    /// Whether a mode has the settings it needs
    pub fn has_mode(&self, mode: DetectionMode) -> bool {
        let setting = match mode {
            DetectionMode::Local => &self.local_model_path,
            DetectionMode::Backend => &self.backend_url,
        };
        setting.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Local-first configuration
    pub fn local(model_path: impl Into<String>) -> Self {
        Self {
            mode: DetectionMode::Local,
            local_model_path: Some(model_path.into()),
            backend_url: None,
            ..Default::default()
        }
    }

    /// Backend-first configuration
    pub fn backend(url: impl Into<String>) -> Self {
        Self {
            mode: DetectionMode::Backend,
            backend_url: Some(url.into()),
            ..Default::default()
        }
    }
}
