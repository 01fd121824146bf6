//! Coordinator error types

use camera_capture::CameraError;
use dms::{DetectionMode, DmsError};
use thiserror::Error;

use crate::coordinator::CoordinatorState;

/// Errors talking to the Sensor Data Service
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Service not online (status: {0})")]
    Offline(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SensorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SensorError::Network(e) if e.is_timeout())
    }
}

/// Coordinator error types
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Coordinator not ready (state: {0})")]
    NotReady(CoordinatorState),

    #[error("{0} detector not initialized")]
    StrategyNotReady(DetectionMode),

    #[error("No frame source for local detection")]
    NoFrameSource,

    #[error("Detection exhausted: {0}")]
    Exhausted(String),

    #[error("Sensor service error: {0}")]
    Sensor(#[from] SensorError),

    #[error("DMS error: {0}")]
    Dms(#[from] DmsError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<::config::ConfigError> for CoordinatorError {
    fn from(e: ::config::ConfigError) -> Self {
        CoordinatorError::Config(e.to_string())
    }
}
