//! Driver Monitoring System (DMS)
//!
//! Per-frame drowsiness estimation from 68-point facial landmarks:
//! - Eye Aspect Ratio (EAR) from eye landmarks
//! - Temporal smoothing and eye-state tracking
//! - Blink and prolonged eye-closure events
//! - Head-nod detection from nose/jaw motion
//! - Bounded drowsiness level with tiered alert status

pub mod analysis;
pub mod config;
pub mod detector;
pub mod ear;
pub mod head_pose;
pub mod landmarks;
pub mod session;
pub mod state;

pub use analysis::{DetectionMode, DetectionResult, DmsAlert};
pub use config::DmsConfig;
pub use detector::{LandmarkModel, ModelLoader, OnnxLandmarkModel, OnnxModelLoader};
pub use ear::{compute_ear, eye_aspect_ratio, FALLBACK_EAR};
pub use head_pose::{HeadPose, NodSample, NodTracker};
pub use landmarks::{Landmarks, Point};
pub use session::{DrowsinessEvent, DrowsinessSession, FrameAnalysis};
pub use state::{AlertStatus, DriverState, DrowsinessLevel, EyeState};

use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
}
