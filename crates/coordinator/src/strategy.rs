//! Detection strategy interface

use camera_capture::FrameSource;
use dms::{DetectionMode, DetectionResult};

use crate::local::LocalStrategy;
use crate::remote::RemoteStrategy;
use crate::CoordinatorError;

/// Output of one successful tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub result: DetectionResult,
    /// Severe events detected on this tick (feeds SOS escalation)
    pub severe_events: u32,
}

/// A source of detection results.
///
/// `now_ms` is milliseconds on the coordinator's monotonic clock.
#[allow(async_fn_in_trait)]
pub trait DetectionStrategy {
    fn mode(&self) -> DetectionMode;

    /// Acquire whatever the strategy needs (model, service connectivity)
    async fn initialize(&mut self) -> Result<(), CoordinatorError>;

    async fn process_tick(
        &mut self,
        source: Option<&mut dyn FrameSource>,
        now_ms: u64,
    ) -> Result<TickReport, CoordinatorError>;

    /// Clear per-session state
    fn reset(&mut self);

    fn is_ready(&self) -> bool;
}

/// The active strategy
pub enum Strategy {
    Local(LocalStrategy),
    Remote(RemoteStrategy),
}

impl DetectionStrategy for Strategy {
    fn mode(&self) -> DetectionMode {
        match self {
            Strategy::Local(s) => s.mode(),
            Strategy::Remote(s) => s.mode(),
        }
    }

    async fn initialize(&mut self) -> Result<(), CoordinatorError> {
        match self {
            Strategy::Local(s) => s.initialize().await,
            Strategy::Remote(s) => s.initialize().await,
        }
    }

    async fn process_tick(
        &mut self,
        source: Option<&mut dyn FrameSource>,
        now_ms: u64,
    ) -> Result<TickReport, CoordinatorError> {
        match self {
            Strategy::Local(s) => s.process_tick(source, now_ms).await,
            Strategy::Remote(s) => s.process_tick(source, now_ms).await,
        }
    }

    fn reset(&mut self) {
        match self {
            Strategy::Local(s) => s.reset(),
            Strategy::Remote(s) => s.reset(),
        }
    }

    fn is_ready(&self) -> bool {
        match self {
            Strategy::Local(s) => s.is_ready(),
            Strategy::Remote(s) => s.is_ready(),
        }
    }
}
