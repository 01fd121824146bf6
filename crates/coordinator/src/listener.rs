//! Consumer-facing contracts: result listener and SOS alarm

use dms::{DetectionMode, DetectionResult};
use tracing::{info, warn};

use crate::CoordinatorError;

/// Receives detection output. One listener per running detection;
/// registering a new one replaces the old.
pub trait DetectionListener: Send {
    fn on_result(&mut self, result: &DetectionResult);

    /// Automatic failover switched the active mode
    fn on_mode_changed(&mut self, _from: DetectionMode, _to: DetectionMode) {}

    /// Both modes failed; detection has stopped
    fn on_fatal(&mut self, _error: &CoordinatorError) {}
}

impl<F> DetectionListener for F
where
    F: FnMut(&DetectionResult) + Send,
{
    fn on_result(&mut self, result: &DetectionResult) {
        self(result)
    }
}

/// Audible/haptic alarm driven by SOS state
pub trait Alarm: Send {
    fn sound(&mut self, event_count: u32);
    fn silence(&mut self);
}

/// Alarm that only logs
#[derive(Debug, Default)]
pub struct LogAlarm {
    sounding: bool,
}

impl LogAlarm {
    pub fn is_sounding(&self) -> bool {
        self.sounding
    }
}

impl Alarm for LogAlarm {
    fn sound(&mut self, event_count: u32) {
        self.sounding = true;
        warn!(event_count, "SOS alarm sounding");
    }

    fn silence(&mut self) {
        if self.sounding {
            self.sounding = false;
            info!("SOS alarm silenced");
        }
    }
}
