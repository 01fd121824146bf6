//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Detection thresholds and window sizes.
///
/// EAR thresholds depend on camera placement and the landmark model, so
/// they are calibration values rather than constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Smoothed EAR below this counts as a drowsy tick (raises the level)
    pub ear_threshold: f32,

    /// Smoothed EAR below this classifies the eyes as closed
    pub blink_threshold: f32,

    /// Continuous closure longer than this is a drowsiness event (milliseconds)
    pub drowsy_time_threshold_ms: u64,

    /// Shortest closure, in frames, that still counts as a blink
    pub blink_min_frames: u32,

    /// Longest closure, in frames, that still counts as a blink
    pub blink_max_frames: u32,

    /// Minimum time between two counted blinks (milliseconds)
    pub blink_debounce_ms: u64,

    /// Vertical movement threshold for a head nod, in face widths
    pub head_nod_threshold: f32,

    /// Minimum time between two counted nods (milliseconds)
    pub nod_rearm_ms: u64,

    /// EAR smoothing window size
    pub ear_buffer_capacity: usize,

    /// Head position window size
    pub head_buffer_capacity: usize,

    /// Samples needed before nod detection starts
    pub nod_min_samples: usize,

    /// Samples in the "recent" average used for nod deviation
    pub nod_recent_samples: usize,

    /// Level increase per drowsy tick
    pub level_rise_step: u8,

    /// Level decrease per alert tick
    pub level_decay_step: u8,

    /// One-time level jump on a prolonged closure
    pub closure_event_jump: u8,

    /// One-time level jump on a head nod
    pub nod_event_jump: u8,

    /// Level a fresh session starts at
    pub initial_level: u8,

    /// Consecutive faceless frames before a FaceNotVisible alert
    pub face_absent_alert_frames: u32,

    /// Face presence score required from the landmark model
    pub face_confidence: f32,

    /// Square input size of the landmark model (pixels)
    pub model_input_size: u32,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.20,
            blink_threshold: 0.21,
            drowsy_time_threshold_ms: 3000,
            blink_min_frames: 1,
            blink_max_frames: 10,
            blink_debounce_ms: 300,
            head_nod_threshold: 0.15,
            nod_rearm_ms: 1000,
            ear_buffer_capacity: ring_buffer::DEFAULT_CAPACITY,
            head_buffer_capacity: 20,
            nod_min_samples: 10,
            nod_recent_samples: 5,
            level_rise_step: 5,
            level_decay_step: 1,
            closure_event_jump: 20,
            nod_event_jump: 15,
            initial_level: 10,
            face_absent_alert_frames: 30,
            face_confidence: 0.7,
            model_input_size: 112,
        }
    }
}

impl DmsConfig {
    /// Sensitive profile (eyes classified closed earlier, shorter closure)
    pub fn strict() -> Self {
        Self {
            ear_threshold: 0.22,
            blink_threshold: 0.27,
            drowsy_time_threshold_ms: 2000,
            ..Default::default()
        }
    }

    /// Tolerant profile for drivers with naturally narrow eyes
    pub fn lenient() -> Self {
        Self {
            ear_threshold: 0.18,
            blink_threshold: 0.19,
            drowsy_time_threshold_ms: 4000,
            ..Default::default()
        }
    }

    /// Reject configurations the detector cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if !(self.ear_threshold > 0.0 && self.blink_threshold > 0.0) {
            return Err(DmsError::Config("EAR thresholds must be positive".into()));
        }
        if self.blink_min_frames == 0 || self.blink_min_frames > self.blink_max_frames {
            return Err(DmsError::Config(format!(
                "invalid blink window {}..={} frames",
                self.blink_min_frames, self.blink_max_frames
            )));
        }
        if self.ear_buffer_capacity == 0 || self.head_buffer_capacity == 0 {
            return Err(DmsError::Config("buffer capacities must be non-zero".into()));
        }
        if self.nod_min_samples > self.head_buffer_capacity {
            return Err(DmsError::Config(format!(
                "nod_min_samples ({}) exceeds head_buffer_capacity ({})",
                self.nod_min_samples, self.head_buffer_capacity
            )));
        }
        if self.nod_recent_samples == 0 || self.nod_recent_samples > self.nod_min_samples {
            return Err(DmsError::Config(
                "nod_recent_samples must be between 1 and nod_min_samples".into(),
            ));
        }
        if self.model_input_size == 0 {
            return Err(DmsError::Config("model_input_size must be non-zero".into()));
        }
        Ok(())
    }
}
