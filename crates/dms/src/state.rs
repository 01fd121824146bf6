//! Driver state tracking

use serde::{Deserialize, Serialize};
use std::fmt;

/// Eye state derived from the smoothed EAR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeState {
    #[default]
    Open,
    Closed,
}

/// Tiered alert status derived from the drowsiness level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Normal,
    Medium,
    High,
}

impl AlertStatus {
    /// `high` above 70, `medium` above 40, `normal` otherwise
    pub fn from_level(level: u8) -> Self {
        if level > 70 {
            AlertStatus::High
        } else if level > 40 {
            AlertStatus::Medium
        } else {
            AlertStatus::Normal
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Normal => "normal",
            AlertStatus::Medium => "medium",
            AlertStatus::High => "high",
        };
        f.write_str(s)
    }
}

/// Drowsiness level, always within 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DrowsinessLevel(u8);

impl DrowsinessLevel {
    pub const MAX: u8 = 100;

    pub fn new(level: u8) -> Self {
        Self(level.min(Self::MAX))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Raise by `step`, saturating at 100
    pub fn raise(&mut self, step: u8) {
        self.0 = self.0.saturating_add(step).min(Self::MAX);
    }

    /// Lower by `step`, saturating at 0
    pub fn lower(&mut self, step: u8) {
        self.0 = self.0.saturating_sub(step);
    }

    pub fn status(self) -> AlertStatus {
        AlertStatus::from_level(self.0)
    }

    /// Level as a 0..1 confidence
    pub fn as_confidence(self) -> f32 {
        self.0 as f32 / Self::MAX as f32
    }
}

/// Per-session counters behind blink and closure classification
#[derive(Debug, Clone, Default)]
pub struct DriverState {
    /// Eye state on the previous face frame
    pub previous_eye_state: EyeState,

    /// Frames the eyes have been closed in the current closure
    pub closed_eye_frames: u32,

    /// Start of the current closure (or of the last drowsiness re-arm)
    pub eye_closure_start_ms: Option<u64>,

    /// When the last counted blink ended
    pub last_blink_ms: Option<u64>,

    /// Blinks counted this session
    pub blink_count: u32,

    /// Prolonged-closure events this session
    pub closure_event_count: u32,

    /// Consecutive frames without a face
    pub face_absent_frames: u32,
}

impl DriverState {
    /// Reset state (on session restart)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
