//! Detection results and alerts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::head_pose::HeadPose;
use crate::state::AlertStatus;

/// Which backend produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// In-process landmark model against camera frames
    #[default]
    Local,
    /// Pre-computed results polled from the Sensor Data Service
    Backend,
}

impl DetectionMode {
    /// The mode to fail over to
    pub fn other(self) -> Self {
        match self {
            DetectionMode::Local => DetectionMode::Backend,
            DetectionMode::Backend => DetectionMode::Local,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMode::Local => "local",
            DetectionMode::Backend => "backend",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(DetectionMode::Local),
            "backend" | "remote" => Ok(DetectionMode::Backend),
            other => Err(format!("Invalid detection mode: {other}")),
        }
    }
}

/// DMS alert types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmsAlert {
    /// SOS escalation is active
    Sos,

    /// Drowsiness level reached the high tier
    Drowsiness,

    /// Head nod detected on this frame
    HeadNod,

    /// Smoothed EAR below the drowsy threshold
    LowEar,

    /// Face not visible (camera blocked?)
    FaceNotVisible,
}

/// Result of one detection tick, delivered to the registered listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Driver currently considered drowsy
    pub is_drowsy: bool,

    /// Confidence of the drowsiness estimate (0..1)
    pub confidence: f32,

    /// Smoothed EAR
    pub ear_value: f32,

    /// Blinks counted this session
    pub blink_count: u32,

    /// Whether a face was found on this tick
    pub face_detected: bool,

    /// Head pose (if estimated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_pose: Option<HeadPose>,

    pub timestamp: DateTime<Utc>,

    /// Drowsiness level (0..=100)
    pub drowsiness_level: u8,

    pub alert_status: AlertStatus,

    /// Head nods counted this session
    pub nod_count: u32,

    /// SOS escalation active
    pub sos_active: bool,

    /// Active alerts
    pub alerts: Vec<DmsAlert>,

    /// Backend that produced this result
    pub source: DetectionMode,
}

impl DetectionResult {
    /// Empty result for a tick that produced no data yet
    pub fn idle(source: DetectionMode) -> Self {
        Self {
            is_drowsy: false,
            confidence: 0.0,
            ear_value: crate::ear::FALLBACK_EAR,
            blink_count: 0,
            face_detected: false,
            head_pose: None,
            timestamp: Utc::now(),
            drowsiness_level: 0,
            alert_status: AlertStatus::Normal,
            nod_count: 0,
            sos_active: false,
            alerts: Vec::new(),
            source,
        }
    }

    /// Check if any alerts are active
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }

    /// Get highest severity alert
    pub fn highest_severity_alert(&self) -> Option<DmsAlert> {
        // Priority: Sos > Drowsiness > HeadNod > Others
        [DmsAlert::Sos, DmsAlert::Drowsiness, DmsAlert::HeadNod]
            .into_iter()
            .find(|a| self.alerts.contains(a))
            .or_else(|| self.alerts.first().copied())
    }

    /// Mark SOS state, keeping the alert list consistent
    pub fn set_sos_active(&mut self, active: bool) {
        self.sos_active = active;
        self.alerts.retain(|a| *a != DmsAlert::Sos);
        if active {
            self.alerts.insert(0, DmsAlert::Sos);
        }
    }
}
