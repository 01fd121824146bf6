//! Sensor Data Service HTTP client

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dms::{AlertStatus, DetectionMode, DetectionResult, DmsAlert, HeadPose};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SensorError;

/// `GET /status` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

impl ServiceStatus {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

/// Head orientation as reported by the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPoseReading {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<HeadPoseReading> for HeadPose {
    fn from(reading: HeadPoseReading) -> Self {
        HeadPose {
            pitch: reading.x,
            yaw: reading.y,
            roll: reading.z,
        }
    }
}

/// `GET /drowsiness` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessReading {
    pub ear_value: f32,
    pub is_drowsy: bool,
    pub blink_count: u32,
    #[serde(default)]
    pub yawn_count: u32,
    #[serde(default)]
    pub head_pose: Option<HeadPoseReading>,
    pub drowsiness_level: u8,
    pub alert_status: AlertStatus,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DrowsinessReading {
    /// Map onto the result shape produced by local detection
    pub fn into_result(self) -> DetectionResult {
        let level = self.drowsiness_level.min(100);
        let mut result = DetectionResult::idle(DetectionMode::Backend);
        result.is_drowsy = self.is_drowsy;
        result.confidence = f32::from(level) / 100.0;
        result.ear_value = self.ear_value;
        result.blink_count = self.blink_count;
        result.face_detected = true;
        result.head_pose = self.head_pose.map(HeadPose::from);
        result.timestamp = self.timestamp.unwrap_or_else(Utc::now);
        result.drowsiness_level = level;
        result.alert_status = self.alert_status;
        if self.alert_status == AlertStatus::High {
            result.alerts.push(DmsAlert::Drowsiness);
        }
        result
    }
}

/// Client for the Sensor Data Service
#[derive(Debug, Clone)]
pub struct SensorClient {
    http: Client,
    base_url: String,
}

impl SensorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SensorError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fails unless the service reports `online`
    pub async fn health_check(&self) -> Result<ServiceStatus, SensorError> {
        let status: ServiceStatus = self.get_json("status").await?;
        if !status.is_online() {
            return Err(SensorError::Offline(status.status));
        }
        Ok(status)
    }

    pub async fn fetch_drowsiness(&self) -> Result<DrowsinessReading, SensorError> {
        self.get_json("drowsiness").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SensorError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SensorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SensorError::InvalidResponse(e.to_string()))
    }
}
