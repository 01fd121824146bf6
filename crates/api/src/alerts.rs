//! In-memory alert history

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;

pub const ALERT_TYPES: [&str; 5] = ["drowsiness", "emotion", "phone", "heart_rate", "sos"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub is_acknowledged: bool,
    pub details: Value,
}

/// `POST /alert` body
#[derive(Debug, Default, Deserialize)]
pub struct NewAlert {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    pub severity: Option<Severity>,
    pub details: Option<Value>,
}

/// `PUT /alert` body
#[derive(Debug, Default, Deserialize)]
pub struct AcknowledgeAlert {
    pub id: Option<i64>,
}

/// Most recent alerts, newest first
#[derive(Debug)]
pub struct AlertStore {
    alerts: VecDeque<AlertRecord>,
    capacity: usize,
    last_id: i64,
}

impl AlertStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            last_id: 0,
        }
    }

    /// Store pre-populated with five sample alerts, ten minutes apart
    pub fn seeded<R: Rng + ?Sized>(capacity: usize, rng: &mut R, now: DateTime<Utc>) -> Self {
        let mut store = Self::new(capacity);
        for i in 0..5 {
            let kind = ALERT_TYPES[rng.gen_range(0..ALERT_TYPES.len())];
            let (message, severity, details) = sample_alert(kind, rng);
            let record = AlertRecord {
                id: store.next_id(now),
                kind: kind.to_string(),
                message,
                timestamp: now - Duration::minutes(10 * i),
                severity,
                is_acknowledged: false,
                details,
            };
            store.alerts.push_back(record);
        }
        store.alerts.truncate(store.capacity);
        store
    }

    pub fn list(&self) -> Vec<AlertRecord> {
        self.alerts.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn create(&mut self, request: NewAlert, now: DateTime<Utc>) -> Result<AlertRecord, ApiError> {
        let kind = request
            .kind
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Alert type is required".to_string()))?;

        let record = AlertRecord {
            id: self.next_id(now),
            message: request
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Alert: {kind}")),
            kind,
            timestamp: now,
            severity: request.severity.unwrap_or_default(),
            is_acknowledged: false,
            details: request.details.unwrap_or_else(|| json!({})),
        };

        self.alerts.push_front(record.clone());
        self.alerts.truncate(self.capacity);
        Ok(record)
    }

    pub fn acknowledge(&mut self, request: AcknowledgeAlert) -> Result<AlertRecord, ApiError> {
        let id = request
            .id
            .filter(|id| *id != 0)
            .ok_or_else(|| ApiError::BadRequest("Alert ID is required".to_string()))?;

        let record = self
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ApiError::NotFound("Alert not found".to_string()))?;
        record.is_acknowledged = true;
        Ok(record.clone())
    }

    /// Millisecond timestamp, bumped past the previous id when two alerts share a millisecond
    fn next_id(&mut self, now: DateTime<Utc>) -> i64 {
        self.last_id = now.timestamp_millis().max(self.last_id + 1);
        self.last_id
    }
}

fn sample_alert<R: Rng + ?Sized>(kind: &str, rng: &mut R) -> (String, Severity, Value) {
    match kind {
        "drowsiness" => {
            let severity = if rng.gen_bool(0.7) { Severity::Medium } else { Severity::High };
            let ear = 0.18 + rng.gen::<f64>() * 0.07;
            (
                "Drowsiness detected! Take a break.".to_string(),
                severity,
                json!({ "ear_value": format!("{ear:.2}") }),
            )
        }
        "emotion" => {
            let mood = if rng.gen_bool(0.6) { "angry" } else { "sad" };
            (
                format!("Driver appears {mood}. Monitor behavior."),
                Severity::Medium,
                json!({}),
            )
        }
        "phone" => (
            "Phone usage detected while driving!".to_string(),
            Severity::High,
            json!({}),
        ),
        "heart_rate" => {
            let roll = rng.gen::<f64>();
            let (condition, bpm) = if roll < 0.6 {
                ("elevated", rng.gen_range(100..120))
            } else if roll < 0.9 {
                ("high", rng.gen_range(120..180))
            } else {
                ("low", rng.gen_range(40..55))
            };
            let severity = if condition == "high" { Severity::High } else { Severity::Medium };
            (
                format!("Heart rate {condition}! Check driver condition."),
                severity,
                json!({ "bpm": bpm }),
            )
        }
        "sos" => (
            "SOS alert triggered! Emergency services notified.".to_string(),
            Severity::High,
            json!({}),
        ),
        _ => ("Driver monitoring alert".to_string(), Severity::Low, json!({})),
    }
}
