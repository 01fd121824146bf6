//! HTTP handlers

pub mod alerts;
pub mod music;
pub mod sensors;

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use coordinator::ServiceStatus;
use serde::Serialize;

use crate::SharedState;

/// `{status: "success", message, data}` wrapper for mutating calls
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }
}

pub const COMPONENTS: [&str; 6] = [
    "drowsiness_detector",
    "emotion_recognizer",
    "phone_detector",
    "heart_rate_monitor",
    "music_player",
    "sos_alert",
];

pub async fn status() -> Json<ServiceStatus> {
    let components: BTreeMap<String, String> = COMPONENTS
        .iter()
        .map(|c| (c.to_string(), "active".to_string()))
        .collect();

    Json(ServiceStatus {
        status: "online".to_string(),
        timestamp: Some(Utc::now()),
        components,
    })
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub path: &'static str,
    pub methods: &'static [&'static str],
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub name: &'static str,
    pub version: String,
    pub description: &'static str,
    pub uptime_seconds: u64,
    pub endpoints: Vec<EndpointInfo>,
    pub timestamp: DateTime<Utc>,
}

const ENDPOINTS: [(&str, &[&str], &str); 7] = [
    ("/api/status", &["GET"], "Get the status of all system components"),
    ("/api/drowsiness", &["GET", "POST"], "Get drowsiness detection data or process frame data"),
    ("/api/emotion", &["GET", "POST"], "Get emotion recognition data or process frame data"),
    ("/api/phone", &["GET", "POST"], "Get phone detection data or process frame data"),
    ("/api/heart-rate", &["GET", "POST"], "Get heart rate monitoring data or process frame data"),
    ("/api/alert", &["GET", "POST", "PUT"], "Get alert history, create new alerts, or acknowledge alerts"),
    ("/api/music", &["GET", "POST"], "Get current music state or control music playback"),
];

pub async fn index(State(state): State<SharedState>) -> Json<ApiInfo> {
    let state = state.read().await;
    Json(ApiInfo {
        name: "Driver Drowsiness and Emotion Monitoring System API",
        version: state.version.clone(),
        description: "Mock sensor data service for the driver monitoring dashboard",
        uptime_seconds: state.start_time.elapsed().as_secs(),
        endpoints: ENDPOINTS
            .iter()
            .map(|&(path, methods, description)| EndpointInfo {
                path,
                methods,
                description,
            })
            .collect(),
        timestamp: Utc::now(),
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.read().await;
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}
