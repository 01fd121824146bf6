//! Alert history routes

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use tracing::info;

use super::Envelope;
use crate::alerts::{AcknowledgeAlert, AlertRecord, NewAlert};
use crate::error::ApiError;
use crate::metrics::record_alert_created;
use crate::SharedState;

pub async fn list_alerts(State(state): State<SharedState>) -> Json<Vec<AlertRecord>> {
    let state = state.read().await;
    Json(state.alerts.list())
}

pub async fn create_alert(
    State(state): State<SharedState>,
    payload: Result<Json<NewAlert>, JsonRejection>,
) -> Result<Json<Envelope<AlertRecord>>, ApiError> {
    let Json(request) = payload?;
    let mut state = state.write().await;
    let record = state.alerts.create(request, Utc::now())?;

    info!(id = record.id, kind = %record.kind, severity = ?record.severity, "Alert created");
    record_alert_created(&record.kind);
    Ok(Json(Envelope::success("Alert created successfully", record)))
}

pub async fn acknowledge_alert(
    State(state): State<SharedState>,
    payload: Result<Json<AcknowledgeAlert>, JsonRejection>,
) -> Result<Json<Envelope<AlertRecord>>, ApiError> {
    let Json(request) = payload?;
    let mut state = state.write().await;
    let record = state.alerts.acknowledge(request)?;

    info!(id = record.id, "Alert acknowledged");
    Ok(Json(Envelope::success("Alert acknowledged successfully", record)))
}
