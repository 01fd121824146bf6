//! Randomized sensor endpoints

use axum::extract::rejection::JsonRejection;
use axum::Json;
use chrono::Utc;
use coordinator::DrowsinessReading;
use serde_json::Value;

use super::Envelope;
use crate::error::ApiError;
use crate::mock::{self, EmotionReading, HeartRateReading, PhoneReading};

const FRAME_PROCESSED: &str = "Frame processed successfully";

pub async fn get_drowsiness() -> Json<DrowsinessReading> {
    Json(mock::drowsiness(&mut rand::thread_rng(), Utc::now()))
}

/// Frame payloads are accepted but not inspected
pub async fn post_drowsiness(
    frame: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<DrowsinessReading>>, ApiError> {
    frame?;
    let reading = mock::drowsiness(&mut rand::thread_rng(), Utc::now());
    Ok(Json(Envelope::success(FRAME_PROCESSED, reading)))
}

pub async fn get_emotion() -> Json<EmotionReading> {
    Json(mock::emotion(&mut rand::thread_rng(), Utc::now()))
}

pub async fn post_emotion(
    frame: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<EmotionReading>>, ApiError> {
    frame?;
    let reading = mock::emotion(&mut rand::thread_rng(), Utc::now());
    Ok(Json(Envelope::success(FRAME_PROCESSED, reading)))
}

pub async fn get_phone() -> Json<PhoneReading> {
    Json(mock::phone(&mut rand::thread_rng(), Utc::now()))
}

pub async fn post_phone(
    frame: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<PhoneReading>>, ApiError> {
    frame?;
    let reading = mock::phone(&mut rand::thread_rng(), Utc::now());
    Ok(Json(Envelope::success(FRAME_PROCESSED, reading)))
}

pub async fn get_heart_rate() -> Json<HeartRateReading> {
    Json(mock::heart_rate(&mut rand::thread_rng(), Utc::now()))
}

pub async fn post_heart_rate(
    frame: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Envelope<HeartRateReading>>, ApiError> {
    frame?;
    let reading = mock::heart_rate(&mut rand::thread_rng(), Utc::now());
    Ok(Json(Envelope::success(FRAME_PROCESSED, reading)))
}
