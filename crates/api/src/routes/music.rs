//! Music player routes

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use tracing::debug;

use super::Envelope;
use crate::error::ApiError;
use crate::metrics::record_music_command;
use crate::music::{MusicCommand, MusicState};
use crate::SharedState;

pub async fn get_music(State(state): State<SharedState>) -> Json<MusicState> {
    let mut state = state.write().await;
    Json(state.music.state(&mut rand::thread_rng(), Utc::now()))
}

pub async fn control_music(
    State(state): State<SharedState>,
    payload: Result<Json<MusicCommand>, JsonRejection>,
) -> Result<Json<Envelope<MusicState>>, ApiError> {
    let Json(command) = payload?;
    let action = command.action.clone().unwrap_or_default();

    let mut state = state.write().await;
    let applied = state
        .music
        .apply(command, &mut rand::thread_rng(), Utc::now());
    record_music_command(&action, applied.is_ok());

    let (message, music) = applied?;
    debug!(action = %action, "{}", message);
    Ok(Json(Envelope::success(message, music)))
}
