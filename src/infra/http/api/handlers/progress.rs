//! Learner progress handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::domain::actor::Actor;
use crate::domain::progress::LessonEvent;

use super::progress_to_api;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn complete_lesson(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path((enrollment_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let update = state
        .progress
        .record_lesson_event(&actor, enrollment_id, lesson_id, LessonEvent::MarkComplete)
        .await
        .map_err(progress_to_api)?;

    Ok(Json(update))
}

pub async fn record_playback(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path((enrollment_id, lesson_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<PlaybackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = LessonEvent::PlaybackUpdate {
        position_seconds: payload.position_seconds,
        duration_seconds: payload.duration_seconds,
    };

    let update = state
        .progress
        .record_lesson_event(&actor, enrollment_id, lesson_id, event)
        .await
        .map_err(progress_to_api)?;

    Ok(Json(update))
}

pub async fn get_progress(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .progress
        .get_progress(&actor, id)
        .await
        .map_err(progress_to_api)?;

    Ok(Json(report))
}
