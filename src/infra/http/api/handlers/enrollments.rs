//! Enrollment and access grant handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::enrollments::EnrollCommand;
use crate::domain::actor::Actor;

use super::{enrollment_to_api, progress_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn grant_access(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AccessGrantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let grant = state
        .enrollments
        .grant_access(&actor, id, payload.learner_id)
        .await
        .map_err(enrollment_to_api)?;

    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn enroll(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EnrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = EnrollCommand {
        course_id: id,
        learner_name: payload.display_name,
    };

    let enrollment = state
        .enrollments
        .enroll(&actor, command)
        .await
        .map_err(enrollment_to_api)?;

    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn unenroll(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollment = state
        .enrollments
        .unenroll(&actor, id)
        .await
        .map_err(enrollment_to_api)?;

    Ok(Json(enrollment))
}

pub async fn list_my_enrollments(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let enrollments = state
        .progress
        .my_enrollments(&actor)
        .await
        .map_err(progress_to_api)?;

    Ok(Json(enrollments))
}
