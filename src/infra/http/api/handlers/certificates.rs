//! Certificate handlers

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::domain::actor::Actor;

use super::certificate_to_api;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn get_certificate(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let certificate = state
        .certificates
        .get_or_issue(&actor, id)
        .await
        .map_err(certificate_to_api)?;

    Ok(Json(certificate))
}

/// Public verification endpoint, no identity required. Employers paste the
/// serial from a shared certificate.
pub async fn verify_certificate(
    State(state): State<ApiState>,
    Path(serial): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let verification = state
        .certificates
        .verify(&serial)
        .await
        .map_err(certificate_to_api)?;

    Ok(Json(verification))
}
