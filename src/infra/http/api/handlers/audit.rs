//! Audit handlers

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::response::IntoResponse;

use crate::domain::actor::{Actor, ActorRole};

use super::{AuditListQuery, access_to_api, repo_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::state::ApiState;

pub async fn list_audit_logs(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<AuditListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    actor
        .require_role(ActorRole::Admin)
        .map_err(access_to_api)?;

    let rows = state
        .audit
        .list_recent(query.limit.unwrap_or(50))
        .await
        .map_err(repo_to_api)?;

    Ok(Json(rows))
}
