//! Database health probe

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::infra::http::api::state::ApiState;
use crate::infra::http::db_health_response;

pub async fn db_health(State(state): State<ApiState>) -> Response {
    match &state.db {
        Some(db) => db_health_response(db.health_check().await),
        // The in-memory store has no connection to probe.
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
