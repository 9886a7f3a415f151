pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_api_router(state: ApiState) -> Router {
    let identified = Router::new()
        .route(
            "/api/v1/courses",
            get(handlers::list_catalog).post(handlers::create_course),
        )
        .route(
            "/api/v1/courses/{id}",
            get(handlers::get_course).patch(handlers::update_course),
        )
        .route("/api/v1/courses/{id}/submit", post(handlers::submit_course))
        .route("/api/v1/courses/{id}/review", post(handlers::review_course))
        .route(
            "/api/v1/courses/{id}/publish",
            post(handlers::publish_course),
        )
        .route("/api/v1/courses/{id}/modules", post(handlers::add_module))
        .route(
            "/api/v1/courses/{id}/modules/{module_id}",
            delete(handlers::remove_module),
        )
        .route(
            "/api/v1/courses/{id}/modules/{module_id}/lessons",
            post(handlers::add_lesson),
        )
        .route(
            "/api/v1/courses/{id}/lessons/{lesson_id}",
            delete(handlers::remove_lesson),
        )
        .route("/api/v1/courses/{id}/access", post(handlers::grant_access))
        .route("/api/v1/courses/{id}/enroll", post(handlers::enroll))
        .route(
            "/api/v1/courses/{id}/enrollments",
            get(handlers::list_course_enrollments),
        )
        .route("/api/v1/review-queue", get(handlers::list_review_queue))
        .route(
            "/api/v1/teacher/courses",
            get(handlers::list_teacher_courses),
        )
        .route("/api/v1/me/enrollments", get(handlers::list_my_enrollments))
        .route(
            "/api/v1/enrollments/{id}",
            get(handlers::get_progress).delete(handlers::unenroll),
        )
        .route(
            "/api/v1/enrollments/{id}/lessons/{lesson_id}/complete",
            post(handlers::complete_lesson),
        )
        .route(
            "/api/v1/enrollments/{id}/lessons/{lesson_id}/playback",
            post(handlers::record_playback),
        )
        .route(
            "/api/v1/enrollments/{id}/certificate",
            get(handlers::get_certificate),
        )
        .route("/api/v1/audit", get(handlers::list_audit_logs))
        .layer(axum_middleware::from_fn(middleware::require_identity));

    let public = Router::new()
        .route(
            "/api/v1/certificates/{serial}/verify",
            get(handlers::verify_certificate),
        )
        .route("/health/db", get(handlers::db_health));

    identified
        .merge(public)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
