//! API handlers organized by resource type.
//!
//! Each submodule contains handlers for a specific resource (courses,
//! enrollments, etc.). Shared query structs and error conversions are
//! defined here and used across modules.

mod audit;
mod certificates;
mod courses;
mod enrollments;
mod health;
mod progress;

// Re-export all handlers for external use
pub use audit::*;
pub use certificates::*;
pub use courses::*;
pub use enrollments::*;
pub use health::*;
pub use progress::*;

// ----- Shared query structs -----

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CatalogListQuery {
    pub search: Option<String>,
    pub is_paid: Option<bool>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewQueueQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentListQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    pub limit: Option<u32>,
}

// ----- Shared error conversions -----

use axum::http::StatusCode;

use crate::application::certificates::CertificateError;
use crate::application::enrollments::EnrollmentError;
use crate::application::lifecycle::LifecycleError;
use crate::application::progress::ProgressError;
use crate::application::repos::RepoError;
use crate::domain::actor::AccessError;

use super::error::{ApiError, codes};

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::Pagination(p) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_CURSOR,
            "Invalid cursor",
            Some(p.to_string()),
        ),
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(msg) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(msg),
        ),
    }
}

pub(crate) fn access_to_api(err: AccessError) -> ApiError {
    ApiError::forbidden(Some(err.to_string()))
}

pub(crate) fn lifecycle_to_api(err: LifecycleError) -> ApiError {
    match err {
        LifecycleError::ConstraintViolation(field) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid course payload",
            Some(field.to_string()),
        ),
        LifecycleError::Access(inner) => access_to_api(inner),
        LifecycleError::CourseNotFound => ApiError::not_found("course not found"),
        LifecycleError::ModuleNotFound => ApiError::not_found("module not found"),
        LifecycleError::LessonNotFound => ApiError::not_found("lesson not found"),
        LifecycleError::InvalidContent(inner) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid lesson content",
            Some(inner.to_string()),
        ),
        err @ LifecycleError::NotSubmittable { .. } => ApiError::conflict(
            codes::NOT_SUBMITTABLE,
            "Course cannot be submitted",
            Some(err.to_string()),
        ),
        LifecycleError::AlreadyUnderReview => ApiError::conflict(
            codes::UNDER_REVIEW,
            "Course is already under review",
            None,
        ),
        err @ LifecycleError::IncompleteContent { .. } => ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::INCOMPLETE_CONTENT,
            "Course content is incomplete",
            Some(err.to_string()),
        ),
        err @ LifecycleError::AlreadyDecided { .. } => ApiError::conflict(
            codes::ALREADY_DECIDED,
            "Review is already decided",
            Some(err.to_string()),
        ),
        err @ LifecycleError::NotApproved { .. } => ApiError::conflict(
            codes::NOT_APPROVED,
            "Course is not approved for publishing",
            Some(err.to_string()),
        ),
        LifecycleError::UnderReview => ApiError::conflict(
            codes::UNDER_REVIEW,
            "Course is under review and cannot be edited",
            None,
        ),
        LifecycleError::EditConflict => ApiError::conflict(
            codes::EDIT_CONFLICT,
            "Course was modified concurrently",
            Some("retry the request".to_string()),
        ),
        LifecycleError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn enrollment_to_api(err: EnrollmentError) -> ApiError {
    match err {
        EnrollmentError::ConstraintViolation(field) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid enrollment payload",
            Some(field.to_string()),
        ),
        EnrollmentError::Access(inner) => access_to_api(inner),
        EnrollmentError::CourseNotFound => ApiError::not_found("course not found"),
        err @ EnrollmentError::NotPublished { .. } => ApiError::conflict(
            codes::NOT_PUBLISHED,
            "Course is not open for enrollment",
            Some(err.to_string()),
        ),
        EnrollmentError::PaymentRequired => ApiError::new(
            StatusCode::PAYMENT_REQUIRED,
            codes::PAYMENT_REQUIRED,
            "Paid course requires an access grant",
            None,
        ),
        EnrollmentError::EnrollmentNotFound => ApiError::not_found("enrollment not found"),
        EnrollmentError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn progress_to_api(err: ProgressError) -> ApiError {
    match err {
        ProgressError::Access(inner) => access_to_api(inner),
        ProgressError::EnrollmentNotFound => ApiError::not_found("enrollment not found"),
        ProgressError::LessonNotFound => ApiError::not_found("lesson not found"),
        ProgressError::EnrollmentInactive => ApiError::conflict(
            codes::ENROLLMENT_INACTIVE,
            "Enrollment no longer accepts progress",
            None,
        ),
        err @ ProgressError::NegativePosition { .. }
        | err @ ProgressError::NonPositiveDuration { .. } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid playback payload",
            Some(err.to_string()),
        ),
        err @ ProgressError::PlaybackNotSupported { .. } => ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::WRONG_SIGNAL,
            "Lesson does not accept playback updates",
            Some(err.to_string()),
        ),
        err @ ProgressError::ExplicitMarkNotAllowed { .. } => ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::WRONG_SIGNAL,
            "Lesson does not accept an explicit completion mark",
            Some(err.to_string()),
        ),
        ProgressError::Certificate(inner) => certificate_to_api(inner),
        ProgressError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn certificate_to_api(err: CertificateError) -> ApiError {
    match err {
        CertificateError::Access(inner) => access_to_api(inner),
        CertificateError::EnrollmentNotFound => ApiError::not_found("enrollment not found"),
        err @ CertificateError::NotEligible { .. } => ApiError::conflict(
            codes::NOT_ELIGIBLE,
            "Course is not completed",
            Some(err.to_string()),
        ),
        CertificateError::NotFound => ApiError::not_found("certificate not found"),
        CertificateError::Repo(repo) => repo_to_api(repo),
    }
}
