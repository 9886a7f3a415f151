//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{
    CatalogCursor, CursorPage, EnrollmentCursor, PageRequest, PaginationError, ReviewQueueCursor,
};
use crate::domain::entities::{
    AccessGrantRecord, AuditLogRecord, CertificateRecord, CourseRecord, EnrollmentRecord,
    LessonCompletionRecord, LessonRecord, ModuleRecord, PlaybackCheckpointRecord,
};
use crate::domain::lessons::LessonContent;
use crate::domain::types::{CourseState, ReviewDecision};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Compare-and-set guard applied to the owning course row before a write.
///
/// Guarded writes touch the course row and the target child rows in one
/// transaction. When the course is no longer in the expected state the
/// write is abandoned and the repository reports `None`, letting the
/// service re-read and translate the miss into a precise error.
#[derive(Debug, Clone, Copy)]
pub struct CourseStateGuard {
    pub expected: CourseState,
    /// Clear approval and demote the course to draft as part of the write.
    pub demote_to_draft: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogQueryFilter {
    pub search: Option<String>,
    pub is_paid: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CreateCourseParams {
    pub teacher_id: Uuid,
    pub title: String,
    pub description: String,
    pub is_paid: bool,
    pub price_cents: i64,
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CourseEditParams {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub is_paid: bool,
    pub price_cents: i64,
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
    pub guard: CourseStateGuard,
}

#[derive(Debug, Clone)]
pub struct CourseMetadataParams {
    pub id: Uuid,
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DecideCourseParams {
    pub course_id: Uuid,
    pub decision: ReviewDecision,
    pub feedback: Option<String>,
    pub decided_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct AddModuleParams {
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub guard: CourseStateGuard,
}

#[derive(Debug, Clone)]
pub struct RemoveModuleParams {
    pub course_id: Uuid,
    pub module_id: Uuid,
    pub guard: CourseStateGuard,
}

#[derive(Debug, Clone)]
pub struct AddLessonParams {
    pub course_id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub position: i32,
    pub content: LessonContent,
    pub guard: CourseStateGuard,
}

#[derive(Debug, Clone)]
pub struct RemoveLessonParams {
    pub course_id: Uuid,
    pub lesson_id: Uuid,
    pub guard: CourseStateGuard,
}

/// Module and lesson counts used by the submission completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentCounts {
    pub modules: u64,
    pub lessons: u64,
}

#[derive(Debug, Clone)]
pub struct CreateEnrollmentParams {
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub learner_name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateEnrollmentProgressParams {
    pub enrollment_id: Uuid,
    pub progress_percentage: i16,
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy)]
pub struct CheckpointUpsertParams {
    pub enrollment_id: Uuid,
    pub lesson_id: Uuid,
    pub position_seconds: f64,
    pub watched_ratio: f64,
    pub updated_at: OffsetDateTime,
}

#[async_trait]
pub trait CoursesRepo: Send + Sync {
    async fn find_course(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError>;

    async fn find_module(
        &self,
        course_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<ModuleRecord>, RepoError>;

    /// Look up a lesson through its module, scoped to the given course.
    async fn find_lesson_in_course(
        &self,
        course_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<LessonRecord>, RepoError>;

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<ModuleRecord>, RepoError>;

    async fn list_lessons(&self, course_id: Uuid) -> Result<Vec<LessonRecord>, RepoError>;

    async fn count_content(&self, course_id: Uuid) -> Result<ContentCounts, RepoError>;

    async fn list_catalog(
        &self,
        filter: &CatalogQueryFilter,
        page: PageRequest<CatalogCursor>,
    ) -> Result<CursorPage<CourseRecord>, RepoError>;

    async fn list_review_queue(
        &self,
        page: PageRequest<ReviewQueueCursor>,
    ) -> Result<CursorPage<CourseRecord>, RepoError>;

    async fn list_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<CourseRecord>, RepoError>;
}

#[async_trait]
pub trait CoursesWriteRepo: Send + Sync {
    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError>;

    /// Full-field edit guarded by course state. `None` means the guard missed.
    async fn apply_course_edit(
        &self,
        params: CourseEditParams,
    ) -> Result<Option<CourseRecord>, RepoError>;

    /// Metadata-only edit. Never touches lifecycle state.
    async fn update_course_metadata(
        &self,
        params: CourseMetadataParams,
    ) -> Result<CourseRecord, RepoError>;

    /// Transition draft or rejected into submitted. `None` means the course
    /// was not in a submittable state when the write ran.
    async fn submit_course(
        &self,
        id: Uuid,
        submitted_at: OffsetDateTime,
    ) -> Result<Option<CourseRecord>, RepoError>;

    /// Apply an approve or reject decision to a submitted course. `None`
    /// means another decision (or a reverting edit) got there first.
    async fn decide_course(
        &self,
        params: DecideCourseParams,
    ) -> Result<Option<CourseRecord>, RepoError>;

    /// Transition approved into published. `None` means the course was not
    /// approved when the write ran.
    async fn publish_course(
        &self,
        id: Uuid,
        published_at: OffsetDateTime,
    ) -> Result<Option<CourseRecord>, RepoError>;

    async fn add_module(&self, params: AddModuleParams)
    -> Result<Option<ModuleRecord>, RepoError>;

    async fn remove_module(&self, params: RemoveModuleParams) -> Result<Option<()>, RepoError>;

    async fn add_lesson(&self, params: AddLessonParams)
    -> Result<Option<LessonRecord>, RepoError>;

    async fn remove_lesson(&self, params: RemoveLessonParams) -> Result<Option<()>, RepoError>;
}

#[async_trait]
pub trait EnrollmentsRepo: Send + Sync {
    async fn find_enrollment(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError>;

    async fn find_for_learner(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
    ) -> Result<Option<EnrollmentRecord>, RepoError>;

    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError>;

    /// Clear `dropped_at` on a previously dropped enrollment.
    async fn reactivate_enrollment(&self, id: Uuid) -> Result<EnrollmentRecord, RepoError>;

    async fn drop_enrollment(
        &self,
        id: Uuid,
        dropped_at: OffsetDateTime,
    ) -> Result<EnrollmentRecord, RepoError>;

    async fn update_progress(
        &self,
        params: UpdateEnrollmentProgressParams,
    ) -> Result<EnrollmentRecord, RepoError>;

    async fn list_for_course(
        &self,
        course_id: Uuid,
        page: PageRequest<EnrollmentCursor>,
    ) -> Result<CursorPage<EnrollmentRecord>, RepoError>;

    /// Every enrollment of a course, active and dropped, for recompute sweeps.
    async fn list_all_for_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<EnrollmentRecord>, RepoError>;

    async fn list_for_learner(&self, learner_id: Uuid)
    -> Result<Vec<EnrollmentRecord>, RepoError>;

    async fn grant_access(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
        granted_at: OffsetDateTime,
    ) -> Result<AccessGrantRecord, RepoError>;

    async fn has_access_grant(&self, course_id: Uuid, learner_id: Uuid)
    -> Result<bool, RepoError>;

    /// Enrollments at 100% that have no certificate row yet.
    async fn list_completed_missing_certificate(
        &self,
        course_id: Option<Uuid>,
    ) -> Result<Vec<EnrollmentRecord>, RepoError>;
}

#[async_trait]
pub trait ProgressRepo: Send + Sync {
    /// Record a lesson completion. Returns `false` when the completion was
    /// already on file, leaving the original timestamp untouched.
    async fn insert_completion(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
        completed_at: OffsetDateTime,
    ) -> Result<bool, RepoError>;

    /// Last-write-wins on position, monotonic max on watched ratio.
    async fn upsert_checkpoint(
        &self,
        params: CheckpointUpsertParams,
    ) -> Result<PlaybackCheckpointRecord, RepoError>;

    async fn find_checkpoint(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<PlaybackCheckpointRecord>, RepoError>;

    /// Completions counted against lessons that still exist in the course.
    async fn count_completed_in_course(
        &self,
        enrollment_id: Uuid,
        course_id: Uuid,
    ) -> Result<u64, RepoError>;

    async fn list_completions(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Vec<LessonCompletionRecord>, RepoError>;

    async fn list_checkpoints(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Vec<PlaybackCheckpointRecord>, RepoError>;
}

#[async_trait]
pub trait CertificatesRepo: Send + Sync {
    /// Insert a certificate unless the enrollment already holds one.
    /// Returns `None` when an existing row won the unique constraint.
    async fn insert_certificate(
        &self,
        record: CertificateRecord,
    ) -> Result<Option<CertificateRecord>, RepoError>;

    async fn find_by_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<CertificateRecord>, RepoError>;

    async fn find_by_serial(&self, serial: &str) -> Result<Option<CertificateRecord>, RepoError>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError>;
}
