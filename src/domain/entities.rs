//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    lessons::LessonContent,
    types::{CourseState, LessonKind},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseRecord {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub title: String,
    pub description: String,
    pub is_paid: bool,
    pub price_cents: i64,
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
    pub state: CourseState,
    pub admin_approved: bool,
    pub review_feedback: Option<String>,
    pub submitted_at: Option<OffsetDateTime>,
    pub approved_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleRecord {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonRecord {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub position: i32,
    pub kind: LessonKind,
    pub content: LessonContent,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentRecord {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub learner_name: String,
    pub progress_percentage: i16,
    pub completed_at: Option<OffsetDateTime>,
    pub dropped_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl EnrollmentRecord {
    /// An enrollment stays on file after unenrolling; `dropped_at` marks it
    /// inactive without losing progress or certificate references.
    pub fn is_active(&self) -> bool {
        self.dropped_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonCompletionRecord {
    pub enrollment_id: Uuid,
    pub lesson_id: Uuid,
    pub completed_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackCheckpointRecord {
    pub enrollment_id: Uuid,
    pub lesson_id: Uuid,
    pub last_position_seconds: f64,
    pub watched_ratio: f64,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateRecord {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub serial: String,
    pub learner_name: String,
    pub course_title: String,
    pub ce_credit_hours: Option<f64>,
    pub content_hash: String,
    pub issued_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessGrantRecord {
    pub course_id: Uuid,
    pub learner_id: Uuid,
    pub granted_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload_text: Option<String>,
    pub created_at: OffsetDateTime,
}
