use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::lifecycle::{CourseOutline, ModuleOutline};
use crate::domain::entities::CourseRecord;
use crate::domain::lessons::LessonContent;
use crate::domain::types::{CourseState, ReviewDecision};

#[derive(Debug, Deserialize, Serialize)]
pub struct CourseCreateRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CourseUpdateRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ModuleCreateRequest {
    pub title: String,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LessonCreateRequest {
    pub title: String,
    pub position: Option<i32>,
    pub content: LessonContent,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AccessGrantRequest {
    pub learner_id: Uuid,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EnrollRequest {
    pub display_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PlaybackRequest {
    pub position_seconds: f64,
    pub duration_seconds: f64,
}

/// Course projection returned by the API. Review feedback and the teacher's
/// internal notes only appear in the owner/admin variant.
#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub title: String,
    pub description: String,
    pub is_paid: bool,
    pub price_cents: i64,
    pub tags: Vec<String>,
    pub ce_credit_hours: Option<f64>,
    pub state: CourseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    pub submitted_at: Option<OffsetDateTime>,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl CourseResponse {
    pub fn public(record: CourseRecord) -> Self {
        Self::project(record, false)
    }

    pub fn owner(record: CourseRecord) -> Self {
        Self::project(record, true)
    }

    fn project(record: CourseRecord, include_private: bool) -> Self {
        Self {
            id: record.id,
            teacher_id: record.teacher_id,
            title: record.title,
            description: record.description,
            is_paid: record.is_paid,
            price_cents: record.price_cents,
            tags: record.tags,
            ce_credit_hours: record.ce_credit_hours,
            state: record.state,
            review_feedback: if include_private {
                record.review_feedback
            } else {
                None
            },
            internal_notes: if include_private {
                record.internal_notes
            } else {
                None
            },
            submitted_at: record.submitted_at,
            published_at: record.published_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CourseOutlineResponse {
    pub course: CourseResponse,
    pub modules: Vec<ModuleOutline>,
}

impl CourseOutlineResponse {
    pub fn from_outline(outline: CourseOutline, include_private: bool) -> Self {
        let course = if include_private {
            CourseResponse::owner(outline.course)
        } else {
            CourseResponse::public(outline.course)
        };
        Self {
            course,
            modules: outline.modules,
        }
    }
}
