//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "course_state", rename_all = "snake_case")]
pub enum CourseState {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Published,
}

impl CourseState {
    pub fn as_str(self) -> &'static str {
        match self {
            CourseState::Draft => "draft",
            CourseState::Submitted => "submitted",
            CourseState::Approved => "approved",
            CourseState::Rejected => "rejected",
            CourseState::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lesson_kind", rename_all = "snake_case")]
pub enum LessonKind {
    Video,
    Text,
    Document,
}

impl LessonKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonKind::Video => "video",
            LessonKind::Text => "text",
            LessonKind::Document => "document",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Reject => "reject",
        }
    }
}

impl TryFrom<&str> for ReviewDecision {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "approve" => Ok(ReviewDecision::Approve),
            "reject" => Ok(ReviewDecision::Reject),
            _ => Err(()),
        }
    }
}
