//! Lesson content payloads and the completion rule.
//!
//! Each lesson stores exactly one content variant; the persisted `kind`
//! column mirrors the variant so SQL can filter without unpacking JSON.
//! Completion is decided here as a pure function of content and signal so
//! the rule stays testable without storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::types::LessonKind;

/// Watch-ratio threshold applied when a video lesson's author does not pick
/// one explicitly.
pub const DEFAULT_REQUIRED_WATCH_RATIO: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LessonContent {
    Video {
        source_url: String,
        duration_seconds: f64,
        #[serde(default = "default_watch_ratio")]
        required_watch_ratio: f64,
    },
    Text {
        body: String,
    },
    Document {
        file_url: String,
    },
}

fn default_watch_ratio() -> f64 {
    DEFAULT_REQUIRED_WATCH_RATIO
}

impl LessonContent {
    pub fn kind(&self) -> LessonKind {
        match self {
            LessonContent::Video { .. } => LessonKind::Video,
            LessonContent::Text { .. } => LessonKind::Text,
            LessonContent::Document { .. } => LessonKind::Document,
        }
    }

}

#[derive(Debug, Error, PartialEq)]
pub enum LessonContentError {
    #[error("required watch ratio must be within (0, 1], got {value}")]
    WatchRatioOutOfRange { value: f64 },
    #[error("video duration must be positive, got {value}")]
    NonPositiveDuration { value: f64 },
    #[error("lesson {field} must not be empty")]
    EmptyField { field: &'static str },
}

pub fn validate_content(content: &LessonContent) -> Result<(), LessonContentError> {
    match content {
        LessonContent::Video {
            source_url,
            duration_seconds,
            required_watch_ratio,
        } => {
            if source_url.trim().is_empty() {
                return Err(LessonContentError::EmptyField {
                    field: "source url",
                });
            }
            if *duration_seconds <= 0.0 {
                return Err(LessonContentError::NonPositiveDuration {
                    value: *duration_seconds,
                });
            }
            if !(*required_watch_ratio > 0.0 && *required_watch_ratio <= 1.0) {
                return Err(LessonContentError::WatchRatioOutOfRange {
                    value: *required_watch_ratio,
                });
            }
            Ok(())
        }
        LessonContent::Text { body } => {
            if body.trim().is_empty() {
                return Err(LessonContentError::EmptyField { field: "body" });
            }
            Ok(())
        }
        LessonContent::Document { file_url } => {
            if file_url.trim().is_empty() {
                return Err(LessonContentError::EmptyField { field: "file url" });
            }
            Ok(())
        }
    }
}

/// Evidence presented when asking whether a lesson counts as completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionSignal {
    Explicit,
    WatchedRatio(f64),
}

/// Text and document lessons complete only on the explicit signal; video
/// lessons only when the watched ratio reaches the lesson's threshold. A
/// mismatched signal never completes anything.
pub fn completion_satisfied(content: &LessonContent, signal: CompletionSignal) -> bool {
    match (content, signal) {
        (
            LessonContent::Video {
                required_watch_ratio,
                ..
            },
            CompletionSignal::WatchedRatio(ratio),
        ) => ratio >= *required_watch_ratio,
        (
            LessonContent::Text { .. } | LessonContent::Document { .. },
            CompletionSignal::Explicit,
        ) => true,
        (LessonContent::Video { .. }, CompletionSignal::Explicit) => false,
        (
            LessonContent::Text { .. } | LessonContent::Document { .. },
            CompletionSignal::WatchedRatio(_),
        ) => false,
    }
}
