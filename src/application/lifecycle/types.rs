use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::actor::AccessError;
use crate::domain::entities::{CourseRecord, LessonRecord, ModuleRecord};
use crate::domain::lessons::{LessonContent, LessonContentError};
use crate::domain::lifecycle::EditImpact;
use crate::domain::types::{CourseState, LessonKind, ReviewDecision};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("course not found")]
    CourseNotFound,
    #[error("module not found")]
    ModuleNotFound,
    #[error("lesson not found")]
    LessonNotFound,
    #[error(transparent)]
    InvalidContent(#[from] LessonContentError),
    #[error("course cannot be submitted from state `{}`", .state.as_str())]
    NotSubmittable { state: CourseState },
    #[error("course is already under review")]
    AlreadyUnderReview,
    #[error(
        "course needs at least one module and one lesson before review \
         ({modules} modules, {lessons} lessons)"
    )]
    IncompleteContent { modules: u64, lessons: u64 },
    #[error("review already decided, course is in state `{}`", .state.as_str())]
    AlreadyDecided { state: CourseState },
    #[error("course cannot be published from state `{}`", .state.as_str())]
    NotApproved { state: CourseState },
    #[error("course is under review and cannot be edited")]
    UnderReview,
    #[error("course was modified concurrently, retry the request")]
    EditConflict,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseSummarySnapshot<'a> {
    pub title: &'a str,
    pub state: CourseState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewSnapshot<'a> {
    pub title: &'a str,
    pub decision: &'a str,
    pub feedback: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSnapshot<'a> {
    pub course_title: &'a str,
    pub module_title: &'a str,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonSnapshot<'a> {
    pub module_title: &'a str,
    pub lesson_title: &'a str,
    pub kind: LessonKind,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct CreateCourseCommand {
    pub title: String,
    pub description: String,
    pub is_paid: bool,
    pub price_cents: i64,
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
}

/// Full-replacement edit of a course's own fields.
#[derive(Debug, Clone)]
pub struct EditCourseCommand {
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub is_paid: bool,
    pub price_cents: i64,
    pub tags: Vec<String>,
    pub internal_notes: Option<String>,
    pub ce_credit_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AddModuleCommand {
    pub course_id: Uuid,
    pub title: String,
    /// Appended after the last module when absent.
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
pub struct RemoveModuleCommand {
    pub course_id: Uuid,
    pub module_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct AddLessonCommand {
    pub course_id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    /// Appended after the last lesson in the module when absent.
    pub position: Option<i32>,
    pub content: LessonContent,
}

#[derive(Debug, Clone, Copy)]
pub struct RemoveLessonCommand {
    pub course_id: Uuid,
    pub lesson_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ReviewCourseCommand {
    pub course_id: Uuid,
    pub decision: ReviewDecision,
    pub feedback: Option<String>,
}

/// Course with its modules and lessons in position order.
#[derive(Debug, Clone, Serialize)]
pub struct CourseOutline {
    pub course: CourseRecord,
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleOutline {
    pub module: ModuleRecord,
    pub lessons: Vec<LessonRecord>,
}

/// Normalized pricing pair. Free courses always carry a zero price.
#[derive(Debug, Clone, Copy)]
pub struct PricingFields {
    pub is_paid: bool,
    pub price_cents: i64,
}

pub fn normalize_pricing(is_paid: bool, price_cents: i64) -> Result<PricingFields, LifecycleError> {
    if is_paid {
        if price_cents <= 0 {
            return Err(LifecycleError::ConstraintViolation("price_cents"));
        }
        Ok(PricingFields {
            is_paid,
            price_cents,
        })
    } else {
        Ok(PricingFields {
            is_paid: false,
            price_cents: 0,
        })
    }
}

pub fn ensure_non_empty(value: &str, field: &'static str) -> Result<(), LifecycleError> {
    if value.trim().is_empty() {
        return Err(LifecycleError::ConstraintViolation(field));
    }
    Ok(())
}

pub fn validate_ce_credit_hours(hours: Option<f64>) -> Result<(), LifecycleError> {
    if let Some(value) = hours {
        if !value.is_finite() || value < 0.0 {
            return Err(LifecycleError::ConstraintViolation("ce_credit_hours"));
        }
    }
    Ok(())
}

/// Classify an edit by comparing the incoming fields against the stored row.
///
/// Only a change to a field reviewers actually look at (title, description,
/// pricing) counts as review relevant. Re-sending the current values does
/// not demote an approved course.
pub(crate) fn classify_edit(current: &CourseRecord, command: &EditCourseCommand) -> EditImpact {
    if command.title != current.title
        || command.description != current.description
        || command.is_paid != current.is_paid
        || command.price_cents != current.price_cents
    {
        EditImpact::ReviewRelevant
    } else {
        EditImpact::Metadata
    }
}

/// Group a course's lessons under their modules, both in position order.
pub(crate) fn assemble_outline(
    course: CourseRecord,
    modules: Vec<ModuleRecord>,
    lessons: Vec<LessonRecord>,
) -> CourseOutline {
    let mut grouped: Vec<ModuleOutline> = modules
        .into_iter()
        .map(|module| ModuleOutline {
            module,
            lessons: Vec::new(),
        })
        .collect();

    for lesson in lessons {
        if let Some(outline) = grouped
            .iter_mut()
            .find(|outline| outline.module.id == lesson.module_id)
        {
            outline.lessons.push(lesson);
        }
    }

    for outline in &mut grouped {
        outline.lessons.sort_by_key(|lesson| lesson.position);
    }
    grouped.sort_by_key(|outline| outline.module.position);

    CourseOutline {
        course,
        modules: grouped,
    }
}
