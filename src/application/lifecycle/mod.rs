mod commands;
mod queries;
mod service;
pub mod types;

pub use service::*;
pub use types::{
    AddLessonCommand, AddModuleCommand, CourseOutline, CourseSummarySnapshot, CreateCourseCommand,
    EditCourseCommand, LifecycleError, ModuleOutline, RemoveLessonCommand, RemoveModuleCommand,
    ReviewCourseCommand, ensure_non_empty, normalize_pricing, validate_ce_credit_hours,
};
