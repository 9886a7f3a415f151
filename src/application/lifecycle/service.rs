use std::sync::Arc;

use crate::application::audit::AuditTrailService;
use crate::application::events::EventBus;
use crate::application::repos::{CoursesRepo, CoursesWriteRepo, EnrollmentsRepo, ProgressRepo};

/// Drives every course mutation through the review lifecycle rules.
#[derive(Clone)]
pub struct CourseLifecycleService {
    pub(crate) reader: Arc<dyn CoursesRepo>,
    pub(crate) writer: Arc<dyn CoursesWriteRepo>,
    pub(crate) enrollments: Arc<dyn EnrollmentsRepo>,
    pub(crate) progress: Arc<dyn ProgressRepo>,
    pub(crate) audit: AuditTrailService,
    pub(crate) events: Arc<EventBus>,
}

impl CourseLifecycleService {
    pub fn new(
        reader: Arc<dyn CoursesRepo>,
        writer: Arc<dyn CoursesWriteRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        progress: Arc<dyn ProgressRepo>,
        audit: AuditTrailService,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            reader,
            writer,
            enrollments,
            progress,
            audit,
            events,
        }
    }
}
