use std::sync::Arc;

use crate::application::audit::AuditTrailService;
use crate::application::certificates::CertificateService;
use crate::application::enrollments::EnrollmentService;
use crate::application::lifecycle::CourseLifecycleService;
use crate::application::progress::ProgressService;
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: CourseLifecycleService,
    pub enrollments: EnrollmentService,
    pub progress: ProgressService,
    pub certificates: CertificateService,
    pub audit: AuditTrailService,
    /// `None` when serving from the in-memory store; the database health
    /// probe then reports healthy unconditionally.
    pub db: Option<Arc<PostgresRepositories>>,
}
