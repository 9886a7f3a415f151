//! Enrollment creation, drops, and paid-access grants.
//!
//! Enrollment is open to students on published courses only. Paid courses
//! additionally require an access grant, recorded by the payment
//! collaborator through an admin-scoped call before the learner enrolls.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::audit::AuditTrailService;
use crate::application::events::{DomainEvent, EventBus};
use crate::application::progress::recompute_enrollment;
use crate::application::repos::{
    CoursesRepo, CreateEnrollmentParams, EnrollmentsRepo, ProgressRepo, RepoError,
};
use crate::domain::actor::{AccessError, Actor, ActorRole};
use crate::domain::entities::{AccessGrantRecord, EnrollmentRecord};
use crate::domain::types::CourseState;

const METRIC_ENROLLMENTS_CREATED_TOTAL: &str = "aula_enrollments_created_total";

#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("course not found")]
    CourseNotFound,
    #[error("course is not open for enrollment, current state is `{}`", .state.as_str())]
    NotPublished { state: CourseState },
    #[error("paid course requires an access grant before enrollment")]
    PaymentRequired,
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct EnrollCommand {
    pub course_id: Uuid,
    /// Display name snapshotted onto the enrollment and any certificate.
    pub learner_name: String,
}

#[derive(Debug, Clone, Serialize)]
struct EnrollmentSnapshot<'a> {
    course_id: Uuid,
    learner_name: &'a str,
}

#[derive(Clone)]
pub struct EnrollmentService {
    pub(crate) courses: Arc<dyn CoursesRepo>,
    pub(crate) enrollments: Arc<dyn EnrollmentsRepo>,
    pub(crate) progress: Arc<dyn ProgressRepo>,
    pub(crate) audit: AuditTrailService,
    pub(crate) events: Arc<EventBus>,
}

impl EnrollmentService {
    pub fn new(
        courses: Arc<dyn CoursesRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        progress: Arc<dyn ProgressRepo>,
        audit: AuditTrailService,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            courses,
            enrollments,
            progress,
            audit,
            events,
        }
    }

    /// Record that a learner paid for a course. Idempotent.
    pub async fn grant_access(
        &self,
        actor: &Actor,
        course_id: Uuid,
        learner_id: Uuid,
    ) -> Result<AccessGrantRecord, EnrollmentError> {
        actor.require_role(ActorRole::Admin)?;
        if self.courses.find_course(course_id).await?.is_none() {
            return Err(EnrollmentError::CourseNotFound);
        }

        let grant = self
            .enrollments
            .grant_access(course_id, learner_id, OffsetDateTime::now_utc())
            .await?;

        self.audit
            .record(
                &actor.label(),
                "enrollment.grant_access",
                "access_grant",
                Some(&format!("{course_id}:{learner_id}")),
                None::<&()>,
            )
            .await?;

        Ok(grant)
    }

    /// Enroll the calling student in a published course.
    ///
    /// Enrolling twice returns the existing row. A previously dropped
    /// enrollment is reactivated with its completion history intact.
    pub async fn enroll(
        &self,
        actor: &Actor,
        command: EnrollCommand,
    ) -> Result<EnrollmentRecord, EnrollmentError> {
        actor.require_role(ActorRole::Student)?;
        if command.learner_name.trim().is_empty() {
            return Err(EnrollmentError::ConstraintViolation("learner_name"));
        }

        let course = self
            .courses
            .find_course(command.course_id)
            .await?
            .ok_or(EnrollmentError::CourseNotFound)?;
        if course.state != CourseState::Published {
            return Err(EnrollmentError::NotPublished {
                state: course.state,
            });
        }

        if course.is_paid {
            let granted = self
                .enrollments
                .has_access_grant(command.course_id, actor.id)
                .await?;
            if !granted {
                return Err(EnrollmentError::PaymentRequired);
            }
        }

        if let Some(existing) = self
            .enrollments
            .find_for_learner(command.course_id, actor.id)
            .await?
        {
            if existing.is_active() {
                return Ok(existing);
            }
            return self.reactivate(actor, existing).await;
        }

        let params = CreateEnrollmentParams {
            learner_id: actor.id,
            course_id: command.course_id,
            learner_name: command.learner_name,
        };
        let enrollment = match self.enrollments.create_enrollment(params).await {
            Ok(record) => record,
            // Lost a concurrent enroll race; the winner's row is ours too.
            Err(RepoError::Duplicate { .. }) => self
                .enrollments
                .find_for_learner(command.course_id, actor.id)
                .await?
                .ok_or(EnrollmentError::EnrollmentNotFound)?,
            Err(err) => return Err(err.into()),
        };

        counter!(METRIC_ENROLLMENTS_CREATED_TOTAL).increment(1);
        self.events
            .emit(DomainEvent::LearnerEnrolled {
                course_id: enrollment.course_id,
                enrollment_id: enrollment.id,
            })
            .await;

        let snapshot = EnrollmentSnapshot {
            course_id: enrollment.course_id,
            learner_name: &enrollment.learner_name,
        };
        self.audit
            .record(
                &actor.label(),
                "enrollment.create",
                "enrollment",
                Some(&enrollment.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(enrollment)
    }

    /// Drop the calling learner's enrollment. The row and its completion
    /// history stay on file; only `dropped_at` is set.
    pub async fn unenroll(
        &self,
        actor: &Actor,
        enrollment_id: Uuid,
    ) -> Result<EnrollmentRecord, EnrollmentError> {
        let enrollment = self
            .enrollments
            .find_enrollment(enrollment_id)
            .await?
            .ok_or(EnrollmentError::EnrollmentNotFound)?;
        actor.require_owner(enrollment.learner_id)?;

        if !enrollment.is_active() {
            return Ok(enrollment);
        }

        let dropped = self
            .enrollments
            .drop_enrollment(enrollment_id, OffsetDateTime::now_utc())
            .await?;

        let snapshot = EnrollmentSnapshot {
            course_id: dropped.course_id,
            learner_name: &dropped.learner_name,
        };
        self.audit
            .record(
                &actor.label(),
                "enrollment.drop",
                "enrollment",
                Some(&dropped.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(dropped)
    }

    async fn reactivate(
        &self,
        actor: &Actor,
        enrollment: EnrollmentRecord,
    ) -> Result<EnrollmentRecord, EnrollmentError> {
        let reactivated = self
            .enrollments
            .reactivate_enrollment(enrollment.id)
            .await?;

        // The course may have changed shape while the enrollment was
        // dropped; bring the stored percentage back in line.
        let outcome = recompute_enrollment(
            self.courses.as_ref(),
            self.enrollments.as_ref(),
            self.progress.as_ref(),
            &reactivated,
        )
        .await?;

        self.events
            .emit(DomainEvent::LearnerEnrolled {
                course_id: outcome.enrollment.course_id,
                enrollment_id: outcome.enrollment.id,
            })
            .await;

        let snapshot = EnrollmentSnapshot {
            course_id: outcome.enrollment.course_id,
            learner_name: &outcome.enrollment.learner_name,
        };
        self.audit
            .record(
                &actor.label(),
                "enrollment.reactivate",
                "enrollment",
                Some(&outcome.enrollment.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(outcome.enrollment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::application::pagination::{
        CatalogCursor, CursorPage, EnrollmentCursor, PageRequest, ReviewQueueCursor,
    };
    use crate::application::repos::{
        AuditRepo, CatalogQueryFilter, CheckpointUpsertParams, ContentCounts,
        UpdateEnrollmentProgressParams,
    };
    use crate::domain::entities::{
        AuditLogRecord, CourseRecord, LessonCompletionRecord, LessonRecord, ModuleRecord,
        PlaybackCheckpointRecord,
    };

    struct StubCoursesRepo {
        course: CourseRecord,
    }

    #[async_trait]
    impl CoursesRepo for StubCoursesRepo {
        async fn find_course(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError> {
            Ok(Some(self.course.clone()).filter(|course| course.id == id))
        }

        async fn find_module(
            &self,
            _course_id: Uuid,
            _module_id: Uuid,
        ) -> Result<Option<ModuleRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn find_lesson_in_course(
            &self,
            _course_id: Uuid,
            _lesson_id: Uuid,
        ) -> Result<Option<LessonRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn list_modules(&self, _course_id: Uuid) -> Result<Vec<ModuleRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn list_lessons(&self, _course_id: Uuid) -> Result<Vec<LessonRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn count_content(&self, _course_id: Uuid) -> Result<ContentCounts, RepoError> {
            Ok(ContentCounts {
                modules: 1,
                lessons: 4,
            })
        }

        async fn list_catalog(
            &self,
            _filter: &CatalogQueryFilter,
            _page: PageRequest<CatalogCursor>,
        ) -> Result<CursorPage<CourseRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn list_review_queue(
            &self,
            _page: PageRequest<ReviewQueueCursor>,
        ) -> Result<CursorPage<CourseRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn list_for_teacher(
            &self,
            _teacher_id: Uuid,
        ) -> Result<Vec<CourseRecord>, RepoError> {
            unreachable!("not used in these tests")
        }
    }

    #[derive(Default)]
    struct MemEnrollmentsRepo {
        rows: Mutex<Vec<EnrollmentRecord>>,
        grants: Mutex<Vec<(Uuid, Uuid)>>,
    }

    #[async_trait]
    impl EnrollmentsRepo for MemEnrollmentsRepo {
        async fn find_enrollment(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|row| row.id == id).cloned())
        }

        async fn find_for_learner(
            &self,
            course_id: Uuid,
            learner_id: Uuid,
        ) -> Result<Option<EnrollmentRecord>, RepoError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .find(|row| row.course_id == course_id && row.learner_id == learner_id)
                .cloned())
        }

        async fn create_enrollment(
            &self,
            params: CreateEnrollmentParams,
        ) -> Result<EnrollmentRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let exists = rows
                .iter()
                .any(|row| row.course_id == params.course_id && row.learner_id == params.learner_id);
            if exists {
                return Err(RepoError::Duplicate {
                    constraint: "enrollments_learner_id_course_id_key".into(),
                });
            }
            let now = OffsetDateTime::now_utc();
            let record = EnrollmentRecord {
                id: Uuid::new_v4(),
                learner_id: params.learner_id,
                course_id: params.course_id,
                learner_name: params.learner_name,
                progress_percentage: 0,
                completed_at: None,
                dropped_at: None,
                created_at: now,
                updated_at: now,
            };
            rows.push(record.clone());
            Ok(record)
        }

        async fn reactivate_enrollment(&self, id: Uuid) -> Result<EnrollmentRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or(RepoError::NotFound)?;
            row.dropped_at = None;
            row.updated_at = OffsetDateTime::now_utc();
            Ok(row.clone())
        }

        async fn drop_enrollment(
            &self,
            id: Uuid,
            dropped_at: OffsetDateTime,
        ) -> Result<EnrollmentRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or(RepoError::NotFound)?;
            row.dropped_at = Some(dropped_at);
            row.updated_at = dropped_at;
            Ok(row.clone())
        }

        async fn update_progress(
            &self,
            params: UpdateEnrollmentProgressParams,
        ) -> Result<EnrollmentRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.id == params.enrollment_id)
                .ok_or(RepoError::NotFound)?;
            row.progress_percentage = params.progress_percentage;
            row.completed_at = params.completed_at;
            row.updated_at = OffsetDateTime::now_utc();
            Ok(row.clone())
        }

        async fn list_for_course(
            &self,
            _course_id: Uuid,
            _page: PageRequest<EnrollmentCursor>,
        ) -> Result<CursorPage<EnrollmentRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn list_all_for_course(
            &self,
            _course_id: Uuid,
        ) -> Result<Vec<EnrollmentRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn list_for_learner(
            &self,
            _learner_id: Uuid,
        ) -> Result<Vec<EnrollmentRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn grant_access(
            &self,
            course_id: Uuid,
            learner_id: Uuid,
            granted_at: OffsetDateTime,
        ) -> Result<AccessGrantRecord, RepoError> {
            let mut grants = self.grants.lock().unwrap();
            if !grants.contains(&(course_id, learner_id)) {
                grants.push((course_id, learner_id));
            }
            Ok(AccessGrantRecord {
                course_id,
                learner_id,
                granted_at,
            })
        }

        async fn has_access_grant(
            &self,
            course_id: Uuid,
            learner_id: Uuid,
        ) -> Result<bool, RepoError> {
            let grants = self.grants.lock().unwrap();
            Ok(grants.contains(&(course_id, learner_id)))
        }

        async fn list_completed_missing_certificate(
            &self,
            _course_id: Option<Uuid>,
        ) -> Result<Vec<EnrollmentRecord>, RepoError> {
            unreachable!("not used in these tests")
        }
    }

    struct EmptyProgressRepo;

    #[async_trait]
    impl ProgressRepo for EmptyProgressRepo {
        async fn insert_completion(
            &self,
            _enrollment_id: Uuid,
            _lesson_id: Uuid,
            _completed_at: OffsetDateTime,
        ) -> Result<bool, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn upsert_checkpoint(
            &self,
            _params: CheckpointUpsertParams,
        ) -> Result<PlaybackCheckpointRecord, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn find_checkpoint(
            &self,
            _enrollment_id: Uuid,
            _lesson_id: Uuid,
        ) -> Result<Option<PlaybackCheckpointRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn count_completed_in_course(
            &self,
            _enrollment_id: Uuid,
            _course_id: Uuid,
        ) -> Result<u64, RepoError> {
            Ok(1)
        }

        async fn list_completions(
            &self,
            _enrollment_id: Uuid,
        ) -> Result<Vec<LessonCompletionRecord>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn list_checkpoints(
            &self,
            _enrollment_id: Uuid,
        ) -> Result<Vec<PlaybackCheckpointRecord>, RepoError> {
            unreachable!("not used in these tests")
        }
    }

    struct FakeAuditRepo;

    #[async_trait]
    impl AuditRepo for FakeAuditRepo {
        async fn append_log(&self, _record: AuditLogRecord) -> Result<(), RepoError> {
            Ok(())
        }

        async fn list_recent(&self, _limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
            Ok(Vec::new())
        }
    }

    fn course_in(state: CourseState, is_paid: bool) -> CourseRecord {
        let now = OffsetDateTime::now_utc();
        CourseRecord {
            id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            title: "Clinical Pharmacology".into(),
            description: "Dosing, interactions, and monitoring.".into(),
            is_paid,
            price_cents: if is_paid { 4900 } else { 0 },
            tags: Vec::new(),
            internal_notes: None,
            ce_credit_hours: None,
            state,
            admin_approved: state == CourseState::Published,
            review_feedback: None,
            submitted_at: None,
            approved_at: None,
            published_at: (state == CourseState::Published).then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn service_for(course: CourseRecord) -> (EnrollmentService, Arc<MemEnrollmentsRepo>) {
        let enrollments = Arc::new(MemEnrollmentsRepo::default());
        let audit = AuditTrailService::new(Arc::new(FakeAuditRepo));
        let service = EnrollmentService::new(
            Arc::new(StubCoursesRepo { course }),
            enrollments.clone(),
            Arc::new(EmptyProgressRepo),
            audit,
            Arc::new(EventBus::new(Vec::new())),
        );
        (service, enrollments)
    }

    fn enroll_command(course_id: Uuid) -> EnrollCommand {
        EnrollCommand {
            course_id,
            learner_name: "Amara Osei".into(),
        }
    }

    #[tokio::test]
    async fn enroll_rejects_unpublished_course() {
        let course = course_in(CourseState::Draft, false);
        let course_id = course.id;
        let (service, _repo) = service_for(course);
        let student = Actor::new(Uuid::new_v4(), ActorRole::Student);

        let err = service
            .enroll(&student, enroll_command(course_id))
            .await
            .unwrap_err();
        match err {
            EnrollmentError::NotPublished { state } => assert_eq!(state, CourseState::Draft),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn enroll_requires_student_role() {
        let course = course_in(CourseState::Published, false);
        let course_id = course.id;
        let (service, _repo) = service_for(course);
        let teacher = Actor::new(Uuid::new_v4(), ActorRole::Teacher);

        let err = service
            .enroll(&teacher, enroll_command(course_id))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::Access(_)));
    }

    #[tokio::test]
    async fn paid_course_requires_grant_before_enrollment() {
        let course = course_in(CourseState::Published, true);
        let course_id = course.id;
        let (service, _repo) = service_for(course);
        let student = Actor::new(Uuid::new_v4(), ActorRole::Student);
        let admin = Actor::new(Uuid::new_v4(), ActorRole::Admin);

        let err = service
            .enroll(&student, enroll_command(course_id))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::PaymentRequired));

        service
            .grant_access(&admin, course_id, student.id)
            .await
            .expect("grant recorded");

        let enrollment = service
            .enroll(&student, enroll_command(course_id))
            .await
            .expect("enrolled after grant");
        assert_eq!(enrollment.learner_id, student.id);
    }

    #[tokio::test]
    async fn double_enroll_returns_existing_row() {
        let course = course_in(CourseState::Published, false);
        let course_id = course.id;
        let (service, _repo) = service_for(course);
        let student = Actor::new(Uuid::new_v4(), ActorRole::Student);

        let first = service
            .enroll(&student, enroll_command(course_id))
            .await
            .expect("enrolled");
        let second = service
            .enroll(&student, enroll_command(course_id))
            .await
            .expect("enrolled again");

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn reenroll_reactivates_dropped_row_and_recomputes() {
        let course = course_in(CourseState::Published, false);
        let course_id = course.id;
        let (service, _repo) = service_for(course);
        let student = Actor::new(Uuid::new_v4(), ActorRole::Student);

        let enrollment = service
            .enroll(&student, enroll_command(course_id))
            .await
            .expect("enrolled");
        let dropped = service
            .unenroll(&student, enrollment.id)
            .await
            .expect("dropped");
        assert!(dropped.dropped_at.is_some());

        let back = service
            .enroll(&student, enroll_command(course_id))
            .await
            .expect("re-enrolled");
        assert_eq!(back.id, enrollment.id);
        assert!(back.dropped_at.is_none());
        // One completion against four lessons after the stubbed recompute.
        assert_eq!(back.progress_percentage, 25);
    }

    #[tokio::test]
    async fn unenroll_is_idempotent() {
        let course = course_in(CourseState::Published, false);
        let course_id = course.id;
        let (service, _repo) = service_for(course);
        let student = Actor::new(Uuid::new_v4(), ActorRole::Student);

        let enrollment = service
            .enroll(&student, enroll_command(course_id))
            .await
            .expect("enrolled");
        let first = service
            .unenroll(&student, enrollment.id)
            .await
            .expect("dropped");
        let second = service
            .unenroll(&student, enrollment.id)
            .await
            .expect("dropped again");

        assert_eq!(first.dropped_at, second.dropped_at);
    }
}
