use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use uuid::Uuid;

use aula::application::audit::AuditTrailService;
use aula::application::certificates::CertificateService;
use aula::application::enrollments::{EnrollCommand, EnrollmentService};
use aula::application::events::EventBus;
use aula::application::lifecycle::{
    AddLessonCommand, AddModuleCommand, CourseLifecycleService, CreateCourseCommand,
    ReviewCourseCommand,
};
use aula::application::progress::ProgressService;
use aula::application::repos::{
    AuditRepo, CertificatesRepo, CoursesRepo, CoursesWriteRepo, EnrollmentsRepo, ProgressRepo,
};
use aula::domain::actor::{Actor, ActorRole};
use aula::domain::lessons::LessonContent;
use aula::domain::progress::LessonEvent;
use aula::domain::types::ReviewDecision;
use aula::infra::db::MemoryRepositories;
use aula::infra::http::ApiState;

fn build_state() -> ApiState {
    let repositories = Arc::new(MemoryRepositories::new());

    let courses_repo: Arc<dyn CoursesRepo> = repositories.clone();
    let courses_write_repo: Arc<dyn CoursesWriteRepo> = repositories.clone();
    let enrollments_repo: Arc<dyn EnrollmentsRepo> = repositories.clone();
    let progress_repo: Arc<dyn ProgressRepo> = repositories.clone();
    let certificates_repo: Arc<dyn CertificatesRepo> = repositories.clone();
    let audit_repo: Arc<dyn AuditRepo> = repositories.clone();

    let events = Arc::new(EventBus::default());
    let audit = AuditTrailService::new(audit_repo);

    let certificates = CertificateService::new(
        courses_repo.clone(),
        enrollments_repo.clone(),
        certificates_repo,
        audit.clone(),
        events.clone(),
    );
    let lifecycle = CourseLifecycleService::new(
        courses_repo.clone(),
        courses_write_repo,
        enrollments_repo.clone(),
        progress_repo.clone(),
        audit.clone(),
        events.clone(),
    );
    let enrollments = EnrollmentService::new(
        courses_repo.clone(),
        enrollments_repo.clone(),
        progress_repo.clone(),
        audit.clone(),
        events.clone(),
    );
    let progress = ProgressService::new(
        courses_repo,
        enrollments_repo,
        progress_repo,
        certificates.clone(),
        audit.clone(),
        events,
    );

    ApiState {
        lifecycle,
        enrollments,
        progress,
        certificates,
        audit,
        db: None,
    }
}

#[tokio::test]
async fn engine_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let state = build_state();
    let owner = Actor::new(Uuid::new_v4(), ActorRole::Teacher);
    let reviewer = Actor::new(Uuid::new_v4(), ActorRole::Admin);
    let learner = Actor::new(Uuid::new_v4(), ActorRole::Student);

    // One text lesson, so a single completion finishes the course and
    // issues the certificate in the same call.
    let course = state
        .lifecycle
        .create_course(
            &owner,
            CreateCourseCommand {
                title: "Metrics course".to_owned(),
                description: "Counts every step".to_owned(),
                is_paid: false,
                price_cents: 0,
                tags: Vec::new(),
                internal_notes: None,
                ce_credit_hours: None,
            },
        )
        .await
        .expect("create course");
    let module = state
        .lifecycle
        .add_module(
            &owner,
            AddModuleCommand {
                course_id: course.id,
                title: "Only module".to_owned(),
                position: None,
            },
        )
        .await
        .expect("add module");
    let lesson = state
        .lifecycle
        .add_lesson(
            &owner,
            AddLessonCommand {
                course_id: course.id,
                module_id: module.id,
                title: "Only lesson".to_owned(),
                position: None,
                content: LessonContent::Text {
                    body: "A single page of notes.".to_owned(),
                },
            },
        )
        .await
        .expect("add lesson");
    state
        .lifecycle
        .submit_for_review(&owner, course.id)
        .await
        .expect("submit for review");
    state
        .lifecycle
        .review_course(
            &reviewer,
            ReviewCourseCommand {
                course_id: course.id,
                decision: ReviewDecision::Approve,
                feedback: None,
            },
        )
        .await
        .expect("approve course");
    state
        .lifecycle
        .publish_course(&owner, course.id)
        .await
        .expect("publish course");

    let enrollment = state
        .enrollments
        .enroll(
            &learner,
            EnrollCommand {
                course_id: course.id,
                learner_name: "Metrics Learner".to_owned(),
            },
        )
        .await
        .expect("enroll");

    let update = state
        .progress
        .record_lesson_event(&learner, enrollment.id, lesson.id, LessonEvent::MarkComplete)
        .await
        .expect("complete lesson");
    assert!(update.lesson_completed);
    assert_eq!(update.enrollment.progress_percentage, 100);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "aula_courses_published_total",
        "aula_review_decisions_total",
        "aula_enrollments_created_total",
        "aula_lessons_completed_total",
        "aula_certificates_issued_total",
        "aula_progress_recompute_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
