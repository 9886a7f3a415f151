//! Learner progress tracking.
//!
//! Lesson events come in two shapes. Text and document lessons complete
//! through an explicit mark; video lessons complete when the stored watch
//! ratio reaches the lesson's threshold. Stored enrollment percentage is
//! always recomputed from completion rows against the current lesson set,
//! never incremented in place.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::audit::AuditTrailService;
use crate::application::certificates::{CertificateError, CertificateService};
use crate::application::events::{DomainEvent, EventBus};
use crate::application::repos::{
    CheckpointUpsertParams, CoursesRepo, EnrollmentsRepo, ProgressRepo, RepoError,
    UpdateEnrollmentProgressParams,
};
use crate::domain::actor::{AccessError, Actor};
use crate::domain::entities::{
    EnrollmentRecord, LessonCompletionRecord, PlaybackCheckpointRecord,
};
use crate::domain::lessons::{CompletionSignal, LessonContent, completion_satisfied};
use crate::domain::progress::{LessonEvent, progress_percentage, watched_ratio};
use crate::domain::types::LessonKind;

const METRIC_LESSONS_COMPLETED_TOTAL: &str = "aula_lessons_completed_total";
const METRIC_PROGRESS_RECOMPUTE_MS: &str = "aula_progress_recompute_ms";

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("lesson not found in this course")]
    LessonNotFound,
    #[error("enrollment was dropped and no longer accepts progress")]
    EnrollmentInactive,
    #[error("playback position cannot be negative, got {value}")]
    NegativePosition { value: f64 },
    #[error("playback duration must be positive, got {value}")]
    NonPositiveDuration { value: f64 },
    #[error("lesson `{lesson_id}` is a `{}` lesson and does not accept playback", .kind.as_str())]
    PlaybackNotSupported { lesson_id: Uuid, kind: LessonKind },
    #[error("video lesson `{lesson_id}` completes through playback, not an explicit mark")]
    ExplicitMarkNotAllowed { lesson_id: Uuid },
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Outcome of a single lesson event.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub enrollment: EnrollmentRecord,
    /// Whether this event recorded a new lesson completion.
    pub lesson_completed: bool,
    pub checkpoint: Option<PlaybackCheckpointRecord>,
}

/// Full progress view for one enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub enrollment: EnrollmentRecord,
    pub total_lessons: u64,
    pub completed_lessons: u64,
    pub completions: Vec<LessonCompletionRecord>,
    pub checkpoints: Vec<PlaybackCheckpointRecord>,
}

#[derive(Debug, Clone, Serialize)]
struct CompletionSnapshot<'a> {
    lesson_title: &'a str,
    progress_percentage: i16,
}

#[derive(Clone)]
pub struct ProgressService {
    pub(crate) courses: Arc<dyn CoursesRepo>,
    pub(crate) enrollments: Arc<dyn EnrollmentsRepo>,
    pub(crate) progress: Arc<dyn ProgressRepo>,
    pub(crate) certificates: CertificateService,
    pub(crate) audit: AuditTrailService,
    pub(crate) events: Arc<EventBus>,
}

impl ProgressService {
    pub fn new(
        courses: Arc<dyn CoursesRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        progress: Arc<dyn ProgressRepo>,
        certificates: CertificateService,
        audit: AuditTrailService,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            courses,
            enrollments,
            progress,
            certificates,
            audit,
            events,
        }
    }

    /// Record a lesson event for the calling learner's enrollment.
    pub async fn record_lesson_event(
        &self,
        actor: &Actor,
        enrollment_id: Uuid,
        lesson_id: Uuid,
        event: LessonEvent,
    ) -> Result<ProgressUpdate, ProgressError> {
        let enrollment = self
            .enrollments
            .find_enrollment(enrollment_id)
            .await?
            .ok_or(ProgressError::EnrollmentNotFound)?;
        actor.require_owner(enrollment.learner_id)?;
        if !enrollment.is_active() {
            return Err(ProgressError::EnrollmentInactive);
        }

        let lesson = self
            .courses
            .find_lesson_in_course(enrollment.course_id, lesson_id)
            .await?
            .ok_or(ProgressError::LessonNotFound)?;

        let (signal, checkpoint) = match event {
            LessonEvent::MarkComplete => {
                if matches!(lesson.content, LessonContent::Video { .. }) {
                    return Err(ProgressError::ExplicitMarkNotAllowed { lesson_id });
                }
                (CompletionSignal::Explicit, None)
            }
            LessonEvent::PlaybackUpdate {
                position_seconds,
                duration_seconds,
            } => {
                if position_seconds < 0.0 {
                    return Err(ProgressError::NegativePosition {
                        value: position_seconds,
                    });
                }
                if duration_seconds <= 0.0 {
                    return Err(ProgressError::NonPositiveDuration {
                        value: duration_seconds,
                    });
                }
                if !matches!(lesson.content, LessonContent::Video { .. }) {
                    return Err(ProgressError::PlaybackNotSupported {
                        lesson_id,
                        kind: lesson.content.kind(),
                    });
                }

                let ratio = watched_ratio(position_seconds, duration_seconds);
                let stored = self
                    .progress
                    .upsert_checkpoint(CheckpointUpsertParams {
                        enrollment_id,
                        lesson_id,
                        position_seconds,
                        watched_ratio: ratio,
                        updated_at: OffsetDateTime::now_utc(),
                    })
                    .await?;

                // Evaluate against the stored (monotonic max) ratio so a
                // stale retry cannot undo an earlier threshold crossing.
                let signal = CompletionSignal::WatchedRatio(stored.watched_ratio);
                (signal, Some(stored))
            }
        };

        if !completion_satisfied(&lesson.content, signal) {
            return Ok(ProgressUpdate {
                enrollment,
                lesson_completed: false,
                checkpoint,
            });
        }

        let created = self
            .progress
            .insert_completion(enrollment_id, lesson_id, OffsetDateTime::now_utc())
            .await?;
        if !created {
            // Duplicate event; stored progress is already correct.
            return Ok(ProgressUpdate {
                enrollment,
                lesson_completed: false,
                checkpoint,
            });
        }

        counter!(METRIC_LESSONS_COMPLETED_TOTAL).increment(1);
        self.events
            .emit(DomainEvent::LessonCompleted {
                enrollment_id,
                lesson_id,
            })
            .await;

        let recompute_started_at = Instant::now();
        let outcome = recompute_enrollment(
            self.courses.as_ref(),
            self.enrollments.as_ref(),
            self.progress.as_ref(),
            &enrollment,
        )
        .await?;
        histogram!(METRIC_PROGRESS_RECOMPUTE_MS)
            .record(recompute_started_at.elapsed().as_secs_f64() * 1000.0);

        let snapshot = CompletionSnapshot {
            lesson_title: &lesson.title,
            progress_percentage: outcome.enrollment.progress_percentage,
        };
        self.audit
            .record(
                &actor.label(),
                "progress.lesson_complete",
                "enrollment",
                Some(&enrollment_id.to_string()),
                Some(&snapshot),
            )
            .await?;

        if outcome.crossed_to_complete {
            self.events
                .emit(DomainEvent::CourseCompleted {
                    course_id: outcome.enrollment.course_id,
                    enrollment_id,
                })
                .await;
            self.certificates
                .issue_for_completed(&actor.label(), &outcome.enrollment)
                .await?;
        }

        Ok(ProgressUpdate {
            enrollment: outcome.enrollment,
            lesson_completed: true,
            checkpoint,
        })
    }

    /// Progress detail for the learner, the course's teacher, or an admin.
    pub async fn get_progress(
        &self,
        actor: &Actor,
        enrollment_id: Uuid,
    ) -> Result<ProgressReport, ProgressError> {
        let enrollment = self
            .enrollments
            .find_enrollment(enrollment_id)
            .await?
            .ok_or(ProgressError::EnrollmentNotFound)?;

        if actor.id != enrollment.learner_id {
            let course = self
                .courses
                .find_course(enrollment.course_id)
                .await?
                .ok_or(ProgressError::EnrollmentNotFound)?;
            if !actor.can_view_unpublished(course.teacher_id) {
                return Err(AccessError::NotOwner { actor: actor.id }.into());
            }
        }

        let counts = self.courses.count_content(enrollment.course_id).await?;
        let completed = self
            .progress
            .count_completed_in_course(enrollment_id, enrollment.course_id)
            .await?;
        let completions = self.progress.list_completions(enrollment_id).await?;
        let checkpoints = self.progress.list_checkpoints(enrollment_id).await?;

        Ok(ProgressReport {
            enrollment,
            total_lessons: counts.lessons,
            completed_lessons: completed,
            completions,
            checkpoints,
        })
    }

    pub async fn my_enrollments(
        &self,
        actor: &Actor,
    ) -> Result<Vec<EnrollmentRecord>, ProgressError> {
        self.enrollments
            .list_for_learner(actor.id)
            .await
            .map_err(ProgressError::from)
    }
}

/// Outcome of recomputing one enrollment's stored progress.
#[derive(Debug, Clone)]
pub(crate) struct RecomputeOutcome {
    pub enrollment: EnrollmentRecord,
    /// The enrollment reached 100 percent in this recompute.
    pub crossed_to_complete: bool,
}

/// Recompute stored percentage from completion rows and the current lesson
/// set. Sets `completed_at` on the crossing to 100 and clears it when a
/// structure change pushes the percentage back below 100.
pub(crate) async fn recompute_enrollment(
    courses: &dyn CoursesRepo,
    enrollments: &dyn EnrollmentsRepo,
    progress: &dyn ProgressRepo,
    enrollment: &EnrollmentRecord,
) -> Result<RecomputeOutcome, RepoError> {
    let counts = courses.count_content(enrollment.course_id).await?;
    let completed = progress
        .count_completed_in_course(enrollment.id, enrollment.course_id)
        .await?;
    let percentage = progress_percentage(completed, counts.lessons);

    let was_complete = enrollment.completed_at.is_some();
    let completed_at = if percentage == 100 {
        enrollment
            .completed_at
            .or_else(|| Some(OffsetDateTime::now_utc()))
    } else {
        None
    };

    if percentage == enrollment.progress_percentage && completed_at == enrollment.completed_at {
        return Ok(RecomputeOutcome {
            enrollment: enrollment.clone(),
            crossed_to_complete: false,
        });
    }

    let updated = enrollments
        .update_progress(UpdateEnrollmentProgressParams {
            enrollment_id: enrollment.id,
            progress_percentage: percentage,
            completed_at,
        })
        .await?;

    Ok(RecomputeOutcome {
        crossed_to_complete: !was_complete && updated.completed_at.is_some(),
        enrollment: updated,
    })
}
