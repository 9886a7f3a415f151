use metrics::counter;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::events::DomainEvent;
use crate::application::progress::recompute_enrollment;
use crate::application::repos::{
    AddLessonParams, AddModuleParams, CourseEditParams, CourseMetadataParams, CourseStateGuard,
    CreateCourseParams, DecideCourseParams, RemoveLessonParams, RemoveModuleParams, RepoError,
};
use crate::domain::actor::{Actor, ActorRole};
use crate::domain::entities::{CourseRecord, LessonRecord, ModuleRecord};
use crate::domain::lessons::validate_content;
use crate::domain::lifecycle::{EditImpact, can_decide, can_publish, can_submit, edit_transition};
use crate::domain::types::{CourseState, ReviewDecision};

use super::service::CourseLifecycleService;
use super::types::{
    AddLessonCommand, AddModuleCommand, CourseSummarySnapshot, CreateCourseCommand,
    EditCourseCommand, LessonSnapshot, LifecycleError, ModuleSnapshot, RemoveLessonCommand,
    RemoveModuleCommand, ReviewCourseCommand, ReviewSnapshot, classify_edit, ensure_non_empty,
    normalize_pricing, validate_ce_credit_hours,
};

const METRIC_COURSES_PUBLISHED_TOTAL: &str = "aula_courses_published_total";
const METRIC_REVIEW_DECISIONS_TOTAL: &str = "aula_review_decisions_total";

/// Translate a compare-and-set miss on the course row into a precise error.
fn classify_guard_miss(current: Option<CourseRecord>) -> LifecycleError {
    match current {
        None => LifecycleError::CourseNotFound,
        Some(course) if course.state == CourseState::Submitted => LifecycleError::UnderReview,
        Some(_) => LifecycleError::EditConflict,
    }
}

impl CourseLifecycleService {
    pub async fn create_course(
        &self,
        actor: &Actor,
        command: CreateCourseCommand,
    ) -> Result<CourseRecord, LifecycleError> {
        actor.require_role(ActorRole::Teacher)?;
        ensure_non_empty(&command.title, "title")?;
        ensure_non_empty(&command.description, "description")?;
        let pricing = normalize_pricing(command.is_paid, command.price_cents)?;
        validate_ce_credit_hours(command.ce_credit_hours)?;

        let params = CreateCourseParams {
            teacher_id: actor.id,
            title: command.title,
            description: command.description,
            is_paid: pricing.is_paid,
            price_cents: pricing.price_cents,
            tags: command.tags,
            internal_notes: command.internal_notes,
            ce_credit_hours: command.ce_credit_hours,
        };

        let course = self.writer.create_course(params).await?;

        let snapshot = CourseSummarySnapshot {
            title: &course.title,
            state: course.state,
        };
        self.audit
            .record(
                &actor.label(),
                "course.create",
                "course",
                Some(&course.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(course)
    }

    /// Apply a full-field edit, classifying it as metadata-only or review
    /// relevant. Review-relevant edits to an approved or published course
    /// demote it back to draft in the same write.
    pub async fn edit_course(
        &self,
        actor: &Actor,
        command: EditCourseCommand,
    ) -> Result<CourseRecord, LifecycleError> {
        let course = self.load_course(command.course_id).await?;
        actor.require_owner(course.teacher_id)?;
        ensure_non_empty(&command.title, "title")?;
        ensure_non_empty(&command.description, "description")?;
        let pricing = normalize_pricing(command.is_paid, command.price_cents)?;
        validate_ce_credit_hours(command.ce_credit_hours)?;

        let command = EditCourseCommand {
            is_paid: pricing.is_paid,
            price_cents: pricing.price_cents,
            ..command
        };

        match classify_edit(&course, &command) {
            EditImpact::Metadata => {
                let params = CourseMetadataParams {
                    id: command.course_id,
                    tags: command.tags,
                    internal_notes: command.internal_notes,
                    ce_credit_hours: command.ce_credit_hours,
                };
                let updated = self.writer.update_course_metadata(params).await.map_err(
                    |err| match err {
                        RepoError::NotFound => LifecycleError::CourseNotFound,
                        other => LifecycleError::Repo(other),
                    },
                )?;

                let snapshot = CourseSummarySnapshot {
                    title: &updated.title,
                    state: updated.state,
                };
                self.audit
                    .record(
                        &actor.label(),
                        "course.update_metadata",
                        "course",
                        Some(&updated.id.to_string()),
                        Some(&snapshot),
                    )
                    .await?;

                Ok(updated)
            }
            EditImpact::ReviewRelevant => {
                let guard = self.structural_guard(&course)?;
                let params = CourseEditParams {
                    id: command.course_id,
                    title: command.title,
                    description: command.description,
                    is_paid: command.is_paid,
                    price_cents: command.price_cents,
                    tags: command.tags,
                    internal_notes: command.internal_notes,
                    ce_credit_hours: command.ce_credit_hours,
                    guard,
                };

                let updated = match self.writer.apply_course_edit(params).await? {
                    Some(record) => record,
                    None => {
                        let current = self.reader.find_course(command.course_id).await?;
                        return Err(classify_guard_miss(current));
                    }
                };

                if guard.demote_to_draft {
                    self.events
                        .emit(DomainEvent::CourseReverted {
                            course_id: updated.id,
                        })
                        .await;
                }

                let snapshot = CourseSummarySnapshot {
                    title: &updated.title,
                    state: updated.state,
                };
                self.audit
                    .record(
                        &actor.label(),
                        "course.update",
                        "course",
                        Some(&updated.id.to_string()),
                        Some(&snapshot),
                    )
                    .await?;

                Ok(updated)
            }
        }
    }

    pub async fn add_module(
        &self,
        actor: &Actor,
        command: AddModuleCommand,
    ) -> Result<ModuleRecord, LifecycleError> {
        let course = self.load_course(command.course_id).await?;
        actor.require_owner(course.teacher_id)?;
        ensure_non_empty(&command.title, "title")?;

        let guard = self.structural_guard(&course)?;
        let position = match command.position {
            Some(position) => {
                if position < 0 {
                    return Err(LifecycleError::ConstraintViolation("position"));
                }
                position
            }
            None => {
                let modules = self.reader.list_modules(command.course_id).await?;
                modules
                    .iter()
                    .map(|module| module.position)
                    .max()
                    .map_or(0, |last| last + 1)
            }
        };

        let params = AddModuleParams {
            course_id: command.course_id,
            title: command.title,
            position,
            guard,
        };

        let module = match self.writer.add_module(params).await? {
            Some(record) => record,
            None => {
                let current = self.reader.find_course(command.course_id).await?;
                return Err(classify_guard_miss(current));
            }
        };

        if guard.demote_to_draft {
            self.events
                .emit(DomainEvent::CourseReverted {
                    course_id: course.id,
                })
                .await;
        }

        let snapshot = ModuleSnapshot {
            course_title: &course.title,
            module_title: &module.title,
            position: module.position,
        };
        self.audit
            .record(
                &actor.label(),
                "course.add_module",
                "module",
                Some(&module.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(module)
    }

    pub async fn remove_module(
        &self,
        actor: &Actor,
        command: RemoveModuleCommand,
    ) -> Result<(), LifecycleError> {
        let course = self.load_course(command.course_id).await?;
        actor.require_owner(course.teacher_id)?;

        let module = self
            .reader
            .find_module(command.course_id, command.module_id)
            .await?
            .ok_or(LifecycleError::ModuleNotFound)?;

        let guard = self.structural_guard(&course)?;
        let params = RemoveModuleParams {
            course_id: command.course_id,
            module_id: command.module_id,
            guard,
        };

        if self.writer.remove_module(params).await?.is_none() {
            let current = self.reader.find_course(command.course_id).await?;
            return Err(classify_guard_miss(current));
        }

        if guard.demote_to_draft {
            self.events
                .emit(DomainEvent::CourseReverted {
                    course_id: course.id,
                })
                .await;
        }

        // Cascaded lesson deletions change every enrollment's denominator.
        self.sweep_course_progress(course.id).await?;

        let snapshot = ModuleSnapshot {
            course_title: &course.title,
            module_title: &module.title,
            position: module.position,
        };
        self.audit
            .record(
                &actor.label(),
                "course.remove_module",
                "module",
                Some(&module.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(())
    }

    pub async fn add_lesson(
        &self,
        actor: &Actor,
        command: AddLessonCommand,
    ) -> Result<LessonRecord, LifecycleError> {
        let course = self.load_course(command.course_id).await?;
        actor.require_owner(course.teacher_id)?;
        ensure_non_empty(&command.title, "title")?;
        validate_content(&command.content)?;

        let module = self
            .reader
            .find_module(command.course_id, command.module_id)
            .await?
            .ok_or(LifecycleError::ModuleNotFound)?;

        let guard = self.structural_guard(&course)?;
        let position = match command.position {
            Some(position) => {
                if position < 0 {
                    return Err(LifecycleError::ConstraintViolation("position"));
                }
                position
            }
            None => {
                let lessons = self.reader.list_lessons(command.course_id).await?;
                lessons
                    .iter()
                    .filter(|lesson| lesson.module_id == command.module_id)
                    .map(|lesson| lesson.position)
                    .max()
                    .map_or(0, |last| last + 1)
            }
        };

        let params = AddLessonParams {
            course_id: command.course_id,
            module_id: command.module_id,
            title: command.title,
            position,
            content: command.content,
            guard,
        };

        let lesson = match self.writer.add_lesson(params).await? {
            Some(record) => record,
            None => {
                let current = self.reader.find_course(command.course_id).await?;
                return Err(classify_guard_miss(current));
            }
        };

        if guard.demote_to_draft {
            self.events
                .emit(DomainEvent::CourseReverted {
                    course_id: course.id,
                })
                .await;
        }

        // A new lesson lowers every enrollment's percentage.
        self.sweep_course_progress(course.id).await?;

        let snapshot = LessonSnapshot {
            module_title: &module.title,
            lesson_title: &lesson.title,
            kind: lesson.content.kind(),
            position: lesson.position,
        };
        self.audit
            .record(
                &actor.label(),
                "course.add_lesson",
                "lesson",
                Some(&lesson.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(lesson)
    }

    pub async fn remove_lesson(
        &self,
        actor: &Actor,
        command: RemoveLessonCommand,
    ) -> Result<(), LifecycleError> {
        let course = self.load_course(command.course_id).await?;
        actor.require_owner(course.teacher_id)?;

        let lesson = self
            .reader
            .find_lesson_in_course(command.course_id, command.lesson_id)
            .await?
            .ok_or(LifecycleError::LessonNotFound)?;
        let module = self
            .reader
            .find_module(command.course_id, lesson.module_id)
            .await?
            .ok_or(LifecycleError::ModuleNotFound)?;

        let guard = self.structural_guard(&course)?;
        let params = RemoveLessonParams {
            course_id: command.course_id,
            lesson_id: command.lesson_id,
            guard,
        };

        if self.writer.remove_lesson(params).await?.is_none() {
            let current = self.reader.find_course(command.course_id).await?;
            return Err(classify_guard_miss(current));
        }

        if guard.demote_to_draft {
            self.events
                .emit(DomainEvent::CourseReverted {
                    course_id: course.id,
                })
                .await;
        }

        // Completions of the removed lesson stop counting; stored
        // percentages may move in either direction.
        self.sweep_course_progress(course.id).await?;

        let snapshot = LessonSnapshot {
            module_title: &module.title,
            lesson_title: &lesson.title,
            kind: lesson.content.kind(),
            position: lesson.position,
        };
        self.audit
            .record(
                &actor.label(),
                "course.remove_lesson",
                "lesson",
                Some(&lesson.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(())
    }

    pub async fn submit_for_review(
        &self,
        actor: &Actor,
        course_id: Uuid,
    ) -> Result<CourseRecord, LifecycleError> {
        let course = self.load_course(course_id).await?;
        actor.require_owner(course.teacher_id)?;

        if !can_submit(course.state) {
            return Err(submit_rejection(course.state));
        }

        let counts = self.reader.count_content(course_id).await?;
        if counts.modules == 0 || counts.lessons == 0 {
            return Err(LifecycleError::IncompleteContent {
                modules: counts.modules,
                lessons: counts.lessons,
            });
        }

        let submitted = match self
            .writer
            .submit_course(course_id, OffsetDateTime::now_utc())
            .await?
        {
            Some(record) => record,
            None => {
                return Err(match self.reader.find_course(course_id).await? {
                    None => LifecycleError::CourseNotFound,
                    Some(current) => submit_rejection(current.state),
                });
            }
        };

        self.events
            .emit(DomainEvent::CourseSubmitted { course_id })
            .await;

        let snapshot = CourseSummarySnapshot {
            title: &submitted.title,
            state: submitted.state,
        };
        self.audit
            .record(
                &actor.label(),
                "course.submit",
                "course",
                Some(&submitted.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(submitted)
    }

    /// Approve or reject a submitted course. Exactly one decision wins per
    /// submission; the loser of a concurrent pair observes `AlreadyDecided`.
    pub async fn review_course(
        &self,
        actor: &Actor,
        command: ReviewCourseCommand,
    ) -> Result<CourseRecord, LifecycleError> {
        actor.require_role(ActorRole::Admin)?;

        let course = self.load_course(command.course_id).await?;
        if !can_decide(course.state) {
            return Err(LifecycleError::AlreadyDecided {
                state: course.state,
            });
        }

        let feedback = match command.decision {
            ReviewDecision::Approve => None,
            ReviewDecision::Reject => match command.feedback {
                Some(text) if !text.trim().is_empty() => Some(text),
                _ => return Err(LifecycleError::ConstraintViolation("feedback")),
            },
        };

        let params = DecideCourseParams {
            course_id: command.course_id,
            decision: command.decision,
            feedback,
            decided_at: OffsetDateTime::now_utc(),
        };

        let decided = match self.writer.decide_course(params).await? {
            Some(record) => record,
            None => {
                return Err(match self.reader.find_course(command.course_id).await? {
                    None => LifecycleError::CourseNotFound,
                    Some(current) => LifecycleError::AlreadyDecided {
                        state: current.state,
                    },
                });
            }
        };

        counter!(
            METRIC_REVIEW_DECISIONS_TOTAL,
            "decision" => command.decision.as_str()
        )
        .increment(1);

        let event = match command.decision {
            ReviewDecision::Approve => DomainEvent::CourseApproved {
                course_id: decided.id,
            },
            ReviewDecision::Reject => DomainEvent::CourseRejected {
                course_id: decided.id,
            },
        };
        self.events.emit(event).await;

        let snapshot = ReviewSnapshot {
            title: &decided.title,
            decision: command.decision.as_str(),
            feedback: decided.review_feedback.as_deref(),
        };
        self.audit
            .record(
                &actor.label(),
                "course.review",
                "course",
                Some(&decided.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(decided)
    }

    pub async fn publish_course(
        &self,
        actor: &Actor,
        course_id: Uuid,
    ) -> Result<CourseRecord, LifecycleError> {
        let course = self.load_course(course_id).await?;
        actor.require_owner(course.teacher_id)?;

        if !can_publish(course.state) {
            return Err(LifecycleError::NotApproved {
                state: course.state,
            });
        }

        let published = match self
            .writer
            .publish_course(course_id, OffsetDateTime::now_utc())
            .await?
        {
            Some(record) => record,
            None => {
                return Err(match self.reader.find_course(course_id).await? {
                    None => LifecycleError::CourseNotFound,
                    Some(current) => LifecycleError::NotApproved {
                        state: current.state,
                    },
                });
            }
        };

        counter!(METRIC_COURSES_PUBLISHED_TOTAL).increment(1);
        self.events
            .emit(DomainEvent::CoursePublished { course_id })
            .await;

        let snapshot = CourseSummarySnapshot {
            title: &published.title,
            state: published.state,
        };
        self.audit
            .record(
                &actor.label(),
                "course.publish",
                "course",
                Some(&published.id.to_string()),
                Some(&snapshot),
            )
            .await?;

        Ok(published)
    }

    pub(crate) async fn load_course(&self, id: Uuid) -> Result<CourseRecord, LifecycleError> {
        self.reader
            .find_course(id)
            .await?
            .ok_or(LifecycleError::CourseNotFound)
    }

    /// Guard for writes that count as review-relevant edits. Refuses to
    /// touch a course that sits in the review queue.
    fn structural_guard(&self, course: &CourseRecord) -> Result<CourseStateGuard, LifecycleError> {
        match edit_transition(course.state, EditImpact::ReviewRelevant) {
            None => Err(LifecycleError::UnderReview),
            Some(next) => Ok(CourseStateGuard {
                expected: course.state,
                demote_to_draft: next != course.state,
            }),
        }
    }

    /// Recompute stored progress for every active enrollment of a course.
    async fn sweep_course_progress(&self, course_id: Uuid) -> Result<(), LifecycleError> {
        let enrollments = self.enrollments.list_all_for_course(course_id).await?;
        for enrollment in enrollments {
            if !enrollment.is_active() {
                continue;
            }
            let outcome = recompute_enrollment(
                self.reader.as_ref(),
                self.enrollments.as_ref(),
                self.progress.as_ref(),
                &enrollment,
            )
            .await?;
            if outcome.crossed_to_complete {
                self.events
                    .emit(DomainEvent::CourseCompleted {
                        course_id,
                        enrollment_id: enrollment.id,
                    })
                    .await;
            }
        }
        Ok(())
    }
}

fn submit_rejection(state: CourseState) -> LifecycleError {
    if state == CourseState::Submitted {
        LifecycleError::AlreadyUnderReview
    } else {
        LifecycleError::NotSubmittable { state }
    }
}
