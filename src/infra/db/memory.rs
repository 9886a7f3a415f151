//! In-memory repositories for tests and the `--memory` development mode.
//!
//! Every method takes one lock over the whole store, so guarded writes are
//! atomic exactly like their single-transaction Postgres counterparts and
//! unique constraints lose the same races the same way.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{
    CatalogCursor, CursorPage, EnrollmentCursor, PageRequest, ReviewQueueCursor,
};
use crate::application::repos::{
    AddLessonParams, AddModuleParams, AuditRepo, CatalogQueryFilter, CertificatesRepo,
    CheckpointUpsertParams, ContentCounts, CourseEditParams, CourseMetadataParams,
    CourseStateGuard, CoursesRepo, CoursesWriteRepo, CreateCourseParams, CreateEnrollmentParams,
    DecideCourseParams, EnrollmentsRepo, ProgressRepo, RemoveLessonParams, RemoveModuleParams,
    RepoError, UpdateEnrollmentProgressParams,
};
use crate::domain::entities::{
    AccessGrantRecord, AuditLogRecord, CertificateRecord, CourseRecord, EnrollmentRecord,
    LessonCompletionRecord, LessonRecord, ModuleRecord, PlaybackCheckpointRecord,
};
use crate::domain::types::{CourseState, ReviewDecision};

#[derive(Default)]
struct MemoryStore {
    courses: Vec<CourseRecord>,
    modules: Vec<ModuleRecord>,
    lessons: Vec<LessonRecord>,
    enrollments: Vec<EnrollmentRecord>,
    access_grants: Vec<AccessGrantRecord>,
    completions: Vec<LessonCompletionRecord>,
    checkpoints: Vec<PlaybackCheckpointRecord>,
    certificates: Vec<CertificateRecord>,
    audit_log: Vec<AuditLogRecord>,
}

#[derive(Default)]
pub struct MemoryRepositories {
    store: Mutex<MemoryStore>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        // A poisoned lock still holds a consistent store; every mutation
        // finishes before the guard drops.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryStore {
    /// Mirror of the Postgres guard statement: the course must exist and sit
    /// in the expected state, and a passing guard stamps `updated_at` and
    /// applies the demotion.
    fn check_guard(&self, course_id: Uuid, guard: CourseStateGuard) -> Option<usize> {
        let index = self.courses.iter().position(|course| course.id == course_id)?;
        (self.courses[index].state == guard.expected).then_some(index)
    }

    fn apply_guard(&mut self, index: usize, guard: CourseStateGuard, now: OffsetDateTime) {
        let course = &mut self.courses[index];
        if guard.demote_to_draft {
            course.state = CourseState::Draft;
            course.admin_approved = false;
        }
        course.updated_at = now;
    }

    /// Cascade mirror for `ON DELETE CASCADE` on lessons.
    fn purge_lesson_rows(&mut self, lesson_id: Uuid) {
        self.completions.retain(|row| row.lesson_id != lesson_id);
        self.checkpoints.retain(|row| row.lesson_id != lesson_id);
    }

    fn lessons_of_course(&self, course_id: Uuid) -> Vec<&LessonRecord> {
        let module_ids: Vec<Uuid> = self
            .modules
            .iter()
            .filter(|module| module.course_id == course_id)
            .map(|module| module.id)
            .collect();
        self.lessons
            .iter()
            .filter(|lesson| module_ids.contains(&lesson.module_id))
            .collect()
    }
}

#[async_trait]
impl CoursesRepo for MemoryRepositories {
    async fn find_course(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError> {
        let store = self.lock();
        Ok(store.courses.iter().find(|c| c.id == id).cloned())
    }

    async fn find_module(
        &self,
        course_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<ModuleRecord>, RepoError> {
        let store = self.lock();
        Ok(store
            .modules
            .iter()
            .find(|m| m.id == module_id && m.course_id == course_id)
            .cloned())
    }

    async fn find_lesson_in_course(
        &self,
        course_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<LessonRecord>, RepoError> {
        let store = self.lock();
        let lesson = store.lessons.iter().find(|l| l.id == lesson_id);
        let Some(lesson) = lesson else {
            return Ok(None);
        };
        let in_course = store
            .modules
            .iter()
            .any(|m| m.id == lesson.module_id && m.course_id == course_id);
        Ok(in_course.then(|| lesson.clone()))
    }

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<ModuleRecord>, RepoError> {
        let store = self.lock();
        let mut modules: Vec<ModuleRecord> = store
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.position);
        Ok(modules)
    }

    async fn list_lessons(&self, course_id: Uuid) -> Result<Vec<LessonRecord>, RepoError> {
        let store = self.lock();
        let mut modules: Vec<&ModuleRecord> = store
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .collect();
        modules.sort_by_key(|m| m.position);

        let mut lessons = Vec::new();
        for module in modules {
            let mut of_module: Vec<LessonRecord> = store
                .lessons
                .iter()
                .filter(|l| l.module_id == module.id)
                .cloned()
                .collect();
            of_module.sort_by_key(|l| l.position);
            lessons.extend(of_module);
        }
        Ok(lessons)
    }

    async fn count_content(&self, course_id: Uuid) -> Result<ContentCounts, RepoError> {
        let store = self.lock();
        let modules = store
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .count() as u64;
        let lessons = store.lessons_of_course(course_id).len() as u64;
        Ok(ContentCounts { modules, lessons })
    }

    async fn list_catalog(
        &self,
        filter: &CatalogQueryFilter,
        page: PageRequest<CatalogCursor>,
    ) -> Result<CursorPage<CourseRecord>, RepoError> {
        let limit = page.limit.clamp(1, 100);
        let store = self.lock();

        let mut matches: Vec<CourseRecord> = store
            .courses
            .iter()
            .filter(|course| course.state == CourseState::Published)
            .filter(|course| {
                filter.search.as_ref().is_none_or(|needle| {
                    let needle = needle.to_lowercase();
                    course.title.to_lowercase().contains(&needle)
                        || course.description.to_lowercase().contains(&needle)
                })
            })
            .filter(|course| filter.is_paid.is_none_or(|paid| course.is_paid == paid))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        if let Some(cursor) = page.cursor {
            matches.retain(|course| match course.published_at {
                Some(ts) => {
                    ts < cursor.published_at()
                        || (ts == cursor.published_at() && course.id < cursor.id())
                }
                None => false,
            });
        }

        matches.truncate(limit as usize);
        let next_cursor = if matches.len() as u32 == limit {
            matches.last().and_then(|course| {
                course
                    .published_at
                    .map(|ts| CatalogCursor::new(ts, course.id).encode())
            })
        } else {
            None
        };

        Ok(CursorPage::new(matches, next_cursor))
    }

    async fn list_review_queue(
        &self,
        page: PageRequest<ReviewQueueCursor>,
    ) -> Result<CursorPage<CourseRecord>, RepoError> {
        let limit = page.limit.clamp(1, 100);
        let store = self.lock();

        let mut queue: Vec<CourseRecord> = store
            .courses
            .iter()
            .filter(|course| course.state == CourseState::Submitted)
            .cloned()
            .collect();
        queue.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        if let Some(cursor) = page.cursor {
            queue.retain(|course| match course.submitted_at {
                Some(ts) => {
                    ts > cursor.submitted_at()
                        || (ts == cursor.submitted_at() && course.id > cursor.id())
                }
                None => false,
            });
        }

        queue.truncate(limit as usize);
        let next_cursor = if queue.len() as u32 == limit {
            queue.last().and_then(|course| {
                course
                    .submitted_at
                    .map(|ts| ReviewQueueCursor::new(ts, course.id).encode())
            })
        } else {
            None
        };

        Ok(CursorPage::new(queue, next_cursor))
    }

    async fn list_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<CourseRecord>, RepoError> {
        let store = self.lock();
        let mut courses: Vec<CourseRecord> = store
            .courses
            .iter()
            .filter(|course| course.teacher_id == teacher_id)
            .cloned()
            .collect();
        courses.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(courses)
    }
}

#[async_trait]
impl CoursesWriteRepo for MemoryRepositories {
    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = CourseRecord {
            id: Uuid::new_v4(),
            teacher_id: params.teacher_id,
            title: params.title,
            description: params.description,
            is_paid: params.is_paid,
            price_cents: params.price_cents,
            tags: params.tags,
            internal_notes: params.internal_notes,
            ce_credit_hours: params.ce_credit_hours,
            state: CourseState::Draft,
            admin_approved: false,
            review_feedback: None,
            submitted_at: None,
            approved_at: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut store = self.lock();
        store.courses.push(record.clone());
        Ok(record)
    }

    async fn apply_course_edit(
        &self,
        params: CourseEditParams,
    ) -> Result<Option<CourseRecord>, RepoError> {
        let mut store = self.lock();
        let Some(index) = store.check_guard(params.id, params.guard) else {
            return Ok(None);
        };

        let now = OffsetDateTime::now_utc();
        store.apply_guard(index, params.guard, now);
        let course = &mut store.courses[index];
        course.title = params.title;
        course.description = params.description;
        course.is_paid = params.is_paid;
        course.price_cents = params.price_cents;
        course.tags = params.tags;
        course.internal_notes = params.internal_notes;
        course.ce_credit_hours = params.ce_credit_hours;
        Ok(Some(course.clone()))
    }

    async fn update_course_metadata(
        &self,
        params: CourseMetadataParams,
    ) -> Result<CourseRecord, RepoError> {
        let mut store = self.lock();
        let course = store
            .courses
            .iter_mut()
            .find(|course| course.id == params.id)
            .ok_or(RepoError::NotFound)?;

        course.tags = params.tags;
        course.internal_notes = params.internal_notes;
        course.ce_credit_hours = params.ce_credit_hours;
        course.updated_at = OffsetDateTime::now_utc();
        Ok(course.clone())
    }

    async fn submit_course(
        &self,
        id: Uuid,
        submitted_at: OffsetDateTime,
    ) -> Result<Option<CourseRecord>, RepoError> {
        let mut store = self.lock();
        let Some(course) = store.courses.iter_mut().find(|course| course.id == id) else {
            return Ok(None);
        };
        if !matches!(course.state, CourseState::Draft | CourseState::Rejected) {
            return Ok(None);
        }

        course.state = CourseState::Submitted;
        course.submitted_at = Some(submitted_at);
        course.review_feedback = None;
        course.updated_at = OffsetDateTime::now_utc();
        Ok(Some(course.clone()))
    }

    async fn decide_course(
        &self,
        params: DecideCourseParams,
    ) -> Result<Option<CourseRecord>, RepoError> {
        let mut store = self.lock();
        let Some(course) = store
            .courses
            .iter_mut()
            .find(|course| course.id == params.course_id)
        else {
            return Ok(None);
        };
        if course.state != CourseState::Submitted {
            return Ok(None);
        }

        match params.decision {
            ReviewDecision::Approve => {
                course.state = CourseState::Approved;
                course.admin_approved = true;
                course.approved_at = Some(params.decided_at);
            }
            ReviewDecision::Reject => {
                course.state = CourseState::Rejected;
                course.admin_approved = false;
            }
        }
        course.review_feedback = params.feedback;
        course.updated_at = OffsetDateTime::now_utc();
        Ok(Some(course.clone()))
    }

    async fn publish_course(
        &self,
        id: Uuid,
        published_at: OffsetDateTime,
    ) -> Result<Option<CourseRecord>, RepoError> {
        let mut store = self.lock();
        let Some(course) = store.courses.iter_mut().find(|course| course.id == id) else {
            return Ok(None);
        };
        if course.state != CourseState::Approved {
            return Ok(None);
        }

        course.state = CourseState::Published;
        course.published_at = Some(published_at);
        course.updated_at = OffsetDateTime::now_utc();
        Ok(Some(course.clone()))
    }

    async fn add_module(
        &self,
        params: AddModuleParams,
    ) -> Result<Option<ModuleRecord>, RepoError> {
        let mut store = self.lock();
        let Some(index) = store.check_guard(params.course_id, params.guard) else {
            return Ok(None);
        };
        let position_taken = store
            .modules
            .iter()
            .any(|m| m.course_id == params.course_id && m.position == params.position);
        if position_taken {
            return Err(RepoError::Duplicate {
                constraint: "modules_course_id_position_key".to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        store.apply_guard(index, params.guard, now);
        let record = ModuleRecord {
            id: Uuid::new_v4(),
            course_id: params.course_id,
            title: params.title,
            position: params.position,
            created_at: now,
        };
        store.modules.push(record.clone());
        Ok(Some(record))
    }

    async fn remove_module(&self, params: RemoveModuleParams) -> Result<Option<()>, RepoError> {
        let mut store = self.lock();
        let Some(index) = store.check_guard(params.course_id, params.guard) else {
            return Ok(None);
        };
        let exists = store
            .modules
            .iter()
            .any(|m| m.id == params.module_id && m.course_id == params.course_id);
        if !exists {
            return Ok(None);
        }

        let now = OffsetDateTime::now_utc();
        store.apply_guard(index, params.guard, now);
        store.modules.retain(|m| m.id != params.module_id);
        let orphaned: Vec<Uuid> = store
            .lessons
            .iter()
            .filter(|l| l.module_id == params.module_id)
            .map(|l| l.id)
            .collect();
        store.lessons.retain(|l| l.module_id != params.module_id);
        for lesson_id in orphaned {
            store.purge_lesson_rows(lesson_id);
        }
        Ok(Some(()))
    }

    async fn add_lesson(
        &self,
        params: AddLessonParams,
    ) -> Result<Option<LessonRecord>, RepoError> {
        let mut store = self.lock();
        let Some(index) = store.check_guard(params.course_id, params.guard) else {
            return Ok(None);
        };
        let module_ok = store
            .modules
            .iter()
            .any(|m| m.id == params.module_id && m.course_id == params.course_id);
        if !module_ok {
            return Ok(None);
        }
        let position_taken = store
            .lessons
            .iter()
            .any(|l| l.module_id == params.module_id && l.position == params.position);
        if position_taken {
            return Err(RepoError::Duplicate {
                constraint: "lessons_module_id_position_key".to_string(),
            });
        }

        let now = OffsetDateTime::now_utc();
        store.apply_guard(index, params.guard, now);
        let record = LessonRecord {
            id: Uuid::new_v4(),
            module_id: params.module_id,
            title: params.title,
            position: params.position,
            kind: params.content.kind(),
            content: params.content,
            created_at: now,
        };
        store.lessons.push(record.clone());
        Ok(Some(record))
    }

    async fn remove_lesson(&self, params: RemoveLessonParams) -> Result<Option<()>, RepoError> {
        let mut store = self.lock();
        let Some(index) = store.check_guard(params.course_id, params.guard) else {
            return Ok(None);
        };
        let lesson_module = store
            .lessons
            .iter()
            .find(|l| l.id == params.lesson_id)
            .map(|l| l.module_id);
        let in_course = lesson_module.is_some_and(|module_id| {
            store
                .modules
                .iter()
                .any(|m| m.id == module_id && m.course_id == params.course_id)
        });
        if !in_course {
            return Ok(None);
        }

        let now = OffsetDateTime::now_utc();
        store.apply_guard(index, params.guard, now);
        store.lessons.retain(|l| l.id != params.lesson_id);
        store.purge_lesson_rows(params.lesson_id);
        Ok(Some(()))
    }
}

#[async_trait]
impl EnrollmentsRepo for MemoryRepositories {
    async fn find_enrollment(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError> {
        let store = self.lock();
        Ok(store.enrollments.iter().find(|e| e.id == id).cloned())
    }

    async fn find_for_learner(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
    ) -> Result<Option<EnrollmentRecord>, RepoError> {
        let store = self.lock();
        Ok(store
            .enrollments
            .iter()
            .find(|e| e.course_id == course_id && e.learner_id == learner_id)
            .cloned())
    }

    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let mut store = self.lock();
        let exists = store
            .enrollments
            .iter()
            .any(|e| e.course_id == params.course_id && e.learner_id == params.learner_id);
        if exists {
            return Err(RepoError::Duplicate {
                constraint: "enrollments_learner_id_course_id_key".to_string(),
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
        store.enrollments.push(record.clone());
        Ok(record)
    }

    async fn reactivate_enrollment(&self, id: Uuid) -> Result<EnrollmentRecord, RepoError> {
        let mut store = self.lock();
        let enrollment = store
            .enrollments
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RepoError::NotFound)?;
        enrollment.dropped_at = None;
        enrollment.updated_at = OffsetDateTime::now_utc();
        Ok(enrollment.clone())
    }

    async fn drop_enrollment(
        &self,
        id: Uuid,
        dropped_at: OffsetDateTime,
    ) -> Result<EnrollmentRecord, RepoError> {
        let mut store = self.lock();
        let enrollment = store
            .enrollments
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(RepoError::NotFound)?;
        enrollment.dropped_at = Some(dropped_at);
        enrollment.updated_at = dropped_at;
        Ok(enrollment.clone())
    }

    async fn update_progress(
        &self,
        params: UpdateEnrollmentProgressParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let mut store = self.lock();
        let enrollment = store
            .enrollments
            .iter_mut()
            .find(|e| e.id == params.enrollment_id)
            .ok_or(RepoError::NotFound)?;
        enrollment.progress_percentage = params.progress_percentage;
        enrollment.completed_at = params.completed_at;
        enrollment.updated_at = OffsetDateTime::now_utc();
        Ok(enrollment.clone())
    }

    async fn list_for_course(
        &self,
        course_id: Uuid,
        page: PageRequest<EnrollmentCursor>,
    ) -> Result<CursorPage<EnrollmentRecord>, RepoError> {
        let limit = page.limit.clamp(1, 100);
        let store = self.lock();

        let mut rows: Vec<EnrollmentRecord> = store
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        if let Some(cursor) = page.cursor {
            rows.retain(|e| {
                e.created_at < cursor.created_at()
                    || (e.created_at == cursor.created_at() && e.id < cursor.id())
            });
        }

        rows.truncate(limit as usize);
        let next_cursor = if rows.len() as u32 == limit {
            rows.last()
                .map(|entry| EnrollmentCursor::new(entry.created_at, entry.id).encode())
        } else {
            None
        };

        Ok(CursorPage::new(rows, next_cursor))
    }

    async fn list_all_for_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        let store = self.lock();
        let mut rows: Vec<EnrollmentRecord> = store
            .enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    async fn list_for_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        let store = self.lock();
        let mut rows: Vec<EnrollmentRecord> = store
            .enrollments
            .iter()
            .filter(|e| e.learner_id == learner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(rows)
    }

    async fn grant_access(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
        granted_at: OffsetDateTime,
    ) -> Result<AccessGrantRecord, RepoError> {
        let mut store = self.lock();
        if let Some(existing) = store
            .access_grants
            .iter()
            .find(|g| g.course_id == course_id && g.learner_id == learner_id)
        {
            return Ok(existing.clone());
        }

        let record = AccessGrantRecord {
            course_id,
            learner_id,
            granted_at,
        };
        store.access_grants.push(record.clone());
        Ok(record)
    }

    async fn has_access_grant(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
    ) -> Result<bool, RepoError> {
        let store = self.lock();
        Ok(store
            .access_grants
            .iter()
            .any(|g| g.course_id == course_id && g.learner_id == learner_id))
    }

    async fn list_completed_missing_certificate(
        &self,
        course_id: Option<Uuid>,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        let store = self.lock();
        let mut rows: Vec<EnrollmentRecord> = store
            .enrollments
            .iter()
            .filter(|e| e.progress_percentage == 100 && e.completed_at.is_some())
            .filter(|e| course_id.is_none_or(|wanted| e.course_id == wanted))
            .filter(|e| {
                !store
                    .certificates
                    .iter()
                    .any(|cert| cert.enrollment_id == e.id)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(rows)
    }
}

#[async_trait]
impl ProgressRepo for MemoryRepositories {
    async fn insert_completion(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
        completed_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut store = self.lock();
        let exists = store
            .completions
            .iter()
            .any(|row| row.enrollment_id == enrollment_id && row.lesson_id == lesson_id);
        if exists {
            return Ok(false);
        }

        store.completions.push(LessonCompletionRecord {
            enrollment_id,
            lesson_id,
            completed_at,
        });
        Ok(true)
    }

    async fn upsert_checkpoint(
        &self,
        params: CheckpointUpsertParams,
    ) -> Result<PlaybackCheckpointRecord, RepoError> {
        let mut store = self.lock();
        if let Some(existing) = store.checkpoints.iter_mut().find(|row| {
            row.enrollment_id == params.enrollment_id && row.lesson_id == params.lesson_id
        }) {
            existing.last_position_seconds = params.position_seconds;
            existing.watched_ratio = existing.watched_ratio.max(params.watched_ratio);
            existing.updated_at = params.updated_at;
            return Ok(existing.clone());
        }

        let record = PlaybackCheckpointRecord {
            enrollment_id: params.enrollment_id,
            lesson_id: params.lesson_id,
            last_position_seconds: params.position_seconds,
            watched_ratio: params.watched_ratio,
            updated_at: params.updated_at,
        };
        store.checkpoints.push(record.clone());
        Ok(record)
    }

    async fn find_checkpoint(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<PlaybackCheckpointRecord>, RepoError> {
        let store = self.lock();
        Ok(store
            .checkpoints
            .iter()
            .find(|row| row.enrollment_id == enrollment_id && row.lesson_id == lesson_id)
            .cloned())
    }

    async fn count_completed_in_course(
        &self,
        enrollment_id: Uuid,
        course_id: Uuid,
    ) -> Result<u64, RepoError> {
        let store = self.lock();
        let live: Vec<Uuid> = store
            .lessons_of_course(course_id)
            .iter()
            .map(|lesson| lesson.id)
            .collect();
        let count = store
            .completions
            .iter()
            .filter(|row| row.enrollment_id == enrollment_id && live.contains(&row.lesson_id))
            .count();
        Ok(count as u64)
    }

    async fn list_completions(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Vec<LessonCompletionRecord>, RepoError> {
        let store = self.lock();
        let mut rows: Vec<LessonCompletionRecord> = store
            .completions
            .iter()
            .filter(|row| row.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.lesson_id.cmp(&b.lesson_id))
        });
        Ok(rows)
    }

    async fn list_checkpoints(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Vec<PlaybackCheckpointRecord>, RepoError> {
        let store = self.lock();
        let mut rows: Vec<PlaybackCheckpointRecord> = store
            .checkpoints
            .iter()
            .filter(|row| row.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.lesson_id.cmp(&b.lesson_id))
        });
        Ok(rows)
    }
}

#[async_trait]
impl CertificatesRepo for MemoryRepositories {
    async fn insert_certificate(
        &self,
        record: CertificateRecord,
    ) -> Result<Option<CertificateRecord>, RepoError> {
        let mut store = self.lock();
        let taken = store
            .certificates
            .iter()
            .any(|cert| cert.enrollment_id == record.enrollment_id);
        if taken {
            return Ok(None);
        }

        store.certificates.push(record.clone());
        Ok(Some(record))
    }

    async fn find_by_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<CertificateRecord>, RepoError> {
        let store = self.lock();
        Ok(store
            .certificates
            .iter()
            .find(|cert| cert.enrollment_id == enrollment_id)
            .cloned())
    }

    async fn find_by_serial(&self, serial: &str) -> Result<Option<CertificateRecord>, RepoError> {
        let store = self.lock();
        Ok(store
            .certificates
            .iter()
            .find(|cert| cert.serial == serial)
            .cloned())
    }
}

#[async_trait]
impl AuditRepo for MemoryRepositories {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError> {
        let mut store = self.lock();
        store.audit_log.push(record);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        let limit = limit.clamp(1, 200);
        let store = self.lock();
        let mut rows = store.audit_log.clone();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }
}
