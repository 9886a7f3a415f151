use uuid::Uuid;

use crate::application::pagination::{
    CatalogCursor, CursorPage, EnrollmentCursor, PageRequest, ReviewQueueCursor,
};
use crate::application::repos::CatalogQueryFilter;
use crate::domain::actor::{AccessError, Actor, ActorRole};
use crate::domain::entities::{CourseRecord, EnrollmentRecord};
use crate::domain::types::CourseState;

use super::service::CourseLifecycleService;
use super::types::{CourseOutline, LifecycleError, assemble_outline};

impl CourseLifecycleService {
    /// Load a course with its full module and lesson outline.
    ///
    /// Unpublished courses are visible to their owner, to admins, and to
    /// learners holding an active enrollment (a course can be demoted while
    /// people are still working through it). Everyone else sees not-found
    /// rather than a hint that the course exists.
    pub async fn course_detail(
        &self,
        actor: &Actor,
        course_id: Uuid,
    ) -> Result<CourseOutline, LifecycleError> {
        let course = self.load_course(course_id).await?;

        if course.state != CourseState::Published && !actor.can_view_unpublished(course.teacher_id)
        {
            let enrolled = self
                .enrollments
                .find_for_learner(course_id, actor.id)
                .await?
                .map(|enrollment| enrollment.is_active())
                .unwrap_or(false);
            if !enrolled {
                return Err(LifecycleError::CourseNotFound);
            }
        }

        let modules = self.reader.list_modules(course_id).await?;
        let lessons = self.reader.list_lessons(course_id).await?;
        Ok(assemble_outline(course, modules, lessons))
    }

    pub async fn list_catalog(
        &self,
        filter: &CatalogQueryFilter,
        page: PageRequest<CatalogCursor>,
    ) -> Result<CursorPage<CourseRecord>, LifecycleError> {
        self.reader
            .list_catalog(filter, page)
            .await
            .map_err(LifecycleError::from)
    }

    /// Submitted courses in submission order, oldest first.
    pub async fn list_review_queue(
        &self,
        actor: &Actor,
        page: PageRequest<ReviewQueueCursor>,
    ) -> Result<CursorPage<CourseRecord>, LifecycleError> {
        actor.require_role(ActorRole::Admin)?;
        self.reader
            .list_review_queue(page)
            .await
            .map_err(LifecycleError::from)
    }

    pub async fn teacher_courses(
        &self,
        actor: &Actor,
    ) -> Result<Vec<CourseRecord>, LifecycleError> {
        actor.require_role(ActorRole::Teacher)?;
        self.reader
            .list_for_teacher(actor.id)
            .await
            .map_err(LifecycleError::from)
    }

    pub async fn course_enrollments(
        &self,
        actor: &Actor,
        course_id: Uuid,
        page: PageRequest<EnrollmentCursor>,
    ) -> Result<CursorPage<EnrollmentRecord>, LifecycleError> {
        let course = self.load_course(course_id).await?;
        if !actor.can_view_unpublished(course.teacher_id) {
            return Err(AccessError::NotOwner { actor: actor.id }.into());
        }
        self.enrollments
            .list_for_course(course_id, page)
            .await
            .map_err(LifecycleError::from)
    }
}
