//! Course lifecycle handlers

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::lifecycle::{
    AddLessonCommand, AddModuleCommand, CreateCourseCommand, EditCourseCommand,
    RemoveLessonCommand, RemoveModuleCommand, ReviewCourseCommand,
};
use crate::application::pagination::{
    CatalogCursor, CursorPage, EnrollmentCursor, PageRequest, ReviewQueueCursor,
};
use crate::application::repos::CatalogQueryFilter;
use crate::domain::actor::Actor;

use super::{CatalogListQuery, EnrollmentListQuery, ReviewQueueQuery, lifecycle_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn create_course(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CourseCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = CreateCourseCommand {
        title: payload.title,
        description: payload.description,
        is_paid: payload.is_paid,
        price_cents: payload.price_cents,
        tags: payload.tags,
        internal_notes: payload.internal_notes,
        ce_credit_hours: payload.ce_credit_hours,
    };

    let course = state
        .lifecycle
        .create_course(&actor, command)
        .await
        .map_err(lifecycle_to_api)?;

    Ok((StatusCode::CREATED, Json(CourseResponse::owner(course))))
}

pub async fn list_catalog(
    State(state): State<ApiState>,
    Extension(_actor): Extension<Actor>,
    Query(query): Query<CatalogListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let cursor = match query
        .cursor
        .as_deref()
        .map(CatalogCursor::decode)
        .transpose()
    {
        Ok(cursor) => cursor,
        Err(err) => {
            return Err(ApiError::bad_request(
                "invalid cursor",
                Some(err.to_string()),
            ));
        }
    };

    let filter = CatalogQueryFilter {
        search: query.search,
        is_paid: query.is_paid,
    };

    let page = state
        .lifecycle
        .list_catalog(&filter, PageRequest::new(limit, cursor))
        .await
        .map_err(lifecycle_to_api)?;

    let page = CursorPage {
        items: page
            .items
            .into_iter()
            .map(CourseResponse::public)
            .collect::<Vec<_>>(),
        next_cursor: page.next_cursor,
    };

    Ok(Json(page))
}

pub async fn get_course(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outline = state
        .lifecycle
        .course_detail(&actor, id)
        .await
        .map_err(lifecycle_to_api)?;

    let include_private = actor.can_view_unpublished(outline.course.teacher_id);
    Ok(Json(CourseOutlineResponse::from_outline(
        outline,
        include_private,
    )))
}

pub async fn update_course(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourseUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = EditCourseCommand {
        course_id: id,
        title: payload.title,
        description: payload.description,
        is_paid: payload.is_paid,
        price_cents: payload.price_cents,
        tags: payload.tags,
        internal_notes: payload.internal_notes,
        ce_credit_hours: payload.ce_credit_hours,
    };

    let course = state
        .lifecycle
        .edit_course(&actor, command)
        .await
        .map_err(lifecycle_to_api)?;

    Ok(Json(CourseResponse::owner(course)))
}

pub async fn submit_course(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state
        .lifecycle
        .submit_for_review(&actor, id)
        .await
        .map_err(lifecycle_to_api)?;

    Ok(Json(CourseResponse::owner(course)))
}

pub async fn review_course(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = ReviewCourseCommand {
        course_id: id,
        decision: payload.decision,
        feedback: payload.feedback,
    };

    let course = state
        .lifecycle
        .review_course(&actor, command)
        .await
        .map_err(lifecycle_to_api)?;

    Ok(Json(CourseResponse::owner(course)))
}

pub async fn publish_course(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let course = state
        .lifecycle
        .publish_course(&actor, id)
        .await
        .map_err(lifecycle_to_api)?;

    Ok(Json(CourseResponse::owner(course)))
}

pub async fn add_module(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ModuleCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = AddModuleCommand {
        course_id: id,
        title: payload.title,
        position: payload.position,
    };

    let module = state
        .lifecycle
        .add_module(&actor, command)
        .await
        .map_err(lifecycle_to_api)?;

    Ok((StatusCode::CREATED, Json(module)))
}

pub async fn remove_module(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path((course_id, module_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .lifecycle
        .remove_module(
            &actor,
            RemoveModuleCommand {
                course_id,
                module_id,
            },
        )
        .await
        .map_err(lifecycle_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_lesson(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path((course_id, module_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LessonCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = AddLessonCommand {
        course_id,
        module_id,
        title: payload.title,
        position: payload.position,
        content: payload.content,
    };

    let lesson = state
        .lifecycle
        .add_lesson(&actor, command)
        .await
        .map_err(lifecycle_to_api)?;

    Ok((StatusCode::CREATED, Json(lesson)))
}

pub async fn remove_lesson(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .lifecycle
        .remove_lesson(
            &actor,
            RemoveLessonCommand {
                course_id,
                lesson_id,
            },
        )
        .await
        .map_err(lifecycle_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_review_queue(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ReviewQueueQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let cursor = match query
        .cursor
        .as_deref()
        .map(ReviewQueueCursor::decode)
        .transpose()
    {
        Ok(cursor) => cursor,
        Err(err) => {
            return Err(ApiError::bad_request(
                "invalid cursor",
                Some(err.to_string()),
            ));
        }
    };

    let page = state
        .lifecycle
        .list_review_queue(&actor, PageRequest::new(limit, cursor))
        .await
        .map_err(lifecycle_to_api)?;

    let page = CursorPage {
        items: page
            .items
            .into_iter()
            .map(CourseResponse::owner)
            .collect::<Vec<_>>(),
        next_cursor: page.next_cursor,
    };

    Ok(Json(page))
}

pub async fn list_teacher_courses(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    let courses = state
        .lifecycle
        .teacher_courses(&actor)
        .await
        .map_err(lifecycle_to_api)?;

    Ok(Json(
        courses
            .into_iter()
            .map(CourseResponse::owner)
            .collect::<Vec<_>>(),
    ))
}

pub async fn list_course_enrollments(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<EnrollmentListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let cursor = match query
        .cursor
        .as_deref()
        .map(EnrollmentCursor::decode)
        .transpose()
    {
        Ok(cursor) => cursor,
        Err(err) => {
            return Err(ApiError::bad_request(
                "invalid cursor",
                Some(err.to_string()),
            ));
        }
    };

    let page = state
        .lifecycle
        .course_enrollments(&actor, id, PageRequest::new(limit, cursor))
        .await
        .map_err(lifecycle_to_api)?;

    Ok(Json(page))
}
