use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{CatalogCursor, CursorPage, PageRequest, ReviewQueueCursor};
use crate::application::repos::{
    AddLessonParams, AddModuleParams, CatalogQueryFilter, ContentCounts, CourseEditParams,
    CourseMetadataParams, CourseStateGuard, CoursesRepo, CoursesWriteRepo, CreateCourseParams,
    DecideCourseParams, RemoveLessonParams, RemoveModuleParams, RepoError,
};
use crate::domain::entities::{CourseRecord, LessonRecord, ModuleRecord};
use crate::domain::lessons::LessonContent;
use crate::domain::types::{CourseState, LessonKind, ReviewDecision};

use super::{PostgresRepositories, map_sqlx_error};

const COURSE_COLUMNS: &str = "id, teacher_id, title, description, is_paid, price_cents, tags, \
     internal_notes, ce_credit_hours, state, admin_approved, review_feedback, \
     submitted_at, approved_at, published_at, created_at, updated_at";

const LESSON_COLUMNS: &str =
    "l.id, l.module_id, l.title, l.position, l.kind, l.content, l.created_at";

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: Uuid,
    teacher_id: Uuid,
    title: String,
    description: String,
    is_paid: bool,
    price_cents: i64,
    tags: Vec<String>,
    internal_notes: Option<String>,
    ce_credit_hours: Option<f64>,
    state: CourseState,
    admin_approved: bool,
    review_feedback: Option<String>,
    submitted_at: Option<OffsetDateTime>,
    approved_at: Option<OffsetDateTime>,
    published_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CourseRow> for CourseRecord {
    fn from(row: CourseRow) -> Self {
        Self {
            id: row.id,
            teacher_id: row.teacher_id,
            title: row.title,
            description: row.description,
            is_paid: row.is_paid,
            price_cents: row.price_cents,
            tags: row.tags,
            internal_notes: row.internal_notes,
            ce_credit_hours: row.ce_credit_hours,
            state: row.state,
            admin_approved: row.admin_approved,
            review_feedback: row.review_feedback,
            submitted_at: row.submitted_at,
            approved_at: row.approved_at,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: Uuid,
    course_id: Uuid,
    title: String,
    position: i32,
    created_at: OffsetDateTime,
}

impl From<ModuleRow> for ModuleRecord {
    fn from(row: ModuleRow) -> Self {
        Self {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            position: row.position,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LessonRow {
    id: Uuid,
    module_id: Uuid,
    title: String,
    position: i32,
    kind: LessonKind,
    content: Json<LessonContent>,
    created_at: OffsetDateTime,
}

impl From<LessonRow> for LessonRecord {
    fn from(row: LessonRow) -> Self {
        Self {
            id: row.id,
            module_id: row.module_id,
            title: row.title,
            position: row.position,
            kind: row.kind,
            content: row.content.0,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ContentCountRow {
    modules: i64,
    lessons: i64,
}

/// Apply a state guard to the course row inside the caller's transaction.
/// Returns `false` when the course was not in the expected state, in which
/// case the caller must roll back.
async fn guard_course(
    tx: &mut Transaction<'_, Postgres>,
    course_id: Uuid,
    guard: CourseStateGuard,
) -> Result<bool, RepoError> {
    let row = sqlx::query(
        r#"
        UPDATE courses
           SET state = CASE WHEN $3 THEN 'draft'::course_state ELSE state END,
               admin_approved = CASE WHEN $3 THEN FALSE ELSE admin_approved END,
               updated_at = now()
         WHERE id = $1 AND state = $2
        RETURNING id
        "#,
    )
    .bind(course_id)
    .bind(guard.expected)
    .bind(guard.demote_to_draft)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(row.is_some())
}

#[async_trait]
impl CoursesRepo for PostgresRepositories {
    async fn find_course(&self, id: Uuid) -> Result<Option<CourseRecord>, RepoError> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1");
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CourseRecord::from))
    }

    async fn find_module(
        &self,
        course_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<ModuleRecord>, RepoError> {
        let row = sqlx::query_as::<_, ModuleRow>(
            r#"
            SELECT id, course_id, title, position, created_at
            FROM modules
            WHERE id = $1 AND course_id = $2
            "#,
        )
        .bind(module_id)
        .bind(course_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ModuleRecord::from))
    }

    async fn find_lesson_in_course(
        &self,
        course_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<LessonRecord>, RepoError> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lessons l \
             INNER JOIN modules m ON m.id = l.module_id \
             WHERE l.id = $1 AND m.course_id = $2"
        );
        let row = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(lesson_id)
            .bind(course_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(LessonRecord::from))
    }

    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<ModuleRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ModuleRow>(
            r#"
            SELECT id, course_id, title, position, created_at
            FROM modules
            WHERE course_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(course_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ModuleRecord::from).collect())
    }

    async fn list_lessons(&self, course_id: Uuid) -> Result<Vec<LessonRecord>, RepoError> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lessons l \
             INNER JOIN modules m ON m.id = l.module_id \
             WHERE m.course_id = $1 \
             ORDER BY m.position ASC, l.position ASC"
        );
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(course_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(LessonRecord::from).collect())
    }

    async fn count_content(&self, course_id: Uuid) -> Result<ContentCounts, RepoError> {
        let row = sqlx::query_as::<_, ContentCountRow>(
            r#"
            SELECT COUNT(DISTINCT m.id) AS modules, COUNT(l.id) AS lessons
            FROM modules m
            LEFT JOIN lessons l ON l.module_id = m.id
            WHERE m.course_id = $1
            "#,
        )
        .bind(course_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ContentCounts {
            modules: Self::convert_count(row.modules)?,
            lessons: Self::convert_count(row.lessons)?,
        })
    }

    async fn list_catalog(
        &self,
        filter: &CatalogQueryFilter,
        page: PageRequest<CatalogCursor>,
    ) -> Result<CursorPage<CourseRecord>, RepoError> {
        let limit = page.limit.clamp(1, 100);
        let mut qb =
            QueryBuilder::new(format!("SELECT {COURSE_COLUMNS} FROM courses WHERE state = "));
        qb.push_bind(CourseState::Published);

        if let Some(search) = filter.search.as_ref() {
            let pattern = format!("%{}%", search);
            qb.push(" AND (title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR description ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        if let Some(is_paid) = filter.is_paid {
            qb.push(" AND is_paid = ");
            qb.push_bind(is_paid);
        }

        if let Some(cursor) = page.cursor {
            qb.push(" AND (published_at < ");
            qb.push_bind(cursor.published_at());
            qb.push(" OR (published_at = ");
            qb.push_bind(cursor.published_at());
            qb.push(" AND id < ");
            qb.push_bind(cursor.id());
            qb.push("))");
        }

        qb.push(" ORDER BY published_at DESC, id DESC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build_query_as::<CourseRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let records: Vec<CourseRecord> = rows.into_iter().map(CourseRecord::from).collect();
        let next_cursor = if records.len() as u32 == limit {
            records.last().and_then(|course| {
                course
                    .published_at
                    .map(|ts| CatalogCursor::new(ts, course.id).encode())
            })
        } else {
            None
        };

        Ok(CursorPage::new(records, next_cursor))
    }

    async fn list_review_queue(
        &self,
        page: PageRequest<ReviewQueueCursor>,
    ) -> Result<CursorPage<CourseRecord>, RepoError> {
        let limit = page.limit.clamp(1, 100);
        let mut qb =
            QueryBuilder::new(format!("SELECT {COURSE_COLUMNS} FROM courses WHERE state = "));
        qb.push_bind(CourseState::Submitted);

        if let Some(cursor) = page.cursor {
            qb.push(" AND (submitted_at > ");
            qb.push_bind(cursor.submitted_at());
            qb.push(" OR (submitted_at = ");
            qb.push_bind(cursor.submitted_at());
            qb.push(" AND id > ");
            qb.push_bind(cursor.id());
            qb.push("))");
        }

        qb.push(" ORDER BY submitted_at ASC, id ASC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build_query_as::<CourseRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let records: Vec<CourseRecord> = rows.into_iter().map(CourseRecord::from).collect();
        let next_cursor = if records.len() as u32 == limit {
            records.last().and_then(|course| {
                course
                    .submitted_at
                    .map(|ts| ReviewQueueCursor::new(ts, course.id).encode())
            })
        } else {
            None
        };

        Ok(CursorPage::new(records, next_cursor))
    }

    async fn list_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<CourseRecord>, RepoError> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM courses \
             WHERE teacher_id = $1 \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(teacher_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CourseRecord::from).collect())
    }
}

#[async_trait]
impl CoursesWriteRepo for PostgresRepositories {
    async fn create_course(&self, params: CreateCourseParams) -> Result<CourseRecord, RepoError> {
        let CreateCourseParams {
            teacher_id,
            title,
            description,
            is_paid,
            price_cents,
            tags,
            internal_notes,
            ce_credit_hours,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let sql = format!(
            "INSERT INTO courses ( \
                 id, teacher_id, title, description, is_paid, price_cents, \
                 tags, internal_notes, ce_credit_hours, created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
             RETURNING {COURSE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .bind(teacher_id)
            .bind(title)
            .bind(description)
            .bind(is_paid)
            .bind(price_cents)
            .bind(tags)
            .bind(internal_notes)
            .bind(ce_credit_hours)
            .bind(now)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(CourseRecord::from(row))
    }

    async fn apply_course_edit(
        &self,
        params: CourseEditParams,
    ) -> Result<Option<CourseRecord>, RepoError> {
        let CourseEditParams {
            id,
            title,
            description,
            is_paid,
            price_cents,
            tags,
            internal_notes,
            ce_credit_hours,
            guard,
        } = params;

        let sql = format!(
            "UPDATE courses \
                SET title = $2, \
                    description = $3, \
                    is_paid = $4, \
                    price_cents = $5, \
                    tags = $6, \
                    internal_notes = $7, \
                    ce_credit_hours = $8, \
                    state = CASE WHEN $10 THEN 'draft'::course_state ELSE state END, \
                    admin_approved = CASE WHEN $10 THEN FALSE ELSE admin_approved END, \
                    updated_at = now() \
              WHERE id = $1 AND state = $9 \
             RETURNING {COURSE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .bind(title)
            .bind(description)
            .bind(is_paid)
            .bind(price_cents)
            .bind(tags)
            .bind(internal_notes)
            .bind(ce_credit_hours)
            .bind(guard.expected)
            .bind(guard.demote_to_draft)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CourseRecord::from))
    }

    async fn update_course_metadata(
        &self,
        params: CourseMetadataParams,
    ) -> Result<CourseRecord, RepoError> {
        let CourseMetadataParams {
            id,
            tags,
            internal_notes,
            ce_credit_hours,
        } = params;

        let sql = format!(
            "UPDATE courses \
                SET tags = $2, internal_notes = $3, ce_credit_hours = $4, updated_at = now() \
              WHERE id = $1 \
             RETURNING {COURSE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .bind(tags)
            .bind(internal_notes)
            .bind(ce_credit_hours)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(CourseRecord::from(row))
    }

    async fn submit_course(
        &self,
        id: Uuid,
        submitted_at: OffsetDateTime,
    ) -> Result<Option<CourseRecord>, RepoError> {
        // Clears feedback from the previous review cycle.
        let sql = format!(
            "UPDATE courses \
                SET state = 'submitted'::course_state, \
                    submitted_at = $2, \
                    review_feedback = NULL, \
                    updated_at = now() \
              WHERE id = $1 AND state IN ('draft'::course_state, 'rejected'::course_state) \
             RETURNING {COURSE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .bind(submitted_at)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CourseRecord::from))
    }

    async fn decide_course(
        &self,
        params: DecideCourseParams,
    ) -> Result<Option<CourseRecord>, RepoError> {
        let DecideCourseParams {
            course_id,
            decision,
            feedback,
            decided_at,
        } = params;

        let (state, approved) = match decision {
            ReviewDecision::Approve => (CourseState::Approved, true),
            ReviewDecision::Reject => (CourseState::Rejected, false),
        };

        let sql = format!(
            "UPDATE courses \
                SET state = $2, \
                    admin_approved = $3, \
                    review_feedback = $4, \
                    approved_at = CASE WHEN $3 THEN $5 ELSE approved_at END, \
                    updated_at = now() \
              WHERE id = $1 AND state = 'submitted'::course_state \
             RETURNING {COURSE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(course_id)
            .bind(state)
            .bind(approved)
            .bind(feedback)
            .bind(decided_at)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CourseRecord::from))
    }

    async fn publish_course(
        &self,
        id: Uuid,
        published_at: OffsetDateTime,
    ) -> Result<Option<CourseRecord>, RepoError> {
        let sql = format!(
            "UPDATE courses \
                SET state = 'published'::course_state, published_at = $2, updated_at = now() \
              WHERE id = $1 AND state = 'approved'::course_state \
             RETURNING {COURSE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(id)
            .bind(published_at)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CourseRecord::from))
    }

    async fn add_module(
        &self,
        params: AddModuleParams,
    ) -> Result<Option<ModuleRecord>, RepoError> {
        let AddModuleParams {
            course_id,
            title,
            position,
            guard,
        } = params;

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        if !guard_course(&mut tx, course_id, guard).await? {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, ModuleRow>(
            r#"
            INSERT INTO modules (id, course_id, title, position, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, course_id, title, position, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(title)
        .bind(position)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(ModuleRecord::from(row)))
    }

    async fn remove_module(&self, params: RemoveModuleParams) -> Result<Option<()>, RepoError> {
        let RemoveModuleParams {
            course_id,
            module_id,
            guard,
        } = params;

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        if !guard_course(&mut tx, course_id, guard).await? {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM modules
            WHERE id = $1 AND course_id = $2
            "#,
        )
        .bind(module_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(()))
    }

    async fn add_lesson(
        &self,
        params: AddLessonParams,
    ) -> Result<Option<LessonRecord>, RepoError> {
        let AddLessonParams {
            course_id,
            module_id,
            title,
            position,
            content,
            guard,
        } = params;

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        if !guard_course(&mut tx, course_id, guard).await? {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        }

        // The module row is re-checked inside the transaction so a module
        // removed since the service's lookup aborts the insert cleanly.
        let kind = content.kind();
        let row = sqlx::query_as::<_, LessonRow>(
            r#"
            INSERT INTO lessons (id, module_id, title, position, kind, content, created_at)
            SELECT $1, m.id, $3, $4, $5, $6, $7
            FROM modules m
            WHERE m.id = $2 AND m.course_id = $8
            RETURNING id, module_id, title, position, kind, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module_id)
        .bind(title)
        .bind(position)
        .bind(kind)
        .bind(Json(&content))
        .bind(OffsetDateTime::now_utc())
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        };

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(LessonRecord::from(row)))
    }

    async fn remove_lesson(&self, params: RemoveLessonParams) -> Result<Option<()>, RepoError> {
        let RemoveLessonParams {
            course_id,
            lesson_id,
            guard,
        } = params;

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        if !guard_course(&mut tx, course_id, guard).await? {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM lessons l
            USING modules m
            WHERE l.id = $1 AND l.module_id = m.id AND m.course_id = $2
            "#,
        )
        .bind(lesson_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(None);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Some(()))
    }
}
