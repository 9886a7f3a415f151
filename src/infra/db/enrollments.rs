use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{CursorPage, EnrollmentCursor, PageRequest};
use crate::application::repos::{
    CreateEnrollmentParams, EnrollmentsRepo, RepoError, UpdateEnrollmentProgressParams,
};
use crate::domain::entities::{AccessGrantRecord, EnrollmentRecord};

use super::{PostgresRepositories, map_sqlx_error};

const ENROLLMENT_COLUMNS: &str = "id, learner_id, course_id, learner_name, progress_percentage, \
     completed_at, dropped_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    learner_id: Uuid,
    course_id: Uuid,
    learner_name: String,
    progress_percentage: i16,
    completed_at: Option<OffsetDateTime>,
    dropped_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EnrollmentRow> for EnrollmentRecord {
    fn from(row: EnrollmentRow) -> Self {
        Self {
            id: row.id,
            learner_id: row.learner_id,
            course_id: row.course_id,
            learner_name: row.learner_name,
            progress_percentage: row.progress_percentage,
            completed_at: row.completed_at,
            dropped_at: row.dropped_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccessGrantRow {
    course_id: Uuid,
    learner_id: Uuid,
    granted_at: OffsetDateTime,
}

impl From<AccessGrantRow> for AccessGrantRecord {
    fn from(row: AccessGrantRow) -> Self {
        Self {
            course_id: row.course_id,
            learner_id: row.learner_id,
            granted_at: row.granted_at,
        }
    }
}

#[async_trait]
impl EnrollmentsRepo for PostgresRepositories {
    async fn find_enrollment(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, RepoError> {
        let sql = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1");
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(EnrollmentRecord::from))
    }

    async fn find_for_learner(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
    ) -> Result<Option<EnrollmentRecord>, RepoError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE course_id = $1 AND learner_id = $2"
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(course_id)
            .bind(learner_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(EnrollmentRecord::from))
    }

    async fn create_enrollment(
        &self,
        params: CreateEnrollmentParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let CreateEnrollmentParams {
            learner_id,
            course_id,
            learner_name,
        } = params;

        let now = OffsetDateTime::now_utc();
        let sql = format!(
            "INSERT INTO enrollments (id, learner_id, course_id, learner_name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             RETURNING {ENROLLMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(learner_id)
            .bind(course_id)
            .bind(learner_name)
            .bind(now)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(EnrollmentRecord::from(row))
    }

    async fn reactivate_enrollment(&self, id: Uuid) -> Result<EnrollmentRecord, RepoError> {
        let sql = format!(
            "UPDATE enrollments SET dropped_at = NULL, updated_at = now() \
             WHERE id = $1 RETURNING {ENROLLMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(EnrollmentRecord::from(row))
    }

    async fn drop_enrollment(
        &self,
        id: Uuid,
        dropped_at: OffsetDateTime,
    ) -> Result<EnrollmentRecord, RepoError> {
        let sql = format!(
            "UPDATE enrollments SET dropped_at = $2, updated_at = $2 \
             WHERE id = $1 RETURNING {ENROLLMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(id)
            .bind(dropped_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(EnrollmentRecord::from(row))
    }

    async fn update_progress(
        &self,
        params: UpdateEnrollmentProgressParams,
    ) -> Result<EnrollmentRecord, RepoError> {
        let sql = format!(
            "UPDATE enrollments \
                SET progress_percentage = $2, completed_at = $3, updated_at = now() \
              WHERE id = $1 RETURNING {ENROLLMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(params.enrollment_id)
            .bind(params.progress_percentage)
            .bind(params.completed_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(EnrollmentRecord::from(row))
    }

    async fn list_for_course(
        &self,
        course_id: Uuid,
        page: PageRequest<EnrollmentCursor>,
    ) -> Result<CursorPage<EnrollmentRecord>, RepoError> {
        let limit = page.limit.clamp(1, 100);
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE course_id = "
        ));
        qb.push_bind(course_id);

        if let Some(cursor) = page.cursor {
            qb.push(" AND (created_at < ");
            qb.push_bind(cursor.created_at());
            qb.push(" OR (created_at = ");
            qb.push_bind(cursor.created_at());
            qb.push(" AND id < ");
            qb.push_bind(cursor.id());
            qb.push("))");
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build_query_as::<EnrollmentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let records: Vec<EnrollmentRecord> =
            rows.into_iter().map(EnrollmentRecord::from).collect();
        let next_cursor = if records.len() as u32 == limit {
            records
                .last()
                .map(|entry| EnrollmentCursor::new(entry.created_at, entry.id).encode())
        } else {
            None
        };

        Ok(CursorPage::new(records, next_cursor))
    }

    async fn list_all_for_course(
        &self,
        course_id: Uuid,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE course_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(course_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EnrollmentRecord::from).collect())
    }

    async fn list_for_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE learner_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(learner_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EnrollmentRecord::from).collect())
    }

    async fn grant_access(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
        granted_at: OffsetDateTime,
    ) -> Result<AccessGrantRecord, RepoError> {
        let inserted = sqlx::query_as::<_, AccessGrantRow>(
            r#"
            INSERT INTO course_access_grants (course_id, learner_id, granted_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (course_id, learner_id) DO NOTHING
            RETURNING course_id, learner_id, granted_at
            "#,
        )
        .bind(course_id)
        .bind(learner_id)
        .bind(granted_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if let Some(row) = inserted {
            return Ok(AccessGrantRecord::from(row));
        }

        // The grant already existed; return it with its original timestamp.
        let row = sqlx::query_as::<_, AccessGrantRow>(
            r#"
            SELECT course_id, learner_id, granted_at
            FROM course_access_grants
            WHERE course_id = $1 AND learner_id = $2
            "#,
        )
        .bind(course_id)
        .bind(learner_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(AccessGrantRecord::from(row))
    }

    async fn has_access_grant(
        &self,
        course_id: Uuid,
        learner_id: Uuid,
    ) -> Result<bool, RepoError> {
        let granted = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM course_access_grants
                WHERE course_id = $1 AND learner_id = $2
            )
            "#,
        )
        .bind(course_id)
        .bind(learner_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(granted)
    }

    async fn list_completed_missing_certificate(
        &self,
        course_id: Option<Uuid>,
    ) -> Result<Vec<EnrollmentRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT e.id, e.learner_id, e.course_id, e.learner_name, e.progress_percentage, \
                    e.completed_at, e.dropped_at, e.created_at, e.updated_at \
             FROM enrollments e \
             LEFT JOIN certificates c ON c.enrollment_id = e.id \
             WHERE e.progress_percentage = 100 \
               AND e.completed_at IS NOT NULL \
               AND c.id IS NULL",
        );

        if let Some(course_id) = course_id {
            qb.push(" AND e.course_id = ");
            qb.push_bind(course_id);
        }

        qb.push(" ORDER BY e.completed_at ASC, e.id ASC");

        let rows = qb
            .build_query_as::<EnrollmentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EnrollmentRecord::from).collect())
    }
}
