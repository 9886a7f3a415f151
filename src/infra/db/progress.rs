use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CheckpointUpsertParams, ProgressRepo, RepoError};
use crate::domain::entities::{LessonCompletionRecord, PlaybackCheckpointRecord};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CompletionRow {
    enrollment_id: Uuid,
    lesson_id: Uuid,
    completed_at: OffsetDateTime,
}

impl From<CompletionRow> for LessonCompletionRecord {
    fn from(row: CompletionRow) -> Self {
        Self {
            enrollment_id: row.enrollment_id,
            lesson_id: row.lesson_id,
            completed_at: row.completed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    enrollment_id: Uuid,
    lesson_id: Uuid,
    last_position_seconds: f64,
    watched_ratio: f64,
    updated_at: OffsetDateTime,
}

impl From<CheckpointRow> for PlaybackCheckpointRecord {
    fn from(row: CheckpointRow) -> Self {
        Self {
            enrollment_id: row.enrollment_id,
            lesson_id: row.lesson_id,
            last_position_seconds: row.last_position_seconds,
            watched_ratio: row.watched_ratio,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ProgressRepo for PostgresRepositories {
    async fn insert_completion(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
        completed_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO lesson_completions (enrollment_id, lesson_id, completed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (enrollment_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(enrollment_id)
        .bind(lesson_id)
        .bind(completed_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_checkpoint(
        &self,
        params: CheckpointUpsertParams,
    ) -> Result<PlaybackCheckpointRecord, RepoError> {
        // Position follows the latest heartbeat; the ratio only ever grows.
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            INSERT INTO playback_checkpoints (
                enrollment_id, lesson_id, last_position_seconds, watched_ratio, updated_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (enrollment_id, lesson_id) DO UPDATE SET
                last_position_seconds = EXCLUDED.last_position_seconds,
                watched_ratio = GREATEST(playback_checkpoints.watched_ratio, EXCLUDED.watched_ratio),
                updated_at = EXCLUDED.updated_at
            RETURNING enrollment_id, lesson_id, last_position_seconds, watched_ratio, updated_at
            "#,
        )
        .bind(params.enrollment_id)
        .bind(params.lesson_id)
        .bind(params.position_seconds)
        .bind(params.watched_ratio)
        .bind(params.updated_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PlaybackCheckpointRecord::from(row))
    }

    async fn find_checkpoint(
        &self,
        enrollment_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<Option<PlaybackCheckpointRecord>, RepoError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT enrollment_id, lesson_id, last_position_seconds, watched_ratio, updated_at
            FROM playback_checkpoints
            WHERE enrollment_id = $1 AND lesson_id = $2
            "#,
        )
        .bind(enrollment_id)
        .bind(lesson_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PlaybackCheckpointRecord::from))
    }

    async fn count_completed_in_course(
        &self,
        enrollment_id: Uuid,
        course_id: Uuid,
    ) -> Result<u64, RepoError> {
        // Completions for lessons that were since removed must not count.
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM lesson_completions lc
            INNER JOIN lessons l ON l.id = lc.lesson_id
            INNER JOIN modules m ON m.id = l.module_id
            WHERE lc.enrollment_id = $1 AND m.course_id = $2
            "#,
        )
        .bind(enrollment_id)
        .bind(course_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn list_completions(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Vec<LessonCompletionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CompletionRow>(
            r#"
            SELECT enrollment_id, lesson_id, completed_at
            FROM lesson_completions
            WHERE enrollment_id = $1
            ORDER BY completed_at ASC, lesson_id ASC
            "#,
        )
        .bind(enrollment_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(LessonCompletionRecord::from).collect())
    }

    async fn list_checkpoints(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Vec<PlaybackCheckpointRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT enrollment_id, lesson_id, last_position_seconds, watched_ratio, updated_at
            FROM playback_checkpoints
            WHERE enrollment_id = $1
            ORDER BY updated_at DESC, lesson_id ASC
            "#,
        )
        .bind(enrollment_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(PlaybackCheckpointRecord::from)
            .collect())
    }
}
