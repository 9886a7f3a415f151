use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CertificatesRepo, RepoError};
use crate::domain::entities::CertificateRecord;

use super::{PostgresRepositories, map_sqlx_error};

const CERTIFICATE_COLUMNS: &str =
    "id, enrollment_id, serial, learner_name, course_title, ce_credit_hours, \
     content_hash, issued_at";

#[derive(sqlx::FromRow)]
struct CertificateRow {
    id: Uuid,
    enrollment_id: Uuid,
    serial: String,
    learner_name: String,
    course_title: String,
    ce_credit_hours: Option<f64>,
    content_hash: String,
    issued_at: OffsetDateTime,
}

impl From<CertificateRow> for CertificateRecord {
    fn from(row: CertificateRow) -> Self {
        Self {
            id: row.id,
            enrollment_id: row.enrollment_id,
            serial: row.serial,
            learner_name: row.learner_name,
            course_title: row.course_title,
            ce_credit_hours: row.ce_credit_hours,
            content_hash: row.content_hash,
            issued_at: row.issued_at,
        }
    }
}

#[async_trait]
impl CertificatesRepo for PostgresRepositories {
    async fn insert_certificate(
        &self,
        record: CertificateRecord,
    ) -> Result<Option<CertificateRecord>, RepoError> {
        // The unique constraint on enrollment_id settles issuance races;
        // the losing insert comes back empty.
        let sql = format!(
            "INSERT INTO certificates ( \
                 id, enrollment_id, serial, learner_name, course_title, \
                 ce_credit_hours, content_hash, issued_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (enrollment_id) DO NOTHING \
             RETURNING {CERTIFICATE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(record.id)
            .bind(record.enrollment_id)
            .bind(record.serial)
            .bind(record.learner_name)
            .bind(record.course_title)
            .bind(record.ce_credit_hours)
            .bind(record.content_hash)
            .bind(record.issued_at)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CertificateRecord::from))
    }

    async fn find_by_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<CertificateRecord>, RepoError> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE enrollment_id = $1");
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(enrollment_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CertificateRecord::from))
    }

    async fn find_by_serial(&self, serial: &str) -> Result<Option<CertificateRecord>, RepoError> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE serial = $1");
        let row = sqlx::query_as::<_, CertificateRow>(&sql)
            .bind(serial)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CertificateRecord::from))
    }
}
