//! Certificate issuance, lookup, and verification.
//!
//! A certificate is an immutable snapshot of the enrollment at the moment of
//! issue. The serial and content hash are derived deterministically from the
//! snapshot, so verification never needs the originating course or learner
//! rows to still look the same.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::audit::AuditTrailService;
use crate::application::events::{DomainEvent, EventBus};
use crate::application::repos::{CertificatesRepo, CoursesRepo, EnrollmentsRepo, RepoError};
use crate::domain::actor::{AccessError, Actor};
use crate::domain::certificates::{canonical_issue_instant, content_hash, derive_serial};
use crate::domain::entities::{CertificateRecord, EnrollmentRecord};

const METRIC_CERTIFICATES_ISSUED_TOTAL: &str = "aula_certificates_issued_total";

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("course completion is at {progress}%, a certificate requires 100%")]
    NotEligible { progress: i16 },
    #[error("certificate not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Serialize)]
struct CertificateSnapshot<'a> {
    serial: &'a str,
    learner_name: &'a str,
    course_title: &'a str,
}

/// Result of checking a serial against the stored snapshot hash.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateVerification {
    pub certificate: CertificateRecord,
    pub hash_valid: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackfillSummary {
    pub examined: u64,
    pub issued: u64,
}

#[derive(Clone)]
pub struct CertificateService {
    pub(crate) courses: Arc<dyn CoursesRepo>,
    pub(crate) enrollments: Arc<dyn EnrollmentsRepo>,
    pub(crate) certificates: Arc<dyn CertificatesRepo>,
    pub(crate) audit: AuditTrailService,
    pub(crate) events: Arc<EventBus>,
}

impl CertificateService {
    pub fn new(
        courses: Arc<dyn CoursesRepo>,
        enrollments: Arc<dyn EnrollmentsRepo>,
        certificates: Arc<dyn CertificatesRepo>,
        audit: AuditTrailService,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            courses,
            enrollments,
            certificates,
            audit,
            events,
        }
    }

    /// Fetch the enrollment's certificate, issuing it first when the
    /// enrollment is complete but the certificate was never materialized.
    pub async fn get_or_issue(
        &self,
        actor: &Actor,
        enrollment_id: Uuid,
    ) -> Result<CertificateRecord, CertificateError> {
        let enrollment = self
            .enrollments
            .find_enrollment(enrollment_id)
            .await?
            .ok_or(CertificateError::EnrollmentNotFound)?;
        self.require_view_access(actor, &enrollment).await?;

        if let Some(existing) = self.certificates.find_by_enrollment(enrollment_id).await? {
            return Ok(existing);
        }

        if enrollment.progress_percentage < 100 || enrollment.completed_at.is_none() {
            return Err(CertificateError::NotEligible {
                progress: enrollment.progress_percentage,
            });
        }

        let (certificate, _created) = self
            .issue_for_completed(&actor.label(), &enrollment)
            .await?;
        Ok(certificate)
    }

    /// Issue a certificate for an enrollment known to be complete.
    ///
    /// Exactly one certificate can exist per enrollment. When a concurrent
    /// issuer wins the unique constraint, the stored row is returned and
    /// the second boolean is `false`.
    pub(crate) async fn issue_for_completed(
        &self,
        actor_label: &str,
        enrollment: &EnrollmentRecord,
    ) -> Result<(CertificateRecord, bool), CertificateError> {
        let course = self
            .courses
            .find_course(enrollment.course_id)
            .await?
            .ok_or_else(|| {
                CertificateError::Repo(RepoError::Integrity {
                    message: format!(
                        "enrollment {} references missing course {}",
                        enrollment.id, enrollment.course_id
                    ),
                })
            })?;

        let issued_at = canonical_issue_instant(OffsetDateTime::now_utc());
        let serial = derive_serial(enrollment.id, issued_at);
        let hash = content_hash(&enrollment.learner_name, &course.title, issued_at, &serial);

        let record = CertificateRecord {
            id: Uuid::new_v4(),
            enrollment_id: enrollment.id,
            serial,
            learner_name: enrollment.learner_name.clone(),
            course_title: course.title.clone(),
            ce_credit_hours: course.ce_credit_hours,
            content_hash: hash,
            issued_at,
        };

        match self.certificates.insert_certificate(record).await? {
            Some(created) => {
                counter!(METRIC_CERTIFICATES_ISSUED_TOTAL).increment(1);
                self.events
                    .emit(DomainEvent::CertificateIssued {
                        enrollment_id: enrollment.id,
                        serial: created.serial.clone(),
                    })
                    .await;

                let snapshot = CertificateSnapshot {
                    serial: &created.serial,
                    learner_name: &created.learner_name,
                    course_title: &created.course_title,
                };
                self.audit
                    .record(
                        actor_label,
                        "certificate.issue",
                        "certificate",
                        Some(&created.id.to_string()),
                        Some(&snapshot),
                    )
                    .await?;

                Ok((created, true))
            }
            None => {
                let existing = self
                    .certificates
                    .find_by_enrollment(enrollment.id)
                    .await?
                    .ok_or(CertificateError::NotFound)?;
                Ok((existing, false))
            }
        }
    }

    /// Check a serial and recompute the snapshot hash from stored fields.
    pub async fn verify(&self, serial: &str) -> Result<CertificateVerification, CertificateError> {
        let certificate = self
            .certificates
            .find_by_serial(serial)
            .await?
            .ok_or(CertificateError::NotFound)?;

        let recomputed = content_hash(
            &certificate.learner_name,
            &certificate.course_title,
            certificate.issued_at,
            &certificate.serial,
        );
        let hash_valid = recomputed == certificate.content_hash;

        Ok(CertificateVerification {
            certificate,
            hash_valid,
        })
    }

    /// Issue certificates for completed enrollments that never got one,
    /// optionally restricted to a single course.
    pub async fn backfill(
        &self,
        course_id: Option<Uuid>,
    ) -> Result<BackfillSummary, CertificateError> {
        let pending = self
            .enrollments
            .list_completed_missing_certificate(course_id)
            .await?;

        let mut summary = BackfillSummary::default();
        for enrollment in &pending {
            summary.examined += 1;
            let (_certificate, created) = self.issue_for_completed("system", enrollment).await?;
            if created {
                summary.issued += 1;
            }
        }

        Ok(summary)
    }

    async fn require_view_access(
        &self,
        actor: &Actor,
        enrollment: &EnrollmentRecord,
    ) -> Result<(), CertificateError> {
        if actor.id == enrollment.learner_id {
            return Ok(());
        }
        let course = self
            .courses
            .find_course(enrollment.course_id)
            .await?
            .ok_or(CertificateError::EnrollmentNotFound)?;
        if actor.can_view_unpublished(course.teacher_id) {
            return Ok(());
        }
        Err(AccessError::NotOwner { actor: actor.id }.into())
    }
}
