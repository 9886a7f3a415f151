//! Domain event bus.
//!
//! Lifecycle and progress transitions publish events here so collaborators
//! (notification senders, payment hooks, future consumers) can react without
//! being wired into the write path. Delivery is fan-out and best effort: a
//! failing notifier is logged and skipped, it never rolls back the write
//! that produced the event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

/// Events emitted by the course engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    CourseSubmitted { course_id: Uuid },
    CourseApproved { course_id: Uuid },
    CourseRejected { course_id: Uuid },
    CoursePublished { course_id: Uuid },
    /// A review-relevant edit demoted an approved or published course.
    CourseReverted { course_id: Uuid },
    LearnerEnrolled { course_id: Uuid, enrollment_id: Uuid },
    LessonCompleted { enrollment_id: Uuid, lesson_id: Uuid },
    /// Enrollment progress reached 100 percent.
    CourseCompleted { course_id: Uuid, enrollment_id: Uuid },
    CertificateIssued { enrollment_id: Uuid, serial: String },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CourseSubmitted { .. } => "course_submitted",
            Self::CourseApproved { .. } => "course_approved",
            Self::CourseRejected { .. } => "course_rejected",
            Self::CoursePublished { .. } => "course_published",
            Self::CourseReverted { .. } => "course_reverted",
            Self::LearnerEnrolled { .. } => "learner_enrolled",
            Self::LessonCompleted { .. } => "lesson_completed",
            Self::CourseCompleted { .. } => "course_completed",
            Self::CertificateIssued { .. } => "certificate_issued",
        }
    }
}

/// Event with idempotency and ordering support.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch for ordering within this process.
    pub epoch: Epoch,
    pub event: DomainEvent,
    /// When the event was created.
    pub timestamp: OffsetDateTime,
}

impl EventEnvelope {
    pub fn new(event: DomainEvent, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            event,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier `{notifier}` failed: {message}")]
    Delivery { notifier: &'static str, message: String },
}

/// A consumer of domain events.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, envelope: &EventEnvelope) -> Result<(), NotifyError>;
}

/// Fan-out event bus shared by all services.
pub struct EventBus {
    epoch_counter: AtomicU64,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl EventBus {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            epoch_counter: AtomicU64::new(0),
            notifiers,
        }
    }

    /// Get the next epoch number.
    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish an event to every notifier.
    ///
    /// The event is logged for observability before fan-out.
    pub async fn emit(&self, event: DomainEvent) {
        let epoch = self.next_epoch();
        let envelope = EventEnvelope::new(event, epoch);

        info!(
            event_id = %envelope.id,
            event_epoch = envelope.epoch,
            event_kind = envelope.event.kind(),
            "Domain event emitted"
        );

        for notifier in &self.notifiers {
            if let Err(err) = notifier.notify(&envelope).await {
                warn!(
                    event_id = %envelope.id,
                    notifier = notifier.name(),
                    error = %err,
                    "Notifier failed to handle domain event"
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(vec![Arc::new(TracingNotifier)])
    }
}

/// Baseline notifier that records every event in the process log.
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn notify(&self, envelope: &EventEnvelope) -> Result<(), NotifyError> {
        info!(
            event_id = %envelope.id,
            event_epoch = envelope.epoch,
            event_kind = envelope.event.kind(),
            event = ?envelope.event,
            "Domain event delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct RecordingNotifier {
        seen: Mutex<Vec<EventEnvelope>>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn notify(&self, envelope: &EventEnvelope) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn notify(&self, _envelope: &EventEnvelope) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery {
                notifier: "failing",
                message: "nope".into(),
            })
        }
    }

    #[tokio::test]
    async fn epochs_are_monotonic() {
        let recorder = Arc::new(RecordingNotifier::new());
        let bus = EventBus::new(vec![recorder.clone()]);

        let course_id = Uuid::new_v4();
        bus.emit(DomainEvent::CourseSubmitted { course_id }).await;
        bus.emit(DomainEvent::CourseApproved { course_id }).await;
        bus.emit(DomainEvent::CoursePublished { course_id }).await;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].epoch < seen[1].epoch);
        assert!(seen[1].epoch < seen[2].epoch);
    }

    #[tokio::test]
    async fn failing_notifier_does_not_block_others() {
        let recorder = Arc::new(RecordingNotifier::new());
        let bus = EventBus::new(vec![Arc::new(FailingNotifier), recorder.clone()]);

        bus.emit(DomainEvent::CertificateIssued {
            enrollment_id: Uuid::new_v4(),
            serial: "AULA-0000-0000-0000-0000".into(),
        })
        .await;

        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn event_kinds_are_stable() {
        let event = DomainEvent::CourseCompleted {
            course_id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
        };
        assert_eq!(event.kind(), "course_completed");
    }
}
