use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "aula_courses_published_total",
            Unit::Count,
            "Total number of courses published."
        );
        describe_counter!(
            "aula_review_decisions_total",
            Unit::Count,
            "Total number of review decisions, labelled by decision."
        );
        describe_counter!(
            "aula_enrollments_created_total",
            Unit::Count,
            "Total number of enrollments created."
        );
        describe_counter!(
            "aula_lessons_completed_total",
            Unit::Count,
            "Total number of lesson completions recorded."
        );
        describe_counter!(
            "aula_certificates_issued_total",
            Unit::Count,
            "Total number of certificates issued."
        );
        describe_histogram!(
            "aula_progress_recompute_ms",
            Unit::Milliseconds,
            "Enrollment progress recompute latency in milliseconds."
        );
    });
}
