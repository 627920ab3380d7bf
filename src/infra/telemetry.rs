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

pub const JOBS_COMPLETED_TOTAL: &str = "dossier_jobs_completed_total";
pub const JOBS_RETRIED_TOTAL: &str = "dossier_jobs_retried_total";
pub const JOBS_DEAD_LETTERED_TOTAL: &str = "dossier_jobs_dead_lettered_total";
pub const RENDER_MS: &str = "dossier_render_ms";
pub const SUMMARY_FALLBACK_TOTAL: &str = "dossier_summary_fallback_total";

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
            JOBS_COMPLETED_TOTAL,
            Unit::Count,
            "Total number of dossier render jobs acknowledged after a successful render."
        );
        describe_counter!(
            JOBS_RETRIED_TOTAL,
            Unit::Count,
            "Total number of dossier render jobs rescheduled after a transient failure."
        );
        describe_counter!(
            JOBS_DEAD_LETTERED_TOTAL,
            Unit::Count,
            "Total number of dossier render jobs moved to the dead-letter state."
        );
        describe_histogram!(
            RENDER_MS,
            Unit::Milliseconds,
            "Dossier render latency in milliseconds, including the pointer update."
        );
        describe_counter!(
            SUMMARY_FALLBACK_TOTAL,
            Unit::Count,
            "Total number of summaries replaced by the deterministic placeholder."
        );
    });
}
