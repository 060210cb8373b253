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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "murmur_sync_upserted_total",
            Unit::Count,
            "Records written to the durable store by the sync engine."
        );
        describe_counter!(
            "murmur_sync_deleted_total",
            Unit::Count,
            "Tombstones reconciled against the durable store."
        );
        describe_counter!(
            "murmur_sync_failed_total",
            Unit::Count,
            "Per-record sync failures, labelled by stage."
        );
        describe_histogram!(
            "murmur_sync_run_ms",
            Unit::Milliseconds,
            "Duration of one sync run in milliseconds."
        );
        describe_counter!(
            "murmur_purge_evicted_total",
            Unit::Count,
            "Records evicted from the hot store."
        );
        describe_counter!(
            "murmur_purge_failed_total",
            Unit::Count,
            "Evictions that failed with a storage error."
        );
        describe_histogram!(
            "murmur_purge_run_ms",
            Unit::Milliseconds,
            "Duration of one purge run in milliseconds."
        );
        describe_counter!(
            "murmur_fallback_total",
            Unit::Count,
            "Hot-store misses sent to the durable store, labelled by result."
        );
    });
}
