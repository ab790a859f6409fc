use std::sync::Once;

use metrics::{Unit, describe_counter};
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
            "clipasa_feed_fetch_total",
            Unit::Count,
            "Total number of feed page fetches, by kind (refresh or load_more)."
        );
        describe_counter!(
            "clipasa_feed_stale_discard_total",
            Unit::Count,
            "Total number of feed responses discarded because the query changed mid-flight."
        );
        describe_counter!(
            "clipasa_api_request_total",
            Unit::Count,
            "Total number of GraphQL requests issued, by operation."
        );
        describe_counter!(
            "clipasa_api_retry_total",
            Unit::Count,
            "Total number of GraphQL request retries after transient failures."
        );
    });
}
