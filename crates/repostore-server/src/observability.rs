//! Structured logging initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system once for the process.
///
/// `level` is a default filter directive (trace, debug, info, warn, error);
/// `RUST_LOG` overrides it. With `json_format`, log lines are emitted as
/// JSON for aggregation; otherwise a human-readable format is used.
pub fn init_logging(level: &str, json_format: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("repostore={level},tower_http=debug").into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .init();
    } else {
        registry.with(fmt::layer()).init();
    }

    tracing::debug!(level = %level, json = json_format, "logging initialized");
}
