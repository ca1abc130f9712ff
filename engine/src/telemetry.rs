//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging: pretty output in
//! debug builds, JSON with span context in release builds.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive applied when `RUST_LOG` is not set
fn default_directive(log_level: &str) -> String {
    let level = log_level.trim().to_lowercase();
    let level = if level.is_empty() { "info" } else { level.as_str() };
    format!("warn,roster_engine={level},roster={level}")
}

/// Initialize the tracing subscriber.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter. Dependencies
/// (sqlx, reqwest, hyper) stay at `warn` unless `RUST_LOG` says otherwise.
/// Calling this more than once is a no-op.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
