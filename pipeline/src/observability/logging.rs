use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console + daily-rotating JSON file logging. Mirrors the
/// teacher's `observability/logging.rs`: `RUST_LOG` wins if set, else a
/// sensible per-crate default.
pub fn init_logging() {
    let _ = fs::create_dir_all("logs");

    let file_appender = tracing_appender::rolling::daily("logs", "pipeline.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("eventmesh_pipeline=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    // Keep the non-blocking writer's flush guard alive for the process lifetime.
    std::mem::forget(guard);
}
