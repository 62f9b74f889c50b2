pub mod advisor;
pub mod api;
pub mod config;
pub mod llm;
pub mod ratelimit;
pub mod scoring;

/// Initialize the tracing subscriber — structured logs to stdout.
///
/// `RUST_LOG` overrides the configured verbosity when set.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
