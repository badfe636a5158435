use tracing_subscriber::{fmt, EnvFilter};

/// Initializes tracing/logging based on environment variables.
///
/// `RUST_LOG` controls the filter (default `info`); `NL_ATLAS_LOG_FORMAT=json`
/// switches to structured JSON lines.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("NL_ATLAS_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
