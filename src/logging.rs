use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "SQLPULSE_LOG";
pub const ENV_LOG_FORMAT: &str = "SQLPULSE_LOG_FORMAT";

/// Installs the global subscriber. `SQLPULSE_LOG` (or `RUST_LOG`) sets the
/// filter; `SQLPULSE_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_logging() {
    let filter = std::env::var(ENV_LOG)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info,sqlpulse=info".to_string());
    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false);

    // try_init: a second call (tests, embedding) keeps the first subscriber.
    let _ = if json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.compact().with_ansi(false).try_init()
    };
}
