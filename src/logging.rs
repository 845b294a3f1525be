use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = build_env_filter(level);
    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_target(false)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_ansi(false)
                    .with_target(false),
            )
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("schoold: logging already initialized: {e}");
    }
}

fn build_env_filter(level: &str) -> EnvFilter {
    // Dependencies stay at warn so HTTP internals do not drown our own events.
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,schoold={level}")))
}
