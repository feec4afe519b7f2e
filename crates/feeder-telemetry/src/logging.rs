//! Logging setup.
//!
//! The verbosity comes from `RUST_LOG` when set, otherwise from the
//! feeder's own `LOG_LEVEL` variable (default `info`). The output format
//! is picked by `LOG_FORMAT` (`json`, `compact` or `pretty`); without it,
//! production runs (`RUST_ENV=production`) log JSON and everything else
//! logs pretty.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::EnvFilter;

pub fn init_logging() -> TelemetryResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match log_format().as_str() {
        "json" => builder.json().with_current_span(true).try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };
    result.map_err(|e| TelemetryError::Logging(e.to_string()))
}

fn log_format() -> String {
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        return format.to_lowercase();
    }
    if std::env::var("RUST_ENV").as_deref() == Ok("production") {
        "json".to_string()
    } else {
        "pretty".to_string()
    }
}
