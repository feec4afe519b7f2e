//! Logging and metrics for the feeder.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{make_job_name, push_loop, serve_metrics, FeederMetrics};
