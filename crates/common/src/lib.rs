pub mod config;
pub mod logging;
pub mod telemetry;

pub use config::{Environment, parse_env, parse_env_or};
pub use logging::setup_logging;
pub use telemetry::{TelemetryConfig, TelemetryGuard};
