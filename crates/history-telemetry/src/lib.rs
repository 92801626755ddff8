//! # History Telemetry
//!
//! Logging bootstrap for the action history synchronization pipeline.
//!
//! The pipeline itself only emits `tracing` events; whoever embeds it decides
//! where they go. Standalone deployments and tests call [`init_logging`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use history_telemetry::{init_logging, TelemetryConfig};
//!
//! init_logging(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `history-sync` | Service name in logs |
//! | `HS_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `HS_JSON_LOGS` | `false` | JSON output (defaults on inside containers) |
//! | `HS_THREAD_NAMES` | `true` | Include thread names |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::init_logging;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Emit a pipeline event tagged with the subsystem name.
#[macro_export]
macro_rules! log_event {
    ($level:ident, $subsystem:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            subsystem = $subsystem,
            $($($field)*,)?
            $msg
        )
    };
}
