//! # Rust Trace Logger
//!
//! A structured, context-aware logging facade.
//!
//! ## Features
//!
//! - **Deferred values**: timestamp, caller, trace id and span id fields are
//!   resolved against the bound [`Context`] at emission time
//! - **Trace correlation**: W3C `traceparent` propagation with a Snowflake
//!   fallback generator when no tracer is installed
//! - **Secondary delivery**: entries the backend failed to write are mirrored
//!   to a [`Sink`] in production mode; an exporter sink receives batches of
//!   everything emitted
//! - **Global logger**: replaceable process-wide instance with free functions
//! - **HTTP middleware**: axum layers for trace binding and access logging
//!   (feature `middleware`)
//!
//! ## Example
//!
//! ```
//! use rust_trace_logger::prelude::*;
//!
//! let logger = Logger::builder("checkout")
//!     .console(false)
//!     .fields(kv!["region", "eu-west-1"])
//!     .build()
//!     .unwrap();
//!
//! logger.info("order placed", &kv!["order_id", 42, "total", 99.5]);
//! logger.close().unwrap();
//! ```

pub mod appenders;
pub mod core;
pub mod global;
#[macro_use]
pub mod macros;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod sink;
pub mod trace;

pub mod prelude {
    pub use crate::appenders::{ConsoleAppender, RotatingFileAppender, RotationPolicy};
    pub use crate::core::{
        Appender, Backend, Context, Field, FieldValue, KeyValues, Level, Logger, LoggerBuilder,
        LoggerError, Mode, OutputStyle, Result, TimestampFormat, Valuer,
    };
    pub use crate::kv;
    pub use crate::sink::{LogEntry, Sink};
}

pub use appenders::{ConsoleAppender, RotatingFileAppender, RotationPolicy};
pub use core::{
    Appender, AppenderBackend, Backend, Context, Field, FieldValue, KeyValues, Level, Logger,
    LoggerBuilder, LoggerConfig, LoggerError, Mode, OutputStyle, Result, TimestampFormat, Valuer,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use global::{get_global, set_global};
pub use sink::{BatchProcessor, LogEntry, Sink};
