//! Field-sequence and formatting macros.
//!
//! `kv!` builds the alternating key/value sequence every level method takes.
//! The level macros pre-render a message like `format!` and log it with no
//! extra fields.
//!
//! # Examples
//!
//! ```
//! use rust_trace_logger::prelude::*;
//! use rust_trace_logger::info;
//!
//! let logger = Logger::builder("api").console(false).build().unwrap();
//!
//! // Structured fields
//! logger.info("request served", &kv!["status", 200, "path", "/health"]);
//!
//! // Formatted message
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//! ```

/// Build a [`KeyValues`](crate::core::KeyValues) sequence.
///
/// Each element goes through `Field::from`, so plain values and
/// [`Valuer`](crate::core::Valuer)s can be mixed.
///
/// ```
/// use rust_trace_logger::kv;
/// use rust_trace_logger::core::contains_valuer;
///
/// let fields = kv!["user", "alice", "attempt", 3];
/// assert_eq!(fields.len(), 4);
/// assert!(!contains_valuer(&fields));
/// assert!(kv![].is_empty());
/// ```
#[macro_export]
macro_rules! kv {
    () => {
        <$crate::core::KeyValues>::new()
    };
    ($($item:expr),+ $(,)?) => {
        <$crate::core::KeyValues>::from([$($crate::core::Field::from($item)),+])
    };
}

/// Log a formatted message at the given level.
///
/// ```
/// # use rust_trace_logger::prelude::*;
/// # let logger = Logger::builder("doc").console(false).build().unwrap();
/// use rust_trace_logger::log;
/// log!(logger, Level::Info, "Simple message");
/// log!(logger, Level::Warn, "Queue depth: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {{
        let _ = $logger.log($level, &::std::format!($($arg)+), &[]);
    }};
}

/// Log a formatted debug-level message.
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.debugf(::std::format_args!($($arg)+))
    };
}

/// Log a formatted info-level message.
///
/// ```
/// # use rust_trace_logger::prelude::*;
/// # let logger = Logger::builder("doc").console(false).build().unwrap();
/// use rust_trace_logger::info;
/// info!(logger, "Processing {} items", 100);
/// ```
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.infof(::std::format_args!($($arg)+))
    };
}

/// Log a formatted warning-level message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.warnf(::std::format_args!($($arg)+))
    };
}

/// Log a formatted error-level message.
///
/// ```
/// # use rust_trace_logger::prelude::*;
/// # let logger = Logger::builder("doc").console(false).build().unwrap();
/// use rust_trace_logger::error;
/// error!(logger, "Error code: {}, message: {}", 500, "Internal error");
/// ```
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.errorf(::std::format_args!($($arg)+))
    };
}

/// Log a formatted fatal-level message, then exit the process.
#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $logger.fatalf(::std::format_args!($($arg)+))
    };
}
