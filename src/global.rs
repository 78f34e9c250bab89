//! Process-wide logger
//!
//! The global starts as a default logger with an empty service name and can
//! be replaced at any time with [`set_global`]. Replacement swaps the handle
//! under a write lock, then closes the previous logger once the lock is
//! released, unless the new logger shares its backend or exporter. Calls
//! already running on the old logger may still be in flight when it is
//! closed.

use crate::core::{Context, Field, Level, Logger, Result};
use crate::sink::LogEntry;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, LazyLock};

static GLOBAL: LazyLock<RwLock<Arc<Logger>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Logger::new(""))));

/// Replace the global logger and close the one it replaces
///
/// A previous logger whose output the new one still uses, such as
/// `set_global(get_global().copy())`, is left open.
pub fn set_global(logger: Logger) {
    let next = Arc::new(logger);
    let previous = std::mem::replace(&mut *GLOBAL.write(), Arc::clone(&next));
    if previous.shares_output_with(&next) {
        return;
    }
    if let Err(e) = previous.close() {
        eprintln!("[LOGGER ERROR] Closing replaced global logger failed: {}", e);
    }
}

/// Current global logger
pub fn get_global() -> Arc<Logger> {
    Arc::clone(&GLOBAL.read())
}

/// Copy of the global logger bound to `ctx`
pub fn ctx(ctx: Context) -> Logger {
    GLOBAL.read().ctx(ctx)
}

/// Alias of [`ctx`]
pub fn copy_global_with_context(context: Context) -> Logger {
    ctx(context)
}

/// Shallow copy of the global logger
pub fn copy() -> Logger {
    GLOBAL.read().copy()
}

#[track_caller]
pub fn log(level: Level, message: &str, keyvals: &[Field]) -> Result<LogEntry> {
    get_global().log(level, message, keyvals)
}

#[track_caller]
pub fn info(message: &str, keyvals: &[Field]) {
    get_global().info(message, keyvals);
}

#[track_caller]
pub fn debug(message: &str, keyvals: &[Field]) {
    get_global().debug(message, keyvals);
}

#[track_caller]
pub fn warn(message: &str, keyvals: &[Field]) {
    get_global().warn(message, keyvals);
}

#[track_caller]
pub fn error(message: &str, keyvals: &[Field]) {
    get_global().error(message, keyvals);
}

#[track_caller]
pub fn fatal(message: &str, keyvals: &[Field]) {
    get_global().fatal(message, keyvals);
}

#[track_caller]
pub fn panic(message: &str, keyvals: &[Field]) {
    get_global().panic(message, keyvals);
}

#[track_caller]
pub fn infof(args: fmt::Arguments<'_>) {
    get_global().infof(args);
}

#[track_caller]
pub fn debugf(args: fmt::Arguments<'_>) {
    get_global().debugf(args);
}

#[track_caller]
pub fn warnf(args: fmt::Arguments<'_>) {
    get_global().warnf(args);
}

#[track_caller]
pub fn errorf(args: fmt::Arguments<'_>) {
    get_global().errorf(args);
}

#[track_caller]
pub fn fatalf(args: fmt::Arguments<'_>) {
    get_global().fatalf(args);
}

#[track_caller]
pub fn panicf(args: fmt::Arguments<'_>) {
    get_global().panicf(args);
}
