//! Backend adapter: the narrow capability the logger writes through

use super::appender::Appender;
use super::error::{LoggerError, Result};
use super::field::FieldValue;
use super::level::Level;
use super::record::Record;
use crate::sink::LogEntry;
use parking_lot::Mutex;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Log-writing capability wrapped by a [`Logger`](super::Logger)
pub trait Backend: Send + Sync {
    /// Emit one record. `keyvals` must have even length; on success the
    /// pairs are returned projected into a [`LogEntry`].
    fn log(&self, level: Level, message: &str, keyvals: &[FieldValue]) -> Result<LogEntry>;

    /// Flush and release outputs
    fn close(&self) -> Result<()>;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Default backend: fans each record out to a list of appenders
pub struct AppenderBackend {
    appenders: Mutex<Vec<Box<dyn Appender>>>,
    min_level: Level,
}

impl AppenderBackend {
    pub fn new(appenders: Vec<Box<dyn Appender>>, min_level: Level) -> Self {
        Self {
            appenders: Mutex::new(appenders),
            min_level,
        }
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn appender_names(&self) -> Vec<String> {
        self.appenders
            .lock()
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    /// Write `record` to every appender. One failing or panicking appender
    /// does not stop the others; the first failure is returned.
    fn dispatch(&self, record: &Record) -> Result<()> {
        let mut appenders = self.appenders.lock();
        let mut failures = 0usize;
        let mut first_error = None;

        for appender in appenders.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| appender.append(record)));
            let err = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => {
                    eprintln!("[LOGGER ERROR] Appender '{}' failed: {}", appender.name(), e);
                    e
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    eprintln!(
                        "[LOGGER CRITICAL] Appender '{}' panicked: {}. \
                         Other appenders continue to function.",
                        appender.name(),
                        msg
                    );
                    LoggerError::writer(format!("appender '{}' panicked: {}", appender.name(), msg))
                }
            };
            failures += 1;
            first_error.get_or_insert(err);
        }

        match first_error {
            None => Ok(()),
            Some(err) if failures == 1 => Err(err),
            Some(err) => Err(LoggerError::writer(format!(
                "{} appenders failed, first: {}",
                failures, err
            ))),
        }
    }

    fn flush_all(&self) -> Result<()> {
        let mut appenders = self.appenders.lock();
        let mut first_error = None;

        for appender in appenders.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| appender.flush()));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[LOGGER ERROR] Appender '{}' flush failed: {}", appender.name(), e);
                    first_error.get_or_insert(e);
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    eprintln!(
                        "[LOGGER CRITICAL] Appender '{}' panicked during flush: {}",
                        appender.name(),
                        msg
                    );
                    first_error.get_or_insert(LoggerError::writer(msg));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn capture_stack() -> Option<String> {
        let backtrace = Backtrace::capture();
        (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string())
    }
}

impl Backend for AppenderBackend {
    fn log(&self, level: Level, message: &str, keyvals: &[FieldValue]) -> Result<LogEntry> {
        if keyvals.len() % 2 != 0 {
            let warning = Record::new(
                Level::Warn,
                &format!("Keyvalues must appear in pairs: {:?}", keyvals),
            );
            // The diagnostic is best effort; the caller gets the pairing error.
            let _ = self.dispatch(&warning);
            return Err(LoggerError::odd_keyvals(keyvals.len()));
        }

        let entry = LogEntry::project(level, message, keyvals);
        if !level.is_enabled_at(self.min_level) {
            return Ok(entry);
        }

        let mut record = Record::new(level, message).with_keyvals(keyvals);
        if level.is_enabled_at(Level::Error) {
            if let Some(stack) = Self::capture_stack() {
                record = record.with_stack(stack);
            }
        }

        let written = self.dispatch(&record);

        match level {
            Level::Fatal => {
                let _ = self.flush_all();
                std::process::exit(1);
            }
            Level::Panic => {
                let _ = self.flush_all();
                panic!("{}", message);
            }
            _ => {}
        }

        written.map(|()| entry)
    }

    fn close(&self) -> Result<()> {
        self.flush_all()
    }
}

impl std::fmt::Debug for AppenderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppenderBackend")
            .field("appenders", &self.appender_names())
            .field("min_level", &self.min_level)
            .finish()
    }
}
