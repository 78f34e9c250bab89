//! Main logger implementation

use super::{
    appender::Appender,
    backend::{AppenderBackend, Backend},
    context::Context,
    error::{LoggerError, Result},
    field::FieldValue,
    level::Level,
    output_format::OutputStyle,
    timestamp::TimestampFormat,
    value::{self, bind_values, contains_valuer, Field, KeyValues},
};
use crate::appenders::{ConsoleAppender, RotatingFileAppender, RotationPolicy};
use crate::sink::{BatchProcessor, LogEntry, Sink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How long `close` waits for queued exporter entries
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run mode; secondary delivery fires only in `Prod`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Dev,
    Prod,
}

/// Structured logger bound to a context
///
/// Cloning (or [`Logger::copy`]) shares the backend, prefix and sinks.
/// [`Logger::ctx`] does the same with a different bound context.
#[derive(Clone)]
pub struct Logger {
    backend: Arc<dyn Backend>,
    prefix: Arc<[Field]>,
    has_valuer: bool,
    ctx: Context,
    mode: Mode,
    sink: Option<Arc<dyn Sink>>,
    exporter: Option<Arc<BatchProcessor>>,
}

impl Logger {
    /// Logger with every default: console output, JSON style, Dev mode
    pub fn new(service: impl Into<String>) -> Self {
        let backend = Arc::new(AppenderBackend::new(
            vec![Box::new(ConsoleAppender::new(OutputStyle::Json))],
            Level::Info,
        ));
        LoggerBuilder::new(service).assemble(backend, Vec::new())
    }

    #[must_use]
    pub fn builder(service: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder::new(service)
    }

    /// Emit one record. This is the only logging call that reports failure;
    /// the level methods discard the result.
    #[track_caller]
    pub fn log(&self, level: Level, message: &str, keyvals: &[Field]) -> Result<LogEntry> {
        self.log_at(level, message, keyvals, Location::caller())
    }

    fn log_at(
        &self,
        level: Level,
        message: &str,
        keyvals: &[Field],
        caller: &'static Location<'static>,
    ) -> Result<LogEntry> {
        let mut merged: KeyValues = Vec::with_capacity(self.prefix.len() + keyvals.len());
        merged.extend_from_slice(&self.prefix);
        merged.extend_from_slice(keyvals);

        let ctx = self.ctx.clone().with_caller(caller);
        if self.has_valuer {
            bind_values(&ctx, &mut merged);
        }
        // Call-site valuers (and any in key position) resolve here.
        let values: Vec<FieldValue> = merged.into_iter().map(|f| f.into_value(&ctx)).collect();

        match self.backend.log(level, message, &values) {
            Ok(entry) => {
                if let Some(ref exporter) = self.exporter {
                    // Drops are counted by the exporter.
                    let _ = exporter.submit(entry.clone());
                }
                Ok(entry)
            }
            Err(err) => {
                self.deliver_fallback(&ctx, level, message, &values);
                Err(err)
            }
        }
    }

    fn deliver_fallback(&self, ctx: &Context, level: Level, message: &str, values: &[FieldValue]) {
        if self.mode != Mode::Prod {
            return;
        }
        let Some(ref sink) = self.sink else {
            return;
        };
        let entry = LogEntry::project(level, message, values);
        if let Err(e) = sink.send(ctx, entry) {
            eprintln!("[LOGGER ERROR] Secondary delivery failed: {}", e);
        }
    }

    #[track_caller]
    #[inline]
    pub fn info(&self, message: &str, keyvals: &[Field]) {
        let _ = self.log(Level::Info, message, keyvals);
    }

    #[track_caller]
    #[inline]
    pub fn debug(&self, message: &str, keyvals: &[Field]) {
        let _ = self.log(Level::Debug, message, keyvals);
    }

    #[track_caller]
    #[inline]
    pub fn warn(&self, message: &str, keyvals: &[Field]) {
        let _ = self.log(Level::Warn, message, keyvals);
    }

    #[track_caller]
    #[inline]
    pub fn error(&self, message: &str, keyvals: &[Field]) {
        let _ = self.log(Level::Error, message, keyvals);
    }

    /// Log, flush and exit the process with status 1
    #[track_caller]
    #[inline]
    pub fn fatal(&self, message: &str, keyvals: &[Field]) {
        let _ = self.log(Level::Fatal, message, keyvals);
    }

    /// Log, then panic with `message`
    #[track_caller]
    #[inline]
    pub fn panic(&self, message: &str, keyvals: &[Field]) {
        let _ = self.log(Level::Panic, message, keyvals);
    }

    #[track_caller]
    pub fn infof(&self, args: fmt::Arguments<'_>) {
        let _ = self.log(Level::Info, &fmt::format(args), &[]);
    }

    #[track_caller]
    pub fn debugf(&self, args: fmt::Arguments<'_>) {
        let _ = self.log(Level::Debug, &fmt::format(args), &[]);
    }

    #[track_caller]
    pub fn warnf(&self, args: fmt::Arguments<'_>) {
        let _ = self.log(Level::Warn, &fmt::format(args), &[]);
    }

    #[track_caller]
    pub fn errorf(&self, args: fmt::Arguments<'_>) {
        let _ = self.log(Level::Error, &fmt::format(args), &[]);
    }

    #[track_caller]
    pub fn fatalf(&self, args: fmt::Arguments<'_>) {
        let _ = self.log(Level::Fatal, &fmt::format(args), &[]);
    }

    #[track_caller]
    pub fn panicf(&self, args: fmt::Arguments<'_>) {
        let _ = self.log(Level::Panic, &fmt::format(args), &[]);
    }

    /// Same backend and prefix, bound to `ctx`; `self` is unchanged
    #[must_use]
    pub fn ctx(&self, ctx: Context) -> Logger {
        Logger {
            ctx,
            ..self.clone()
        }
    }

    /// Shallow duplicate sharing every handle
    #[must_use]
    pub fn copy(&self) -> Logger {
        self.clone()
    }

    /// Drain the exporter and release the backend. Failures are reported on
    /// stderr and returned.
    pub fn close(&self) -> Result<()> {
        if let Some(ref exporter) = self.exporter {
            if !exporter.shutdown(DEFAULT_SHUTDOWN_TIMEOUT) {
                eprintln!("[LOGGER WARNING] Exporter did not drain before close");
            }
        }
        self.backend.close().inspect_err(|e| {
            eprintln!("[LOGGER ERROR] Failed to flush during close: {}", e);
        })
    }

    /// Whether both loggers write through the same backend or exporter, as
    /// copies and context-bound loggers do
    pub fn shares_output_with(&self, other: &Logger) -> bool {
        let same_backend =
            std::ptr::addr_eq(Arc::as_ptr(&self.backend), Arc::as_ptr(&other.backend));
        let same_exporter = matches!(
            (&self.exporter, &other.exporter),
            (Some(a), Some(b)) if Arc::ptr_eq(a, b)
        );
        same_backend || same_exporter
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the static prefix holds any valuer
    pub fn has_valuer(&self) -> bool {
        self.has_valuer
    }

    pub fn prefix(&self) -> &[Field] {
        &self.prefix
    }

    pub fn exporter(&self) -> Option<&BatchProcessor> {
        self.exporter.as_deref()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("prefix_len", &self.prefix.len())
            .field("has_valuer", &self.has_valuer)
            .field("mode", &self.mode)
            .field("sink", &self.sink.is_some())
            .field("exporter", &self.exporter.is_some())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Builder for constructing a Logger with a fluent API
///
/// # Example
/// ```
/// use rust_trace_logger::prelude::*;
///
/// let logger = Logger::builder("checkout")
///     .mode(Mode::Prod)
///     .output_style(OutputStyle::Text)
///     .min_level(Level::Debug)
///     .fields(kv!["region", "eu-west-1"])
///     .build()
///     .unwrap();
/// logger.info("ready", &kv!["port", 8080]);
/// ```
pub struct LoggerBuilder {
    service: String,
    mode: Mode,
    style: OutputStyle,
    min_level: Level,
    file: Option<(PathBuf, RotationPolicy)>,
    fields: KeyValues,
    sink: Option<Arc<dyn Sink>>,
    exporter: Option<Arc<dyn Sink>>,
    backend: Option<Arc<dyn Backend>>,
    appenders: Vec<Box<dyn Appender>>,
    console: bool,
    colors: bool,
    default_valuers: bool,
    timestamp_format: TimestampFormat,
    invalid: Option<LoggerError>,
}

impl LoggerBuilder {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            mode: Mode::default(),
            style: OutputStyle::default(),
            min_level: Level::Info,
            file: None,
            fields: Vec::new(),
            sink: None,
            exporter: None,
            backend: None,
            appenders: Vec::new(),
            console: true,
            colors: false,
            default_valuers: true,
            timestamp_format: TimestampFormat::default(),
            invalid: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn output_style(mut self, style: OutputStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Also write to a size-rotated file at `path`
    #[must_use = "builder methods return a new value"]
    pub fn file_writer(mut self, path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        self.file = Some((path.into(), policy));
        self
    }

    /// Static fields appended to the prefix; each list must be key/value
    /// pairs on its own, the first odd list fails [`build`](Self::build)
    #[must_use = "builder methods return a new value"]
    pub fn fields(mut self, fields: KeyValues) -> Self {
        if fields.len() % 2 != 0 {
            self.invalid.get_or_insert_with(|| {
                LoggerError::config(
                    "fields",
                    format!("keyvalues must appear in pairs: got {} elements", fields.len()),
                )
            });
            return self;
        }
        self.fields.extend(fields);
        self
    }

    /// Secondary delivery for records the backend failed to write
    #[must_use = "builder methods return a new value"]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Remote exporter that receives every emitted record in batches
    #[must_use = "builder methods return a new value"]
    pub fn exporter(mut self, exporter: Arc<dyn Sink>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Use a custom backend; console, file and appender options are ignored
    #[must_use = "builder methods return a new value"]
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Add an appender to the default backend
    #[must_use = "builder methods return a new value"]
    pub fn appender<A: Appender + 'static>(mut self, appender: A) -> Self {
        self.appenders.push(Box::new(appender));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    /// Color level labels on the console in text style
    #[must_use = "builder methods return a new value"]
    pub fn colors(mut self, enabled: bool) -> Self {
        self.colors = enabled;
        self
    }

    /// Include the `timestamp`, `caller`, `trace_id` and `span_id` valuers in
    /// the prefix (on by default)
    #[must_use = "builder methods return a new value"]
    pub fn default_valuers(mut self, enabled: bool) -> Self {
        self.default_valuers = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Validate options and construct the logger
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for an odd-length field list or an unusable
    /// file target
    pub fn build(mut self) -> Result<Logger> {
        if let Some(err) = self.invalid.take() {
            return Err(err);
        }

        let backend: Arc<dyn Backend> = match self.backend.take() {
            Some(backend) => backend,
            None => {
                let mut appenders: Vec<Box<dyn Appender>> = Vec::new();
                if self.console {
                    appenders.push(Box::new(
                        ConsoleAppender::new(self.style).with_colors(self.colors),
                    ));
                }
                if let Some((ref path, ref policy)) = self.file {
                    let file = RotatingFileAppender::new(path, policy.clone(), self.style)
                        .map_err(|e| LoggerError::config("file_writer", e.to_string()))?;
                    appenders.push(Box::new(file));
                }
                appenders.append(&mut self.appenders);
                Arc::new(AppenderBackend::new(appenders, self.min_level))
            }
        };

        let exporter = self.exporter.take();
        Ok(self.assemble(backend, exporter.into_iter().collect()))
    }

    fn assemble(self, backend: Arc<dyn Backend>, exporters: Vec<Arc<dyn Sink>>) -> Logger {
        let mut prefix: KeyValues = Vec::with_capacity(10 + self.fields.len());
        prefix.push(Field::from("service"));
        prefix.push(Field::from(self.service));
        if self.default_valuers {
            prefix.extend([
                Field::from("timestamp"),
                Field::from(value::timestamp(self.timestamp_format)),
                Field::from("caller"),
                Field::from(value::caller()),
                Field::from("trace_id"),
                Field::from(crate::trace::trace_id()),
                Field::from("span_id"),
                Field::from(crate::trace::span_id()),
            ]);
        }
        prefix.extend(self.fields);

        let has_valuer = contains_valuer(&prefix);

        Logger {
            backend,
            prefix: prefix.into(),
            has_valuer,
            ctx: Context::background(),
            mode: self.mode,
            sink: self.sink,
            exporter: exporters
                .into_iter()
                .next()
                .map(|sink| Arc::new(BatchProcessor::new(sink))),
        }
    }
}
