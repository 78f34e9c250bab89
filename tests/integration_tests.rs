//! Integration tests for the logger
//!
//! These tests verify:
//! - Field merging and the default prefix
//! - Construction failures for malformed field lists
//! - Secondary delivery on backend failure
//! - File output in both styles
//! - Context rebinding and deferred value resolution
//! - Configuration loading

use parking_lot::Mutex;
use rust_trace_logger::appenders::RotationPolicy;
use rust_trace_logger::core::value::context_value;
use rust_trace_logger::core::{Appender, Record};
use rust_trace_logger::prelude::*;
use rust_trace_logger::trace::{SpanContext, SpanId, TraceId};
use rust_trace_logger::LoggerConfig;
use serde_json::Value;
use std::fs;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Appender that keeps every record it receives
#[derive(Clone, Default)]
struct MemoryAppender {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Appender for MemoryAppender {
    fn append(&mut self, record: &Record) -> rust_trace_logger::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> rust_trace_logger::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Backend whose every call fails
struct FailingBackend;

impl Backend for FailingBackend {
    fn log(&self, _: Level, _: &str, _: &[FieldValue]) -> rust_trace_logger::Result<LogEntry> {
        Err(LoggerError::writer("disk full"))
    }

    fn close(&self) -> rust_trace_logger::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct CollectingSink {
    sent: Mutex<Vec<LogEntry>>,
    batched: Mutex<Vec<LogEntry>>,
}

impl Sink for CollectingSink {
    fn send(&self, _: &Context, entry: LogEntry) -> rust_trace_logger::Result<()> {
        self.sent.lock().push(entry);
        Ok(())
    }

    fn send_batch(&self, _: &Context, entries: Vec<LogEntry>) -> rust_trace_logger::Result<()> {
        self.batched.lock().extend(entries);
        Ok(())
    }
}

fn read_json_lines(path: &std::path::Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("Failed to read log file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("line is not JSON"))
        .collect()
}

#[test]
fn test_static_fields_reach_the_backend() {
    let memory = MemoryAppender::default();
    let logger = Logger::builder("svc")
        .console(false)
        .default_valuers(false)
        .appender(memory.clone())
        .build()
        .expect("Failed to build logger");

    assert!(!logger.has_valuer());
    logger.info("hello", &kv!["code", 200]);

    let records = memory.records.lock();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.level, Level::Info);
    assert_eq!(record.message, "hello");
    assert_eq!(record.field("service"), Some(&FieldValue::from("svc")));
    assert_eq!(record.field("code"), Some(&FieldValue::Int(200)));
}

#[test]
fn test_odd_fields_fail_construction() {
    let err = Logger::builder("svc")
        .fields(kv!["a", "b", "c"])
        .build()
        .unwrap_err();
    assert!(matches!(err, LoggerError::InvalidConfiguration { .. }));
    assert!(err.is_misuse());
}

#[test]
fn test_backend_failure_goes_to_sink_in_prod() {
    let sink = Arc::new(CollectingSink::default());
    let logger = Logger::builder("svc")
        .mode(Mode::Prod)
        .default_valuers(false)
        .backend(Arc::new(FailingBackend))
        .sink(sink.clone())
        .build()
        .unwrap();

    let result = logger.log(Level::Warn, "cache miss", &kv!["key", "user:7", "attempt", 2]);
    assert!(result.is_err());

    let sent = sink.sent.lock();
    assert_eq!(sent.len(), 1);
    let entry = &sent[0];
    assert_eq!(entry.get("key"), Some(&Value::from("user:7")));
    assert_eq!(entry.get("attempt"), Some(&Value::from(2)));
    assert_eq!(entry.get("service"), Some(&Value::from("svc")));
    assert_eq!(entry.get("message"), Some(&Value::from("cache miss")));
}

#[test]
fn test_backend_failure_skips_sink_in_dev() {
    let sink = Arc::new(CollectingSink::default());
    let logger = Logger::builder("svc")
        .backend(Arc::new(FailingBackend))
        .sink(sink.clone())
        .build()
        .unwrap();

    logger.error("lost", &kv!["code", 500]);
    assert!(sink.sent.lock().is_empty());
}

#[test]
fn test_default_prefix_in_file_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("prefix.log");

    let logger = Logger::builder("orders")
        .console(false)
        .file_writer(&log_file, RotationPolicy::default())
        .fields(kv!["region", "eu"])
        .build()
        .unwrap();

    logger.info("placed", &kv!["order_id", 9]);
    logger.close().unwrap();

    let lines = read_json_lines(&log_file);
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert_eq!(line["level"], "INFO");
    assert_eq!(line["message"], "placed");
    assert_eq!(line["service"], "orders");
    assert_eq!(line["region"], "eu");
    assert_eq!(line["order_id"], 9);
    assert_eq!(line["trace_id"], "");
    assert_eq!(line["span_id"], "");
    assert!(line["timestamp"].as_str().unwrap().ends_with('Z'));
    assert!(line["caller"]
        .as_str()
        .unwrap()
        .starts_with("tests/integration_tests.rs:"));

    // prefix keys come first, in order
    let raw = fs::read_to_string(&log_file).unwrap();
    let order: Vec<usize> = ["\"service\"", "\"timestamp\"", "\"caller\"", "\"trace_id\"", "\"span_id\"", "\"region\"", "\"order_id\""]
        .iter()
        .map(|key| raw.find(key).expect("key missing"))
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_file_lines_visible_without_close() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("panic.log");

    let logger = Logger::builder("orders")
        .console(false)
        .default_valuers(false)
        .file_writer(&log_file, RotationPolicy::default())
        .build()
        .unwrap();

    logger.info("before", &[]);
    let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        logger.panic("giving up", &kv!["attempts", 3]);
    }));
    assert!(unwound.is_err());

    // the logger is still alive and was never closed
    let lines = read_json_lines(&log_file);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["message"], "before");
    assert_eq!(lines[1]["level"], "PANIC");
    assert_eq!(lines[1]["message"], "giving up");
    assert_eq!(lines[1]["attempts"], 3);
    drop(logger);
}

#[test]
fn test_ctx_rebinds_trace_fields() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("ctx.log");

    let base = Logger::builder("svc")
        .console(false)
        .file_writer(&log_file, RotationPolicy::default())
        .build()
        .unwrap();

    let span = SpanContext::new(TraceId::from_bytes([0xab; 16]), SpanId::from_bytes([0xcd; 8]));
    let bound = base.ctx(Context::background().with_span_context(span));

    bound.info("inside request", &[]);
    base.info("outside request", &[]);
    base.close().unwrap();

    let lines = read_json_lines(&log_file);
    assert_eq!(lines[0]["trace_id"], "ab".repeat(16));
    assert_eq!(lines[0]["span_id"], "cd".repeat(8));
    assert_eq!(lines[1]["trace_id"], "");
}

#[test]
fn test_text_style_file_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("text.log");

    let logger = Logger::builder("svc")
        .console(false)
        .default_valuers(false)
        .output_style(OutputStyle::Text)
        .file_writer(&log_file, RotationPolicy::default())
        .build()
        .unwrap();

    logger.warn("slow query", &kv!["table", "users", "ms", 812]);
    logger.close().unwrap();

    let content = fs::read_to_string(&log_file).unwrap();
    assert_eq!(content, "WARN\tslow query\tservice=svc table=users ms=812\n");
}

#[test]
fn test_log_injection_prevention() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("injection.log");

    let logger = Logger::builder("svc")
        .console(false)
        .output_style(OutputStyle::Text)
        .file_writer(&log_file, RotationPolicy::default())
        .build()
        .unwrap();

    logger.info("User login\nERROR\tFake entry injected", &[]);
    logger.close().unwrap();

    let content = fs::read_to_string(&log_file).unwrap();
    assert!(content.contains("\\n"));
    assert_eq!(content.lines().count(), 1, "Log should be a single line");
}

#[test]
fn test_min_level_filters_but_succeeds() {
    let memory = MemoryAppender::default();
    let logger = Logger::builder("svc")
        .console(false)
        .min_level(Level::Warn)
        .appender(memory.clone())
        .build()
        .unwrap();

    let filtered = logger.log(Level::Info, "chatty", &kv!["n", 1]);
    let entry = filtered.expect("filtered calls still succeed");
    assert_eq!(entry.get("n"), Some(&Value::from(1)));

    logger.warn("kept", &[]);
    let records = memory.records.lock();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message, "kept");
}

#[test]
fn test_valuers_resolve_per_call() {
    let counter = Arc::new(AtomicU64::new(0));
    let seq = {
        let counter = Arc::clone(&counter);
        Valuer::new(move |_| FieldValue::from(counter.fetch_add(1, Ordering::SeqCst)))
    };

    let memory = MemoryAppender::default();
    let logger = Logger::builder("svc")
        .console(false)
        .default_valuers(false)
        .fields(kv!["seq", seq, "tenant", context_value("tenant")])
        .appender(memory.clone())
        .build()
        .unwrap();
    assert!(logger.has_valuer());

    let tenant_logger = logger.ctx(Context::background().with_value("tenant", "acme"));
    logger.info("one", &[]);
    tenant_logger.info("two", &[]);

    let records = memory.records.lock();
    assert_eq!(records[0].field("seq"), Some(&FieldValue::from(0u64)));
    assert_eq!(records[1].field("seq"), Some(&FieldValue::from(1u64)));
    assert_eq!(records[0].field("tenant"), Some(&FieldValue::Null));
    assert_eq!(records[1].field("tenant"), Some(&FieldValue::from("acme")));
}

#[test]
fn test_call_site_fields_shadow_prefix() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("shadow.log");

    let logger = Logger::builder("svc")
        .console(false)
        .default_valuers(false)
        .file_writer(&log_file, RotationPolicy::default())
        .build()
        .unwrap();

    logger.info("override", &kv!["service", "other"]);
    logger.close().unwrap();

    let lines = read_json_lines(&log_file);
    assert_eq!(lines[0]["service"], "other");
}

#[test]
fn test_exporter_receives_every_entry() {
    let exporter = Arc::new(CollectingSink::default());
    let logger = Logger::builder("svc")
        .console(false)
        .default_valuers(false)
        .exporter(exporter.clone())
        .build()
        .unwrap();

    for i in 0..120 {
        logger.info("tick", &kv!["i", i]);
    }
    logger.close().unwrap();

    let batched = exporter.batched.lock();
    assert_eq!(batched.len(), 120);
    assert_eq!(batched[119].get("i"), Some(&Value::from(119)));
    assert!(exporter.sent.lock().is_empty());
    assert_eq!(logger.exporter().unwrap().metrics().sent_count(), 120);
}

#[test]
fn test_close_flushes_each_appender_once_per_call() {
    #[derive(Clone, Default)]
    struct FlushCounter(Arc<AtomicUsize>);

    impl Appender for FlushCounter {
        fn append(&mut self, _: &Record) -> rust_trace_logger::Result<()> {
            Ok(())
        }

        fn flush(&mut self) -> rust_trace_logger::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "flush-counter"
        }
    }

    let counter = FlushCounter::default();
    let logger = Logger::builder("svc")
        .console(false)
        .appender(counter.clone())
        .build()
        .unwrap();

    logger.close().unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_logger_from_config_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("configured.log");
    let config_file = temp_dir.path().join("logger.json");

    let config = serde_json::json!({
        "service": "billing",
        "mode": "prod",
        "style": "json",
        "level": "debug",
        "console": false,
        "file": {"path": log_file, "max_backups": 2},
        "fields": {"zone": "b"}
    });
    fs::write(&config_file, config.to_string()).unwrap();

    let logger = LoggerConfig::from_file(&config_file)
        .unwrap()
        .into_builder()
        .build()
        .unwrap();
    assert_eq!(logger.mode(), Mode::Prod);

    logger.debug("visible at debug", &[]);
    logger.close().unwrap();

    let lines = read_json_lines(&log_file);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["level"], "DEBUG");
    assert_eq!(lines[0]["service"], "billing");
    assert_eq!(lines[0]["zone"], "b");
}
