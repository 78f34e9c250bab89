//! Stress tests for concurrent use
//!
//! These tests verify:
//! - Global logger replacement under concurrent readers
//! - Replaced global loggers are closed exactly once
//! - Fallback trace ids stay unique across threads
//! - Concurrent logging through shared and context-bound loggers

use parking_lot::Mutex;
use rust_trace_logger::appenders::RotationPolicy;
use rust_trace_logger::global;
use rust_trace_logger::prelude::*;
use rust_trace_logger::trace::{snowflake_trace_id, SpanContext, SpanId, TraceId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

/// Tests touching the process-wide logger run one at a time
static GLOBAL_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Backend that counts how often it was closed
#[derive(Default)]
struct CloseCounter {
    closes: AtomicUsize,
    logs: AtomicUsize,
}

impl Backend for CloseCounter {
    fn log(&self, level: Level, message: &str, keyvals: &[FieldValue]) -> Result<LogEntry> {
        self.logs.fetch_add(1, Ordering::SeqCst);
        Ok(LogEntry::project(level, message, keyvals))
    }

    fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn counted_logger(service: &str) -> (Arc<CloseCounter>, Logger) {
    let backend = Arc::new(CloseCounter::default());
    let logger = Logger::builder(service)
        .default_valuers(false)
        .backend(backend.clone())
        .build()
        .expect("Failed to build logger");
    (backend, logger)
}

fn service_of(logger: &Logger) -> Option<FieldValue> {
    logger.prefix().get(1).and_then(|f| f.as_static().cloned())
}

#[test]
fn test_set_global_keeps_shared_output_open() {
    let _guard = GLOBAL_LOCK.lock();

    let (backend, logger) = counted_logger("shared");
    global::set_global(logger);

    global::set_global(global::get_global().copy());
    global::set_global(global::ctx(Context::background()));
    assert_eq!(backend.closes.load(Ordering::SeqCst), 0);

    global::info("still open", &[]);
    assert_eq!(backend.logs.load(Ordering::SeqCst), 1);

    let (_, replacement) = counted_logger("replacement");
    global::set_global(replacement);
    assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_set_global_closes_each_replaced_logger_once() {
    let _guard = GLOBAL_LOCK.lock();

    let (a, logger_a) = counted_logger("a");
    global::set_global(logger_a);

    let (b, logger_b) = counted_logger("b");
    let (c, logger_c) = counted_logger("c");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [logger_b, logger_c]
        .into_iter()
        .map(|logger| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                global::set_global(logger);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("setter panicked");
    }

    let current = service_of(&global::get_global());
    assert_eq!(a.closes.load(Ordering::SeqCst), 1);
    match current.as_ref().and_then(FieldValue::as_str) {
        Some("b") => {
            assert_eq!(c.closes.load(Ordering::SeqCst), 1);
            assert_eq!(b.closes.load(Ordering::SeqCst), 0);
        }
        Some("c") => {
            assert_eq!(b.closes.load(Ordering::SeqCst), 1);
            assert_eq!(c.closes.load(Ordering::SeqCst), 0);
        }
        other => panic!("unexpected global logger: {:?}", other),
    }
}

#[test]
fn test_readers_never_see_a_replaced_logger_after_swap() {
    let _guard = GLOBAL_LOCK.lock();

    let (_, initial) = counted_logger("initial");
    global::set_global(initial);

    let stop = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let stop = Arc::clone(&stop);
            let observed = Arc::clone(&observed);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let logger = global::get_global();
                    assert!(service_of(&logger).is_some());
                    global::info("reader tick", &[]);
                    observed.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for round in 0..50 {
        let name = format!("gen-{}", round);
        let (_, logger) = counted_logger(&name);
        global::set_global(logger);
        // once set_global returns, the previous value is unreachable
        assert_eq!(
            service_of(&global::get_global()),
            Some(FieldValue::from(name.as_str()))
        );
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().expect("reader panicked");
    }
    assert!(observed.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_global_ctx_copies_bind_context() {
    let _guard = GLOBAL_LOCK.lock();

    let (backend, logger) = counted_logger("ctx");
    global::set_global(logger);

    let span = SpanContext::new(TraceId::from_bytes([3; 16]), SpanId::from_bytes([4; 8]));
    let bound = global::copy_global_with_context(Context::background().with_span_context(span));
    assert_eq!(bound.context().span_context(), Some(&span));
    assert!(global::copy().context().span_context().is_none());

    bound.info("bound", &[]);
    global::warn("free function", &kv!["k", 1]);
    global::infof(format_args!("formatted {}", 2));
    assert_eq!(backend.logs.load(Ordering::SeqCst), 3);
}

#[test]
fn test_fallback_trace_ids_unique_across_threads() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 2_000;

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            thread::spawn(|| {
                (0..PER_THREAD)
                    .map(|_| snowflake_trace_id().to_string())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::with_capacity(THREADS * PER_THREAD);
    for handle in handles {
        for id in handle.join().expect("generator thread panicked") {
            assert_eq!(id.len(), 32);
            assert!(seen.insert(id), "duplicate trace id");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
}

#[test]
fn test_concurrent_logging_to_file() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("concurrent.log");

    let logger = Logger::builder("stress")
        .console(false)
        .file_writer(&log_file, RotationPolicy::default())
        .build()
        .unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let span = SpanContext::new(
                TraceId::from_bytes([t as u8 + 1; 16]),
                SpanId::from_bytes([1; 8]),
            );
            let logger = logger.ctx(Context::background().with_span_context(span));
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    logger.info("work", &kv!["thread", t, "i", i]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("logging thread panicked");
    }
    logger.close().unwrap();

    let content = std::fs::read_to_string(&log_file).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).expect("interleaved write"))
        .collect();
    assert_eq!(lines.len(), THREADS * PER_THREAD);

    // every line carries the trace id of the thread that wrote it
    for line in &lines {
        let t = line["thread"].as_u64().unwrap() as u8;
        assert_eq!(line["trace_id"], hex_repeat(t + 1, 16));
    }
}

#[test]
fn test_exporter_under_concurrent_load() {
    #[derive(Default)]
    struct CountingSink {
        entries: AtomicUsize,
    }

    impl Sink for CountingSink {
        fn send(&self, _: &Context, _: LogEntry) -> Result<()> {
            Ok(())
        }

        fn send_batch(&self, _: &Context, entries: Vec<LogEntry>) -> Result<()> {
            self.entries.fetch_add(entries.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    let sink = Arc::new(CountingSink::default());
    let logger = Logger::builder("stress")
        .console(false)
        .default_valuers(false)
        .exporter(sink.clone())
        .build()
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = logger.copy();
            thread::spawn(move || {
                for i in 0..500 {
                    logger.info("exported", &kv!["t", t, "i", i]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.close().unwrap();

    let metrics = logger.exporter().unwrap().metrics();
    let delivered = sink.entries.load(Ordering::SeqCst) as u64;
    assert_eq!(delivered, metrics.sent_count());
    assert_eq!(delivered + metrics.dropped_count(), 2_000);
}

fn hex_repeat(byte: u8, n: usize) -> String {
    format!("{:02x}", byte).repeat(n)
}
