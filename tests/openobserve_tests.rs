//! OpenObserve sink against a local HTTP listener

#![cfg(feature = "openobserve")]

use parking_lot::Mutex;
use rust_trace_logger::prelude::*;
use rust_trace_logger::sink::{OpenObserveConfig, OpenObserveSink};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Captured {
    path: String,
    authorization: Option<String>,
    body: Value,
}

/// Serve until the test ends, answering every request with `status`
fn spawn_collector(status: u16) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind collector");
    let addr = listener.local_addr().unwrap().to_string();
    let captured = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&captured);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            if let Some(request) = read_request(&stream) {
                sink.lock().push(request);
            }
            let mut stream = stream;
            let reply = format!(
                "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            let _ = stream.write_all(reply.as_bytes());
        }
    });
    (addr, captured)
}

fn read_request(stream: &TcpStream) -> Option<Captured> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let path = request_line.split_whitespace().nth(1)?.to_string();

    let mut content_length = 0usize;
    let mut authorization = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        match name.to_ascii_lowercase().as_str() {
            "content-length" => content_length = value.trim().parse().ok()?,
            "authorization" => authorization = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(Captured {
        path,
        authorization,
        body: serde_json::from_slice(&body).ok()?,
    })
}

fn entry(service: &str, message: &str) -> LogEntry {
    let mut entry = LogEntry::new();
    entry.insert("service", service);
    entry.insert("message", message);
    entry
}

fn sink_for(addr: &str) -> OpenObserveSink {
    let config = OpenObserveConfig::new(addr, "ingest@example.com", "secret")
        .with_scheme("http")
        .with_timeout(Duration::from_secs(5));
    OpenObserveSink::new(config).expect("Failed to create sink")
}

#[test]
fn test_single_and_batched_delivery() {
    let (addr, captured) = spawn_collector(200);
    let sink = sink_for(&addr);
    let ctx = Context::background();

    sink.send(&ctx, entry("billing", "one")).unwrap();
    sink.send_batch(
        &ctx,
        vec![entry("billing", "two"), entry("auth", "three"), entry("billing", "four")],
    )
    .unwrap();
    assert!(sink.shutdown(Duration::from_secs(10)));

    let requests = captured.lock();
    assert_eq!(requests.len(), 3);

    assert_eq!(requests[0].path, "/api/default/billing/_json");
    assert_eq!(requests[0].body["message"], "one");
    let auth = requests[0].authorization.as_deref().unwrap();
    assert!(auth.starts_with("Basic "));

    // batches are grouped per stream, streams in name order
    assert_eq!(requests[1].path, "/api/default/auth/_json");
    assert_eq!(requests[1].body, serde_json::json!([{"service": "auth", "message": "three"}]));
    assert_eq!(requests[2].path, "/api/default/billing/_json");
    assert_eq!(requests[2].body.as_array().map(Vec::len), Some(2));

    assert_eq!(sink.metrics().sent_count(), 4);
    assert_eq!(sink.metrics().failed_count(), 0);
}

#[test]
fn test_rejected_delivery_is_counted() {
    let (addr, captured) = spawn_collector(500);
    let sink = sink_for(&addr);

    sink.send(&Context::background(), entry("svc", "lost")).unwrap();
    assert!(sink.shutdown(Duration::from_secs(10)));

    assert_eq!(captured.lock().len(), 1);
    assert_eq!(sink.metrics().sent_count(), 0);
    assert_eq!(sink.metrics().failed_count(), 1);
}

#[test]
fn test_send_after_shutdown_is_refused() {
    let (addr, _) = spawn_collector(200);
    let sink = sink_for(&addr);
    assert!(sink.shutdown(Duration::from_secs(10)));

    let err = sink.send(&Context::background(), entry("svc", "late")).unwrap_err();
    assert!(matches!(err, LoggerError::WorkerStopped));
    assert_eq!(sink.metrics().dropped_count(), 1);
}

#[test]
fn test_missing_stream_field_uses_default_stream() {
    let (addr, captured) = spawn_collector(200);
    let sink = sink_for(&addr);

    let mut anonymous = LogEntry::new();
    anonymous.insert("message", "no service");
    sink.send(&Context::background(), anonymous).unwrap();
    assert!(sink.shutdown(Duration::from_secs(10)));

    assert_eq!(captured.lock()[0].path, "/api/default/default/_json");
}

#[test]
fn test_prod_logger_mirrors_failures_to_collector() {
    struct Broken;

    impl Backend for Broken {
        fn log(&self, _: Level, _: &str, _: &[FieldValue]) -> Result<LogEntry> {
            Err(LoggerError::writer("backend down"))
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    let (addr, captured) = spawn_collector(200);
    let sink = Arc::new(sink_for(&addr));
    let logger = Logger::builder("payments")
        .mode(Mode::Prod)
        .default_valuers(false)
        .backend(Arc::new(Broken))
        .sink(sink.clone())
        .build()
        .unwrap();

    logger.error("charge failed", &kv!["amount", 1250]);
    assert!(sink.shutdown(Duration::from_secs(10)));

    let requests = captured.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/default/payments/_json");
    assert_eq!(requests[0].body["amount"], 1250);
    assert_eq!(requests[0].body["message"], "charge failed");
    assert_eq!(requests[0].body["level"], "ERROR");
}
