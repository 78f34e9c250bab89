//! W3C `traceparent` header propagation
//!
//! Format: `{version}-{trace_id}-{span_id}-{flags}`, e.g.
//! `00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01`.

use super::{SpanContext, SpanId, TraceId};
use std::collections::HashMap;

pub const TRACEPARENT_HEADER: &str = "traceparent";

const SUPPORTED_VERSION: &str = "00";

/// String header storage that trace context is read from and written to
pub trait Carrier {
    fn get(&self, key: &str) -> Option<&str>;
    fn set(&mut self, key: &str, value: String);
}

impl Carrier for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

#[cfg(feature = "middleware")]
impl Carrier for axum::http::HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        axum::http::HeaderMap::get(self, key).and_then(|v| v.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let name = axum::http::HeaderName::from_bytes(key.as_bytes());
        let value = axum::http::HeaderValue::from_str(&value);
        if let (Ok(name), Ok(value)) = (name, value) {
            self.insert(name, value);
        }
    }
}

pub fn format_traceparent(span: &SpanContext) -> String {
    format!(
        "{}-{}-{}-{:02x}",
        SUPPORTED_VERSION,
        span.trace_id(),
        span.span_id(),
        span.trace_flags()
    )
}

/// Parse a `traceparent` value; all-zero identifiers and version `ff` are
/// rejected.
pub fn parse_traceparent(header: &str) -> Option<SpanContext> {
    let parts: Vec<&str> = header.trim().split('-').collect();
    if parts.len() < 4 {
        return None;
    }

    let version = parts[0];
    if version.len() != 2 || version.eq_ignore_ascii_case("ff") {
        return None;
    }
    // Only version 00 has a fixed field count.
    if version == SUPPORTED_VERSION && parts.len() != 4 {
        return None;
    }

    let trace_id = TraceId::from_hex(parts[1])?;
    let span_id = SpanId::from_hex(parts[2])?;
    let mut flags = [0u8; 1];
    hex::decode_to_slice(parts[3], &mut flags).ok()?;

    let span = SpanContext::new(trace_id, span_id)
        .with_trace_flags(flags[0])
        .with_remote(true);
    span.is_valid().then_some(span)
}

/// Read an inbound span context from `carrier`
pub fn extract<C: Carrier + ?Sized>(carrier: &C) -> Option<SpanContext> {
    carrier.get(TRACEPARENT_HEADER).and_then(parse_traceparent)
}

/// Write `span` into `carrier`; invalid contexts are not written
pub fn inject<C: Carrier + ?Sized>(span: &SpanContext, carrier: &mut C) {
    if span.is_valid() {
        carrier.set(TRACEPARENT_HEADER, format_traceparent(span));
    }
}
