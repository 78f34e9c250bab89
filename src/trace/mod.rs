//! Trace correlation
//!
//! Identifiers and span contexts that log lines carry, the narrow tracer
//! capability this crate consumes, W3C header propagation and the fallback
//! generator used when no tracer is installed.

pub mod propagation;
pub mod snowflake;

use crate::core::{Context, FieldValue, Valuer};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

pub use propagation::{extract, inject, Carrier, TRACEPARENT_HEADER};
pub use snowflake::{fallback_span_context, random_span_id, snowflake_trace_id, SnowflakeGenerator};

/// 16-byte trace identifier, rendered as 32 lowercase hex characters
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId([u8; 16]);

impl TraceId {
    pub const INVALID: TraceId = TraceId([0; 16]);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0; 16]
    }

    /// Parse exactly 32 hex characters
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self)
    }
}

/// 8-byte span identifier, rendered as 16 lowercase hex characters
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpanId([u8; 8]);

impl SpanId {
    pub const INVALID: SpanId = SpanId([0; 8]);

    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; 8] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != [0; 8]
    }

    /// Parse exactly 16 hex characters
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

/// Sampled bit of the W3C trace flags
pub const FLAG_SAMPLED: u8 = 0x01;

/// Immutable trace/span pair plus flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: u8,
    remote: bool,
}

impl SpanContext {
    /// A local, sampled span context
    pub const fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            trace_flags: FLAG_SAMPLED,
            remote: false,
        }
    }

    #[must_use]
    pub const fn with_trace_flags(mut self, flags: u8) -> Self {
        self.trace_flags = flags;
        self
    }

    /// Mark as received from another process
    #[must_use]
    pub const fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub const fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub const fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub const fn trace_flags(&self) -> u8 {
        self.trace_flags
    }

    pub const fn is_sampled(&self) -> bool {
        self.trace_flags & FLAG_SAMPLED != 0
    }

    pub const fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

/// An in-progress span started by a [`Tracer`]
pub trait Span: Send {
    fn span_context(&self) -> SpanContext;
    fn end(&mut self);
}

/// The tracing capability consumed by the middleware
pub trait Tracer: Send + Sync {
    /// Start a span named `name`, a child of `parent` when given
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Box<dyn Span>;
}

static TRACER: RwLock<Option<Arc<dyn Tracer>>> = parking_lot::const_rwlock(None);

/// Install the process-wide tracer; the middleware starts spans with it
/// instead of synthesizing identifiers.
pub fn install_tracer(tracer: Arc<dyn Tracer>) {
    *TRACER.write() = Some(tracer);
}

/// Remove the installed tracer, returning it
pub fn uninstall_tracer() -> Option<Arc<dyn Tracer>> {
    TRACER.write().take()
}

pub fn active_tracer() -> Option<Arc<dyn Tracer>> {
    TRACER.read().clone()
}

/// Valuer for the bound trace id; empty when the context carries no valid span
pub fn trace_id() -> Valuer {
    Valuer::new(|ctx: &Context| {
        FieldValue::String(
            ctx.span_context()
                .filter(|span| span.trace_id().is_valid())
                .map(|span| span.trace_id().to_string())
                .unwrap_or_default(),
        )
    })
}

/// Valuer for the bound span id; empty when the context carries no valid span
pub fn span_id() -> Valuer {
    Valuer::new(|ctx: &Context| {
        FieldValue::String(
            ctx.span_context()
                .filter(|span| span.span_id().is_valid())
                .map(|span| span.span_id().to_string())
                .unwrap_or_default(),
        )
    })
}
