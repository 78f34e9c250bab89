//! Fallback trace identifiers
//!
//! Used by the middleware when no [`Tracer`](super::Tracer) is installed. The
//! high 8 bytes of a trace id are a Snowflake-style
//! `(timestamp << 22) | (node << 12) | counter` value, big-endian; the low 8
//! bytes are random.

use super::{SpanContext, SpanId, TraceId};
use chrono::Utc;
use parking_lot::Mutex;

/// 2025-03-18T00:00:00Z in Unix milliseconds
pub const EPOCH_MILLIS: i64 = 1_742_256_000_000;

pub const NODE_ID: i64 = 1;

const NODE_SHIFT: u32 = 12;
const TIMESTAMP_SHIFT: u32 = 22;
const COUNTER_MASK: i64 = 0xfff;
const NODE_MASK: i64 = 0x3ff;

#[derive(Debug)]
struct State {
    last_stamp: i64,
    counter: i64,
}

/// Monotonic time-plus-counter id source; all state sits behind one mutex
#[derive(Debug)]
pub struct SnowflakeGenerator {
    node_id: i64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub const fn new(node_id: i64) -> Self {
        Self {
            node_id: node_id & NODE_MASK,
            state: parking_lot::const_mutex(State {
                last_stamp: -1,
                counter: 0,
            }),
        }
    }

    /// Next id for the current wall clock
    pub fn next_id(&self) -> i64 {
        self.next_id_at(Utc::now().timestamp_millis())
    }

    /// Next id as if the clock read `unix_millis`
    pub fn next_id_at(&self, unix_millis: i64) -> i64 {
        let now = unix_millis - EPOCH_MILLIS;
        let mut state = self.state.lock();
        if now == state.last_stamp {
            state.counter = (state.counter + 1) & COUNTER_MASK;
        } else {
            state.counter = 0;
            state.last_stamp = now;
        }
        (now << TIMESTAMP_SHIFT) | (self.node_id << NODE_SHIFT) | state.counter
    }

    pub fn next_trace_id(&self) -> TraceId {
        compose_trace_id(self.next_id())
    }

    pub fn trace_id_at(&self, unix_millis: i64) -> TraceId {
        compose_trace_id(self.next_id_at(unix_millis))
    }
}

/// Counter component of a generated id
pub const fn counter_of(id: i64) -> i64 {
    id & COUNTER_MASK
}

/// Node component of a generated id
pub const fn node_of(id: i64) -> i64 {
    (id >> NODE_SHIFT) & NODE_MASK
}

/// Epoch-relative millisecond component of a generated id
pub const fn timestamp_of(id: i64) -> i64 {
    id >> TIMESTAMP_SHIFT
}

fn compose_trace_id(id: i64) -> TraceId {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&id.to_be_bytes());
    let tail: [u8; 8] = rand::random();
    bytes[8..].copy_from_slice(&tail);
    TraceId::from_bytes(bytes)
}

static GENERATOR: SnowflakeGenerator = SnowflakeGenerator::new(NODE_ID);

/// Trace id from the process-wide generator
pub fn snowflake_trace_id() -> TraceId {
    GENERATOR.next_trace_id()
}

/// Eight random bytes; never the all-zero id
pub fn random_span_id() -> SpanId {
    loop {
        let id = SpanId::from_bytes(rand::random());
        if id.is_valid() {
            return id;
        }
    }
}

/// Span context for a request with no active tracer: an inbound trace id is
/// kept, otherwise a Snowflake one is generated. The span id is always new.
pub fn fallback_span_context(parent: Option<&SpanContext>) -> SpanContext {
    let trace_id = parent
        .map(SpanContext::trace_id)
        .filter(TraceId::is_valid)
        .unwrap_or_else(snowflake_trace_id);
    SpanContext::new(trace_id, random_span_id())
}
