//! Deferred field values and key/value sequences
//!
//! A field sequence alternates keys and values. Any value position may hold a
//! [`Valuer`], a function of the bound [`Context`] that is evaluated when the
//! record is emitted, never when the field is registered.

use super::context::Context;
use super::field::FieldValue;
use super::timestamp::TimestampFormat;
use chrono::Utc;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

type ValuerFn = dyn Fn(&Context) -> FieldValue + Send + Sync;

/// A value computed from the bound context at emit time
#[derive(Clone)]
pub struct Valuer(Arc<ValuerFn>);

impl Valuer {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context) -> FieldValue + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    #[inline]
    pub fn resolve(&self, ctx: &Context) -> FieldValue {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Valuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Valuer(..)")
    }
}

/// One element of a key/value sequence
#[derive(Debug, Clone)]
pub enum Field {
    Static(FieldValue),
    Deferred(Valuer),
}

/// Ordered, alternating key/value sequence
pub type KeyValues = Vec<Field>;

impl Field {
    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Field::Deferred(_))
    }

    /// The concrete value, invoking a valuer against `ctx` if needed
    pub fn resolve(&self, ctx: &Context) -> FieldValue {
        match self {
            Field::Static(v) => v.clone(),
            Field::Deferred(valuer) => valuer.resolve(ctx),
        }
    }

    /// Consuming form of [`Field::resolve`]
    pub fn into_value(self, ctx: &Context) -> FieldValue {
        match self {
            Field::Static(v) => v,
            Field::Deferred(valuer) => valuer.resolve(ctx),
        }
    }

    #[must_use]
    pub fn as_static(&self) -> Option<&FieldValue> {
        match self {
            Field::Static(v) => Some(v),
            Field::Deferred(_) => None,
        }
    }
}

impl From<Valuer> for Field {
    fn from(valuer: Valuer) -> Self {
        Field::Deferred(valuer)
    }
}

impl From<FieldValue> for Field {
    fn from(v: FieldValue) -> Self {
        Field::Static(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for Field {
    fn from(v: Option<T>) -> Self {
        Field::Static(FieldValue::from(v))
    }
}

macro_rules! impl_static_field {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Field {
                fn from(v: $t) -> Self {
                    Field::Static(FieldValue::from(v))
                }
            }
        )*
    };
}

impl_static_field!(
    i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, bool, String, serde_json::Value
);

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::Static(FieldValue::from(s))
    }
}

impl From<&String> for Field {
    fn from(s: &String) -> Self {
        Field::Static(FieldValue::from(s))
    }
}

/// Resolve `candidate` against `ctx`: valuers are invoked, anything else is
/// returned unchanged
pub fn value(ctx: &Context, candidate: &Field) -> FieldValue {
    candidate.resolve(ctx)
}

/// Whether any value position (odd index) holds a valuer
pub fn contains_valuer(keyvals: &[Field]) -> bool {
    keyvals.iter().skip(1).step_by(2).any(Field::is_deferred)
}

/// Replace every valuer at a value position with its resolution
pub fn bind_values(ctx: &Context, keyvals: &mut [Field]) {
    for field in keyvals.iter_mut().skip(1).step_by(2) {
        if let Field::Deferred(valuer) = field {
            *field = Field::Static(valuer.resolve(ctx));
        }
    }
}

/// Emission time in the given format
pub fn timestamp(format: TimestampFormat) -> Valuer {
    Valuer::new(move |_| format.to_field_value(&Utc::now()))
}

/// Emission time as RFC 3339 with second precision
pub fn default_timestamp() -> Valuer {
    timestamp(TimestampFormat::default())
}

/// Call site bound into the context, as `dir/file.rs:line`
pub fn caller() -> Valuer {
    Valuer::new(|ctx| {
        ctx.caller()
            .map_or(FieldValue::Null, |loc| FieldValue::String(short_location(loc)))
    })
}

/// A fixed value from the context's request-scoped data
pub fn context_value(key: impl Into<String>) -> Valuer {
    let key = key.into();
    Valuer::new(move |ctx| ctx.value(&key).cloned().unwrap_or(FieldValue::Null))
}

fn short_location(loc: &Location<'_>) -> String {
    let file = loc.file();
    let mut parts = file.rsplitn(3, ['/', '\\']);
    let name = parts.next().unwrap_or(file);
    match parts.next() {
        Some(dir) if !dir.is_empty() => format!("{}/{}:{}", dir, name, loc.line()),
        _ => format!("{}:{}", name, loc.line()),
    }
}
