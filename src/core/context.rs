//! Request context that deferred values are resolved against
//!
//! A [`Context`] is cheap to clone: the span context is `Copy`, the caller
//! location is a `'static` reference and request values sit behind an `Arc`.

use super::field::FieldValue;
use crate::trace::SpanContext;
use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Context {
    span: Option<SpanContext>,
    caller: Option<&'static Location<'static>>,
    values: Option<Arc<HashMap<String, FieldValue>>>,
}

impl Context {
    /// Empty context: no span, no caller, no values
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_span_context(mut self, span: SpanContext) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.span.as_ref()
    }

    /// Bind the source location of the log call being resolved
    #[must_use]
    pub fn with_caller(mut self, caller: &'static Location<'static>) -> Self {
        self.caller = Some(caller);
        self
    }

    #[must_use]
    pub fn caller(&self) -> Option<&'static Location<'static>> {
        self.caller
    }

    /// Attach a request-scoped value; earlier clones are not affected
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let mut values = self
            .values
            .as_deref()
            .cloned()
            .unwrap_or_default();
        values.insert(key.into(), value.into());
        self.values = Some(Arc::new(values));
        self
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.as_ref().and_then(|values| values.get(key))
    }
}
