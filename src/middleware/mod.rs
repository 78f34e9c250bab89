//! axum middleware
//!
//! [`trace`] establishes the request's trace context and binds a
//! context-scoped [`Logger`] into the request extensions; [`access_log`]
//! emits one line per request once the handler chain has finished. They
//! are independent layers; put `trace` outside `access_log` so the access
//! line carries the request's trace id.
//!
//! ```no_run
//! use axum::{middleware, routing::get, Router};
//! use rust_trace_logger::middleware::{access_log, trace};
//! use rust_trace_logger::Logger;
//!
//! async fn handler(logger: Logger) -> &'static str {
//!     logger.info("handling", &[]);
//!     "ok"
//! }
//!
//! let app: Router = Router::new()
//!     .route("/", get(handler))
//!     .layer(middleware::from_fn(access_log))
//!     .layer(middleware::from_fn(trace));
//! ```

mod access_log;
mod trace;

pub use access_log::{access_log, access_log_with_config, AccessLogConfig, DEFAULT_MAX_BODY_BYTES};
pub use trace::{trace, trace_with_logger};

use crate::core::{Context, Logger};
use crate::global;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, IntoResponseParts, Response, ResponseParts};
use std::convert::Infallible;
use std::fmt;

/// Errors a handler attaches to its response; the access log prints them
/// for responses with status >= 400
///
/// ```
/// use axum::http::StatusCode;
/// use rust_trace_logger::middleware::HandlerErrors;
///
/// async fn handler() -> (StatusCode, HandlerErrors, &'static str) {
///     (StatusCode::BAD_GATEWAY, HandlerErrors::from("upstream timed out"), "retry later")
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerErrors(Vec<String>);

impl HandlerErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl fmt::Display) {
        self.0.push(error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for HandlerErrors {
    fn from(error: &str) -> Self {
        Self(vec![error.to_string()])
    }
}

impl From<String> for HandlerErrors {
    fn from(error: String) -> Self {
        Self(vec![error])
    }
}

/// One numbered line per error
impl fmt::Display for HandlerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            writeln!(f, "Error #{:02}: {}", i + 1, error)?;
        }
        Ok(())
    }
}

impl IntoResponseParts for HandlerErrors {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

impl IntoResponse for HandlerErrors {
    fn into_response(self) -> Response {
        (self, ()).into_response()
    }
}

/// The logger bound by [`trace`]; a copy of the global logger when the
/// trace middleware did not run
impl<S: Send + Sync> FromRequestParts<S> for Logger {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(request_logger(parts))
    }
}

/// The context bound by [`trace`]; the background context otherwise
impl<S: Send + Sync> FromRequestParts<S> for Context {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Context>()
            .cloned()
            .unwrap_or_default())
    }
}

fn request_logger(parts: &Parts) -> Logger {
    parts
        .extensions
        .get::<Logger>()
        .cloned()
        .unwrap_or_else(global::copy)
}
