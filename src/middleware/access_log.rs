use super::{request_logger, HandlerErrors};
use crate::core::KeyValues;
use crate::kv;
use axum::body::{Body, HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::time::Instant;

/// Largest request body the access log buffers, matching axum's
/// `DefaultBodyLimit`
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const UNREADABLE_BODY: &str = "<unreadable>";

/// Options for [`access_log_with_config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessLogConfig {
    max_body_bytes: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AccessLogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bodies declaring a larger size are passed on unbuffered and logged
    /// as omitted
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

/// Emit one `Request` line per request after the handler chain completes
///
/// Request bodies up to [`DEFAULT_MAX_BODY_BYTES`] are buffered and handed
/// on unchanged. Responses with status >= 400 are logged at Error level
/// together with any [`HandlerErrors`] the handler attached; everything
/// else at Info. The line goes through the logger bound by
/// [`trace`](super::trace) when that layer ran first, or a copy of the
/// global logger.
pub async fn access_log(req: Request, next: Next) -> Response {
    run(AccessLogConfig::default(), req, next).await
}

/// [`access_log`] with an explicit body cap
///
/// ```no_run
/// use axum::{middleware, routing::post, Router};
/// use rust_trace_logger::middleware::{access_log_with_config, AccessLogConfig};
///
/// let app: Router = Router::new()
///     .route("/upload", post(|| async { "ok" }))
///     .layer(middleware::from_fn_with_state(
///         AccessLogConfig::new().with_max_body_bytes(64 * 1024),
///         access_log_with_config,
///     ));
/// ```
pub async fn access_log_with_config(
    State(config): State<AccessLogConfig>,
    req: Request,
    next: Next,
) -> Response {
    run(config, req, next).await
}

async fn run(config: AccessLogConfig, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let logger = request_logger(&parts);

    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let req_headers = headers_json(&parts.headers);
    let ip = client_ip(&parts);

    let (req_body, response) = match declared_length(&parts, &body) {
        Some(len) if len > config.max_body_bytes as u64 => {
            let response = next.run(Request::from_parts(parts, body)).await;
            (format!("<omitted: {} bytes>", len), response)
        }
        _ => match axum::body::to_bytes(body, config.max_body_bytes).await {
            Ok(bytes) => {
                let req_body = String::from_utf8_lossy(&bytes).into_owned();
                let response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
                (req_body, response)
            }
            Err(e) => {
                let errors = HandlerErrors::from(format!("failed to read request body: {}", e));
                let response =
                    (StatusCode::BAD_REQUEST, errors, "invalid request body").into_response();
                (UNREADABLE_BODY.to_string(), response)
            }
        },
    };

    let latency = format!("{:.2}ms", started.elapsed().as_micros() as f64 / 1000.0);
    let status = response.status().as_u16();
    let mut fields: KeyValues = kv![
        "status",
        status,
        "method",
        method,
        "path",
        path,
        "latency",
        latency,
        "req_headers",
        req_headers,
        "ip",
        ip,
        "req_body",
        req_body,
    ];

    if status >= 400 {
        let errors = response
            .extensions()
            .get::<HandlerErrors>()
            .map(ToString::to_string)
            .unwrap_or_default();
        fields.extend(kv!["error", errors]);
        logger.error("Request", &fields);
    } else {
        logger.info("Request", &fields);
    }
    response
}

/// Exact body size when the body or `Content-Length` declares one
fn declared_length(parts: &Parts, body: &Body) -> Option<u64> {
    body.size_hint().exact().or_else(|| {
        parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

/// Header name to every value sent under it
fn headers_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        map.insert(name.as_str().to_string(), Value::Array(values));
    }
    Value::Object(map)
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address
/// when the server was started with connect info
fn client_ip(parts: &Parts) -> String {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(real) = header("x-real-ip") {
        return real.to_string();
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/x");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_client_ip_precedence() {
        let p = parts(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2"), ("x-real-ip", "10.9.9.9")]);
        assert_eq!(client_ip(&p), "10.0.0.1");

        let p = parts(&[("x-real-ip", "10.9.9.9")]);
        assert_eq!(client_ip(&p), "10.9.9.9");

        let mut p = parts(&[]);
        assert_eq!(client_ip(&p), "");
        p.extensions
            .insert(ConnectInfo("127.0.0.1:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&p), "127.0.0.1");
    }

    #[test]
    fn test_headers_json_keeps_repeated_values() {
        let p = parts(&[("accept", "a"), ("accept", "b"), ("x-id", "1")]);
        let json = headers_json(&p.headers);
        assert_eq!(json["accept"], serde_json::json!(["a", "b"]));
        assert_eq!(json["x-id"], serde_json::json!(["1"]));
    }

    #[test]
    fn test_declared_length_prefers_body_hint() {
        let p = parts(&[("content-length", "99")]);
        assert_eq!(declared_length(&p, &Body::from("four")), Some(4));
        assert_eq!(declared_length(&p, &Body::empty()), Some(0));
    }

    #[test]
    fn test_config_defaults_to_axum_body_limit() {
        assert_eq!(AccessLogConfig::default().max_body_bytes(), 2 * 1024 * 1024);
        assert_eq!(AccessLogConfig::new().with_max_body_bytes(10).max_body_bytes(), 10);
    }
}
