use crate::core::{Context, Logger};
use crate::global;
use crate::trace::{active_tracer, extract, fallback_span_context, inject, Span, SpanContext};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

/// Establish the request's trace context and bind a copy of the global
/// logger to it
///
/// The inbound `traceparent` header is extracted when present. With an
/// installed tracer a span named after the request path is started and
/// ended once the response is produced; otherwise a span context is
/// synthesized (see [`fallback_span_context`]). The context and the bound
/// logger are stored in the request extensions, and the context is
/// written back as the response's `traceparent` header.
pub async fn trace(req: Request, next: Next) -> Response {
    let logger = global::get_global();
    run(&logger, req, next).await
}

/// [`trace`] with an explicit logger instead of the global one
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use rust_trace_logger::middleware::trace_with_logger;
/// use rust_trace_logger::Logger;
///
/// let logger = Logger::new("orders");
/// let app: Router = Router::new()
///     .route("/", get(|| async { "ok" }))
///     .layer(middleware::from_fn_with_state(logger, trace_with_logger));
/// ```
pub async fn trace_with_logger(State(logger): State<Logger>, req: Request, next: Next) -> Response {
    run(&logger, req, next).await
}

async fn run(logger: &Logger, mut req: Request, next: Next) -> Response {
    let (span_ctx, mut span) = begin(&req);

    let ctx = Context::background().with_span_context(span_ctx);
    let bound = logger.ctx(ctx.clone());
    req.extensions_mut().insert(ctx);
    req.extensions_mut().insert(bound);

    let mut response = next.run(req).await;
    inject(&span_ctx, response.headers_mut());

    if let Some(ref mut span) = span {
        span.end();
    }
    response
}

fn begin(req: &Request) -> (SpanContext, Option<Box<dyn Span>>) {
    let parent = extract(req.headers());
    match active_tracer() {
        Some(tracer) => {
            let span = tracer.start_span(req.uri().path(), parent.as_ref());
            (span.span_context(), Some(span))
        }
        None => (fallback_span_context(parent.as_ref()), None),
    }
}
