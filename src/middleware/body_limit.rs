//! Per-route request-size caps, enforced before any body is buffered.
//!
//! A declared Content-Length over the cap is rejected immediately with
//! 413 `{detail: "Request body too large"}`. Chunked bodies are bounded by
//! the route group's `DefaultBodyLimit` layer; its 413 is rewritten to the
//! same body shape here.

use axum::{
    body::Body,
    http::{header::CONTENT_LENGTH, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AuthError;

/// Build a body-limit middleware for one route group.
///
/// Compose with `DefaultBodyLimit::max(limit)` on the same group so bodies
/// without a declared length are bounded while streaming.
pub fn limit_middleware(
    limit: usize,
) -> impl Fn(
    Request<Body>,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send
       + 'static {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            if let Some(length) = request
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.parse::<usize>().ok())
            {
                if length > limit {
                    tracing::warn!(length, limit, "request_body_too_large");
                    return AuthError::RequestEntityTooLarge.into_response();
                }
            }

            let response = next.run(request).await;

            // Streaming overflow caught downstream: normalize the body.
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                return AuthError::RequestEntityTooLarge.into_response();
            }

            response
        })
    }
}
