//! Request-context extraction: correlation id, caller metadata, and the
//! operational intent headers.
//!
//! Runs early on every route and inserts a [`RequestContext`] into request
//! extensions; handlers and services read it from there rather than from
//! framework state. Invalid enum header values fall back to documented
//! defaults with a warning.

use axum::{
    body::Body,
    http::{header::USER_AGENT, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::models::intent::{Criticality, OperationIntent, RequestIntent, SessionMode};
use crate::models::RequestContext;

const HEADER_OPERATION_INTENT: &str = "x-operation-intent";
const HEADER_SESSION_MODE: &str = "x-session-mode";
const HEADER_REQUEST_PURPOSE: &str = "x-request-purpose";
const HEADER_BATCH_ID: &str = "x-batch-id";
const HEADER_IS_TEST: &str = "x-is-test";
const HEADER_CRITICALITY: &str = "x-criticality";
const HEADER_CLIENT_TYPE: &str = "x-client-type";
const HEADER_IDEMPOTENCY_KEY: &str = "idempotency-key";
const HEADER_REQUEST_ID: &str = "x-request-id";
const HEADER_SESSION_ID: &str = "x-session-id";
const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Build the intent from headers, warning on invalid enum values
pub fn extract_intent(headers: &HeaderMap, path: &str) -> RequestIntent {
    let operation_intent = match header_str(headers, HEADER_OPERATION_INTENT) {
        Some(raw) => {
            let lowered = raw.to_lowercase();
            OperationIntent::parse(&lowered).unwrap_or_else(|| {
                tracing::warn!(operation_intent = %raw, path, "invalid_operation_intent");
                OperationIntent::default()
            })
        }
        None => OperationIntent::default(),
    };

    let session_mode = match header_str(headers, HEADER_SESSION_MODE) {
        Some(raw) => {
            let lowered = raw.to_lowercase();
            SessionMode::parse(&lowered).unwrap_or_else(|| {
                tracing::warn!(session_mode = %raw, path, "invalid_session_mode");
                SessionMode::default()
            })
        }
        None => SessionMode::default(),
    };

    let criticality = match header_str(headers, HEADER_CRITICALITY) {
        Some(raw) => {
            let lowered = raw.to_lowercase();
            Criticality::parse(&lowered).unwrap_or_else(|| {
                tracing::warn!(criticality = %raw, path, "invalid_criticality");
                Criticality::default()
            })
        }
        None => Criticality::default(),
    };

    let is_test = header_str(headers, HEADER_IS_TEST)
        .map(|raw| raw.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    RequestIntent {
        operation_intent,
        session_mode,
        request_purpose: header_str(headers, HEADER_REQUEST_PURPOSE).map(String::from),
        batch_id: header_str(headers, HEADER_BATCH_ID).map(String::from),
        is_test,
        criticality,
        client_type: header_str(headers, HEADER_CLIENT_TYPE).map(String::from),
        idempotency_key: header_str(headers, HEADER_IDEMPOTENCY_KEY).map(String::from),
    }
}

/// Assemble the full request context from headers
pub fn extract_context(headers: &HeaderMap, path: &str) -> RequestContext {
    let request_id = header_str(headers, HEADER_REQUEST_ID)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(Uuid::new_v4);

    let ip_address = header_str(headers, HEADER_FORWARDED_FOR)
        .and_then(|raw| raw.split(',').next())
        .map(|ip| ip.trim().to_string());

    RequestContext {
        request_id,
        ip_address,
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(String::from),
        session_id: header_str(headers, HEADER_SESSION_ID).map(String::from),
        intent: extract_intent(headers, path),
    }
}

/// Middleware inserting [`RequestContext`] into request extensions
pub async fn intent_middleware(mut request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let ctx = extract_context(request.headers(), &path);

    if !ctx.intent.is_production() || ctx.intent.is_high_priority() {
        tracing::info!(
            path = %path,
            operation_intent = ctx.intent.operation_intent.as_str(),
            session_mode = ctx.intent.session_mode.as_str(),
            is_test = ctx.intent.is_test,
            criticality = ctx.intent.criticality.as_str(),
            batch_id = ?ctx.intent.batch_id,
            "request_intent_extracted"
        );
    }

    request.extensions_mut().insert(ctx);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_defaults_when_headers_absent() {
        let intent = extract_intent(&HeaderMap::new(), "/authorize");
        assert_eq!(intent.operation_intent, OperationIntent::Standard);
        assert_eq!(intent.session_mode, SessionMode::Interactive);
        assert_eq!(intent.criticality, Criticality::Standard);
        assert!(!intent.is_test);
    }

    #[test]
    fn test_valid_headers_parsed() {
        let map = headers(&[
            ("x-operation-intent", "migration"),
            ("x-session-mode", "batch"),
            ("x-criticality", "critical"),
            ("x-is-test", "true"),
            ("x-batch-id", "batch-42"),
            ("x-request-purpose", "backfill"),
        ]);
        let intent = extract_intent(&map, "/authorize");
        assert_eq!(intent.operation_intent, OperationIntent::Migration);
        assert_eq!(intent.session_mode, SessionMode::Batch);
        assert_eq!(intent.criticality, Criticality::Critical);
        assert!(intent.is_test);
        assert_eq!(intent.batch_id.as_deref(), Some("batch-42"));
        assert_eq!(intent.request_purpose.as_deref(), Some("backfill"));
    }

    #[test]
    fn test_invalid_enum_values_fall_back() {
        let map = headers(&[
            ("x-operation-intent", "nonsense"),
            ("x-session-mode", "bogus"),
            ("x-criticality", "urgent"),
        ]);
        let intent = extract_intent(&map, "/authorize");
        assert_eq!(intent.operation_intent, OperationIntent::Standard);
        assert_eq!(intent.session_mode, SessionMode::Interactive);
        assert_eq!(intent.criticality, Criticality::Standard);
    }

    #[test]
    fn test_header_values_are_case_insensitive() {
        let map = headers(&[("x-operation-intent", "MANUAL"), ("x-is-test", "TRUE")]);
        let intent = extract_intent(&map, "/authorize");
        assert_eq!(intent.operation_intent, OperationIntent::Manual);
        assert!(intent.is_test);
    }

    #[test]
    fn test_context_request_id_and_forwarded_for() {
        let id = Uuid::new_v4();
        let map = headers(&[
            ("x-request-id", &id.to_string()),
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
        ]);
        let ctx = extract_context(&map, "/authorize");
        assert_eq!(ctx.request_id, id);
        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_context_generates_request_id_when_absent() {
        let a = extract_context(&HeaderMap::new(), "/x");
        let b = extract_context(&HeaderMap::new(), "/x");
        assert_ne!(a.request_id, b.request_id);
    }
}
