use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::handlers::AppState;

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn is_health_check(path: &str) -> bool {
    path == "/health" || path == "/healthz"
}

/// Bearer/API-key check against the configured key list.
/// An empty key list disables auth entirely.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path();
    if is_health_check(path) || request.method() == axum::http::Method::OPTIONS {
        return Ok(next.run(request).await);
    }
    if state.api_keys.is_empty() {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or(Some(s)))
        .or_else(|| request.headers().get("x-api-key").and_then(|h| h.to_str().ok()));

    let authorized = presented
        .is_some_and(|k| state.api_keys.iter().any(|known| constant_time_compare(k, known)));

    if authorized {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(path = %request.uri().path(), "rejected unauthenticated request");
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("sk-abc", "sk-abc"));
        assert!(!constant_time_compare("sk-abc", "sk-abd"));
        assert!(!constant_time_compare("sk-ab", "sk-abc"));
    }

    #[test]
    fn test_health_paths_bypass() {
        assert!(is_health_check("/health"));
        assert!(is_health_check("/healthz"));
        assert!(!is_health_check("/v1/models"));
    }
}
