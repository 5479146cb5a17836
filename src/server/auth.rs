// ABOUTME: Bearer token check in front of the import routes
// ABOUTME: An empty token list leaves the endpoint open

use super::AppState;
use crate::error::ImportError;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

pub async fn require_token(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.auth_tokens.is_empty() {
        return next.run(request).await;
    }

    match bearer_token(request.headers()) {
        Some(token) if state.auth_tokens.iter().any(|t| t == token) => next.run(request).await,
        Some(_) => ImportError::Unauthorized("invalid bearer token".to_string()).into_response(),
        None => ImportError::Unauthorized("missing bearer token".to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc "));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
