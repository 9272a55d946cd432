//! Shared-secret bearer authentication for trusted callers.

use axum::http::{header, HeaderMap};

use crate::error::ApiError;

/// Require `Authorization: Bearer <secret>` on a mutation endpoint.
pub fn require_bearer(headers: &HeaderMap, secret: &str) -> Result<(), ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == secret => Ok(()),
        _ => Err(ApiError::Unauthorized(
            "missing or invalid bearer token".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        }
        headers
    }

    #[test]
    fn accepts_matching_bearer() {
        assert!(require_bearer(&headers(Some("Bearer s3cret")), "s3cret").is_ok());
    }

    #[test]
    fn rejects_missing_wrong_or_malformed() {
        assert!(require_bearer(&headers(None), "s3cret").is_err());
        assert!(require_bearer(&headers(Some("Bearer nope")), "s3cret").is_err());
        assert!(require_bearer(&headers(Some("s3cret")), "s3cret").is_err());
        assert!(require_bearer(&headers(Some("bearer s3cret")), "s3cret").is_err());
    }
}
