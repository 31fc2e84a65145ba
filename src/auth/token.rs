use axum::http::{header, request::Parts};

use crate::error::CorpdeskError;

/// Pulls the session token out of a request.
pub struct TokenExtractor;

impl TokenExtractor {
    /// Bearer header first, then the session cookie.
    pub fn from_request(parts: &Parts, cookie_name: &str) -> Result<String, CorpdeskError> {
        if parts.headers.contains_key(header::AUTHORIZATION) {
            return Self::from_header(parts);
        }
        Self::from_cookie(parts, cookie_name)
            .map_err(|_| CorpdeskError::unauthorized("Authentication required"))
    }

    pub fn from_header(parts: &Parts) -> Result<String, CorpdeskError> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| CorpdeskError::unauthorized("Missing authorization header"))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            CorpdeskError::unauthorized(
                "Invalid authorization header format. Expected: Bearer <token>",
            )
        })?;

        if token.trim().is_empty() {
            return Err(CorpdeskError::unauthorized("Empty bearer token"));
        }

        Ok(token.trim().to_string())
    }

    pub fn from_cookie(parts: &Parts, cookie_name: &str) -> Result<String, CorpdeskError> {
        let cookie_header = parts
            .headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| CorpdeskError::unauthorized("Missing cookie header"))?;

        let prefix = format!("{}=", cookie_name);
        cookie_header
            .split(';')
            .map(str::trim)
            .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CorpdeskError::unauthorized(format!("Cookie '{}' not found", cookie_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(name: &str, value: &str) -> Parts {
        Request::builder()
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_bearer_header() {
        let parts = parts("authorization", "Bearer abc.def.ghi");
        assert_eq!(
            TokenExtractor::from_request(&parts, "corpdesk_session").unwrap(),
            "abc.def.ghi"
        );
    }

    #[test]
    fn test_cookie_fallback() {
        let parts = parts("cookie", "theme=dark; corpdesk_session=abc.def.ghi");
        assert_eq!(
            TokenExtractor::from_request(&parts, "corpdesk_session").unwrap(),
            "abc.def.ghi"
        );
    }

    #[test]
    fn test_basic_auth_rejected() {
        let parts = parts("authorization", "Basic Zm9vOmJhcg==");
        assert!(TokenExtractor::from_request(&parts, "corpdesk_session").is_err());
    }

    #[test]
    fn test_missing_everything() {
        let (parts, _) = Request::builder().body(()).unwrap().into_parts();
        let err = TokenExtractor::from_request(&parts, "corpdesk_session").unwrap_err();
        assert!(matches!(err, CorpdeskError::Unauthorized(ref m) if m == "Authentication required"));
    }
}
