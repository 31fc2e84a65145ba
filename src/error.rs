use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for Corpdesk handlers and services
#[derive(Debug, thiserror::Error)]
pub enum CorpdeskError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// JSON body returned for every failed request.
///
/// `error` is always present; `error_id` correlates the response with the
/// server-side log line.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CorpdeskError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn request_timeout() -> Self {
        Self::RequestTimeout
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::Anyhow(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show to API clients.
    ///
    /// Client errors return their own message. Server errors return a
    /// generic message so internal details never leave the process (CWE-209).
    pub fn safe_message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::Conflict(msg)
            | Self::TooManyRequests(msg) => msg.clone(),
            Self::RequestTimeout => "Request timeout".to_string(),

            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable(_) => "Service unavailable".to_string(),
            Self::Database(_) => "Database error".to_string(),
        }
    }
}

/// Full text of a server error, attached to the response extensions so the
/// dev-mode middleware can surface it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for CorpdeskError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            status = status.as_u16(),
            error_id = %error_id,
            error = %self,
            "Request failed"
        );

        let body = ErrorResponse {
            error: self.safe_message(),
            error_id: Some(error_id),
            details: None,
        };

        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            response.extensions_mut().insert(ErrorDetail(self.to_string()));
        }
        response
    }
}

/// Result type alias for Corpdesk handlers and services
pub type Result<T> = std::result::Result<T, CorpdeskError>;

impl From<serde_json::Error> for CorpdeskError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            CorpdeskError::BadRequest(format!("JSON error: {}", err))
        } else {
            CorpdeskError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<reqwest::Error> for CorpdeskError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CorpdeskError::RequestTimeout
        } else if err.is_connect() {
            CorpdeskError::ServiceUnavailable(format!("Connection error: {}", err))
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                401 => CorpdeskError::Internal("Upstream authentication failed".to_string()),
                429 => CorpdeskError::TooManyRequests("Upstream rate limit exceeded".to_string()),
                503 => CorpdeskError::ServiceUnavailable("Upstream service unavailable".to_string()),
                _ => CorpdeskError::Internal(format!("Upstream error: {}", err)),
            }
        } else {
            CorpdeskError::Internal(format!("Request error: {}", err))
        }
    }
}

impl From<object_store::Error> for CorpdeskError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => {
                CorpdeskError::NotFound(format!("Object {} not found", path))
            }
            other => CorpdeskError::Internal(format!("Storage error: {}", other)),
        }
    }
}

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for CorpdeskError {
    fn from(err: sea_orm::DbErr) -> Self {
        match &err {
            sea_orm::DbErr::RecordNotFound(msg) => CorpdeskError::NotFound(if msg.is_empty() {
                "Record not found".to_string()
            } else {
                msg.clone()
            }),
            sea_orm::DbErr::Query(inner) => CorpdeskError::Database(format!("Query error: {}", inner)),
            sea_orm::DbErr::Exec(inner) => {
                CorpdeskError::Database(format!("Execution error: {}", inner))
            }
            sea_orm::DbErr::Conn(inner) => {
                CorpdeskError::Database(format!("Connection error: {}", inner))
            }
            _ => CorpdeskError::Database(format!("Database error: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CorpdeskError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(CorpdeskError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(CorpdeskError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(CorpdeskError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(CorpdeskError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            CorpdeskError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            CorpdeskError::Database("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = CorpdeskError::not_found("Contract not found");
        assert_eq!(err.safe_message(), "Contract not found");
        assert_eq!(err.to_string(), "Not found: Contract not found");
    }

    #[test]
    fn test_server_errors_are_hidden() {
        let err = CorpdeskError::internal("stripe key sk_live_123 rejected");
        assert_eq!(err.safe_message(), "Internal server error");

        let err: CorpdeskError = anyhow::anyhow!("boom").into();
        assert_eq!(err.safe_message(), "Internal server error");
    }

    #[test]
    fn test_from_serde_json_syntax_error() {
        let err: CorpdeskError = serde_json::from_str::<serde_json::Value>("{ nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, CorpdeskError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_response_body_has_error_field() {
        let response = CorpdeskError::forbidden("You do not own this company").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "You do not own this company");
        assert!(body["error_id"].is_string());
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_server_error_carries_detail_extension() {
        let response = CorpdeskError::internal("pdf renderer crashed").into_response();
        let detail = response.extensions().get::<ErrorDetail>().cloned();
        assert_eq!(
            detail.map(|d| d.0),
            Some("Internal server error: pdf renderer crashed".to_string())
        );

        let response = CorpdeskError::not_found("Note not found").into_response();
        assert!(response.extensions().get::<ErrorDetail>().is_none());
    }
}
