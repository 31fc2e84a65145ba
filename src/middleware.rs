use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::ErrorDetail;

/// Generates a UUID v4 `x-request-id` for every request
#[derive(Clone, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let request_id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(request_id))
    }
}

/// Dev-mode only: copy the full server error text into the `details` field.
pub async fn expose_error_details(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, 64 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => return (parts.status, detail).into_response(),
    };

    let mut json: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(json) => json,
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };
    if let Some(object) = json.as_object_mut() {
        object.insert("details".to_string(), serde_json::Value::String(detail));
    }

    let body = serde_json::to_vec(&json).unwrap_or_else(|_| bytes.to_vec());
    let mut parts = parts;
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CorpdeskError;
    use axum::{Router, routing::get};
    use tower::ServiceExt;

    async fn failing() -> Result<&'static str, CorpdeskError> {
        Err(CorpdeskError::internal("renderer exited with status 1"))
    }

    #[tokio::test]
    async fn test_dev_mode_adds_details() {
        let app = Router::new()
            .route("/fail", get(failing))
            .layer(axum::middleware::from_fn(expose_error_details));

        let response = app
            .oneshot(Request::builder().uri("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 500);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["details"], "Internal server error: renderer exited with status 1");
    }
}
