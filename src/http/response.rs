use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// 201 Created with the resource as body and a `Location` header.
#[derive(Debug, Serialize)]
pub struct CreatedResponse<T: Serialize> {
    pub data: T,
    pub location: String,
}

impl<T: Serialize> CreatedResponse<T> {
    pub fn new(data: T, location: impl Into<String>) -> Self {
        Self {
            data,
            location: location.into(),
        }
    }
}

impl<T: Serialize> IntoResponse for CreatedResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::CREATED, Json(self.data)).into_response();
        if let Ok(location) = self.location.parse() {
            response.headers_mut().insert(header::LOCATION, location);
        } else {
            tracing::warn!(location = %self.location, "Invalid Location header value in CreatedResponse");
        }
        response
    }
}

/// 204 No Content response
#[derive(Debug, Clone, Copy)]
pub struct NoContentResponse;

impl IntoResponse for NoContentResponse {
    fn into_response(self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_sets_location() {
        let response =
            CreatedResponse::new(serde_json::json!({"id": "n1"}), "/api/notes/n1").into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/api/notes/n1");
    }

    #[test]
    fn test_no_content() {
        assert_eq!(NoContentResponse.into_response().status(), StatusCode::NO_CONTENT);
    }
}
