//! Fluent request scenarios run against a [`Router`] without binding a port.
//!
//! The response body is buffered once, so every assertion is synchronous and
//! a failed status assertion prints the body that came back.
//!
//! ```rust,ignore
//! let harness = TestHarness::new().await;
//! let (_, token) = harness.user(Role::User, true).await;
//!
//! let body = testing::get(harness.app(), "/api/dashboard")
//!     .bearer_token(&token)
//!     .execute()
//!     .await
//!     .assert_ok()
//!     .json_value();
//! assert_eq!(body["plan"], "free");
//! ```

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header},
};
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

/// A request under construction.
pub struct Scenario {
    app: Router,
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Body,
}

impl Scenario {
    pub fn new(app: Router, method: Method, uri: &str) -> Self {
        Self {
            app,
            method,
            uri: uri.to_string(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_bytes(key.as_bytes()).expect("invalid header name"),
            HeaderValue::from_str(value).expect("invalid header value"),
        );
        self
    }

    pub fn bearer_token(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    /// Alias for [`bearer_token`](Self::bearer_token).
    pub fn with_auth(self, token: &str) -> Self {
        self.bearer_token(token)
    }

    /// Append URL-encoded query parameters to the URI.
    pub fn with_query(mut self, params: &[(&str, &str)]) -> Self {
        let encoded: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        if !encoded.is_empty() {
            let separator = if self.uri.contains('?') { '&' } else { '?' };
            self.uri = format!("{}{}{}", self.uri, separator, encoded.join("&"));
        }
        self
    }

    pub fn json_body<T: Serialize>(mut self, body: &T) -> Self {
        self.body = Body::from(serde_json::to_vec(body).expect("body must serialize"));
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = Body::from(body.into());
        self
    }

    /// Send raw bytes, e.g. an image upload or a signed webhook payload.
    pub fn raw_body(mut self, body: impl Into<Bytes>, content_type: &str) -> Self {
        self.body = Body::from(body.into());
        self.header("content-type", content_type)
    }

    pub async fn execute(self) -> ScenarioAssert {
        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(&self.uri)
            .body(self.body)
            .expect("invalid request");
        *request.headers_mut() = self.headers;

        let response = self.app.oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");

        ScenarioAssert {
            label: format!("{} {}", self.method, self.uri),
            status,
            headers,
            body,
        }
    }
}

/// A buffered response with chained assertions.
#[derive(Debug)]
pub struct ScenarioAssert {
    label: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ScenarioAssert {
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status,
            expected,
            "{}: expected {}, got {}. Body: {}",
            self.label,
            expected,
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_created(self) -> Self {
        self.assert_status(StatusCode::CREATED)
    }

    pub fn assert_no_content(self) -> Self {
        self.assert_status(StatusCode::NO_CONTENT)
    }

    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    pub fn assert_unauthorized(self) -> Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    pub fn assert_forbidden(self) -> Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    pub fn assert_conflict(self) -> Self {
        self.assert_status(StatusCode::CONFLICT)
    }

    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .header(key)
            .unwrap_or_else(|| panic!("{}: header '{}' not found", self.label, key));
        assert_eq!(value, expected, "{}: header '{}' mismatch", self.label, key);
        self
    }

    pub fn assert_json(self) -> Self {
        let content_type = self.header("content-type").unwrap_or_default();
        assert!(
            content_type.contains("application/json"),
            "{}: expected JSON, got '{}'",
            self.label,
            content_type
        );
        self
    }

    /// Compare the value at a dot path such as `checks.0.name`.
    pub fn assert_json_path(self, path: &str, expected: serde_json::Value) -> Self {
        let json = self.json_value();
        let actual = json_path_get(&json, path)
            .unwrap_or_else(|| panic!("{}: path '{}' not found in {}", self.label, path, json));
        assert_eq!(actual, &expected, "{}: JSON path '{}' mismatch", self.label, path);
        self
    }

    pub fn assert_contains(self, text: &str) -> Self {
        let body = self.body_string();
        assert!(
            body.contains(text),
            "{}: body does not contain '{}'. Body: {}",
            self.label,
            text,
            body
        );
        self
    }

    /// Print the response to stderr.
    pub fn dump(self) -> Self {
        eprintln!("=== {} -> {} ===", self.label, self.status);
        for (key, value) in &self.headers {
            eprintln!("  {}: {}", key, value.to_str().unwrap_or("<binary>"));
        }
        eprintln!("{}", String::from_utf8_lossy(&self.body));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.headers
            .get(key)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "{}: body is not the expected JSON ({}): {}",
                self.label,
                e,
                self.body_string()
            )
        })
    }

    pub fn json_value(&self) -> serde_json::Value {
        self.json()
    }
}

/// Dot-path lookup where numeric segments index arrays.
fn json_path_get<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(json, |current, part| match part.parse::<usize>() {
        Ok(index) if current.is_array() => current.get(index),
        _ => current.get(part),
    })
}

pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::GET, uri)
}

pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::POST, uri)
}

pub fn put(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::PUT, uri)
}

pub fn patch(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::PATCH, uri)
}

pub fn delete(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::DELETE, uri)
}
