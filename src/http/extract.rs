//! JSON and query extractors whose rejections use the crate error body.
//!
//! axum's own `Json` and `Query` reject with plain text and a mix of 400,
//! 415 and 422. These wrap them so malformed input is always a 400
//! `{ "error": .. }` response.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use std::future::Future;

use crate::error::CorpdeskError;

/// JSON request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = CorpdeskError;

    fn from_request(
        req: Request,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            match Json::<T>::from_request(req, state).await {
                Ok(Json(value)) => Ok(JsonBody(value)),
                Err(rejection) => {
                    tracing::debug!(status = %rejection.status(), "JSON body rejected");
                    Err(CorpdeskError::bad_request(rejection.body_text()))
                }
            }
        }
    }
}

/// Query string parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = CorpdeskError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            Query::<T>::from_request_parts(parts, state)
                .await
                .map(|Query(value)| QueryParams(value))
                .map_err(|rejection| CorpdeskError::bad_request(rejection.body_text()))
        }
    }
}
