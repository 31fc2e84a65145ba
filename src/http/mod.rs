//! Request extractors, response helpers and the [`RouteModule`] trait.

pub mod extract;
pub mod response;
pub mod routes;

pub use extract::{JsonBody, QueryParams};
pub use response::{CreatedResponse, NoContentResponse};
pub use routes::RouteModule;
