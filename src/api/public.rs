//! Public API types

use axum::response::{IntoResponse, Response};
use http::StatusCode;

// Errors

/// Returned to clients in place of any internal error detail.
pub const GENERIC_API_ERROR: &str = "Something went wrong, please try again later...";

pub struct ApiError(anyhow::Error);

/// Convert `ApiError` into an Axum compatible response.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Always log the error, the response never includes it
        tracing::error!("{:#}", self.0);

        (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_API_ERROR).into_response()
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` to turn them into `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// Re-export public types from each route

pub mod chat {
    pub use crate::api::routes::chat::public::*;
}
