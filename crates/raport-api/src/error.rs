//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use raport_core::{ErrorCategory, store::StoreError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
///
/// Rendered as `{"success": false, "message": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a backend error by the domain error it carries. Anything else is a
  /// failed (and rolled back) operation.
  pub fn from_store<E: StoreError>(err: E) -> Self {
    match err.as_core().map(raport_core::Error::category) {
      Some(ErrorCategory::Validation) => ApiError::BadRequest(err.to_string()),
      Some(ErrorCategory::NotFound) => ApiError::NotFound(err.to_string()),
      _ => ApiError::Store(Box::new(err)),
    }
  }

  /// A required request field was absent.
  pub fn missing(field: &str) -> Self {
    ApiError::BadRequest(format!("{field} is required"))
  }
}

impl From<raport_core::Error> for ApiError {
  fn from(err: raport_core::Error) -> Self {
    match err.category() {
      ErrorCategory::NotFound => ApiError::NotFound(err.to_string()),
      _ => ApiError::BadRequest(err.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store operation failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "success": false, "message": message }))).into_response()
  }
}

/// Unwrap a required request field.
pub fn required<T>(value: Option<T>, field: &str) -> Result<T, ApiError> {
  value.ok_or_else(|| ApiError::missing(field))
}
