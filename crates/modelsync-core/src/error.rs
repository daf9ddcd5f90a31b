//! Error types for modelsync-core.

use crate::transport::RequestId;
use thiserror::Error;

/// Result type alias for modelsync-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in modelsync-core operations.
///
/// Transport failures are not represented here: they arrive as values when a
/// request is settled and are reported through callbacks and `"error"`
/// notifications.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The validator rejected the proposed attributes. Nothing was mutated.
    #[error("validation failed: {0}")]
    Invalid(String),

    /// Neither the request options nor the schema produced a URL.
    #[error("a url must be specified")]
    MissingUrl,

    /// A settlement arrived for a request this model is not waiting on.
    #[error("unknown request: {0}")]
    UnknownRequest(RequestId),

    /// JSON serialization error while building a request body.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
