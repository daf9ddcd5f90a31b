//! Error types for the filesystem store.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store not found at the specified path.
    #[error("store not found at '{0}'")]
    StoreNotFound(PathBuf),

    /// Store already exists.
    #[error("store already exists at '{0}'")]
    StoreExists(PathBuf),

    /// Resource not found.
    #[error("resource not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Resource already exists.
    #[error("resource already exists: {collection}/{id}")]
    Exists { collection: String, id: String },

    /// Collection name does not survive slugification.
    #[error("invalid collection name: {0}")]
    InvalidCollection(String),

    /// Id cannot be used as a file name.
    #[error("invalid resource id: {0}")]
    InvalidId(String),

    /// Request body is not a JSON object.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Request URL does not name a collection.
    #[error("invalid resource url: {0}")]
    InvalidUrl(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory traversal error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] modelsync_core::CoreError),
}

impl StoreError {
    /// HTTP-style status code for this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } | Self::StoreNotFound(_) => 404,
            Self::Exists { .. } | Self::StoreExists(_) => 409,
            Self::InvalidCollection(_)
            | Self::InvalidId(_)
            | Self::InvalidDocument(_)
            | Self::InvalidUrl(_)
            | Self::Json(_) => 400,
            Self::Io(_) | Self::Yaml(_) | Self::Walk(_) | Self::Core(_) => 500,
        }
    }
}
