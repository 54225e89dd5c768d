//! Catalog-specific error types

use thiserror::Error;

/// Catalog operation errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Asset or tag not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
