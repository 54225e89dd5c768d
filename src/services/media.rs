//! Media sidecar boundaries: embedding and thumbnail generation
//!
//! Both are external collaborators. The catalog only depends on these
//! traits; real implementations (ML runtimes, image decoders) live outside
//! the core. Failures are logged by callers and never abort indexing.

use std::path::Path;

/// Pure, fallible text embedding: `text -> vector | null`.
///
/// A `None` result suppresses semantic search for that asset, nothing else.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate(&self, text: &str) -> Option<Vec<f32>>;
}

/// Thumbnail rendering: returns the relative thumbnail file name, or
/// `None` on failure (the asset keeps no thumbnail).
#[async_trait::async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn generate(&self, file_path: &Path, asset_id: &str) -> Option<String>;
}

/// Default embedding provider: semantic search disabled.
pub struct NoEmbeddings;

#[async_trait::async_trait]
impl EmbeddingProvider for NoEmbeddings {
    async fn generate(&self, _text: &str) -> Option<Vec<f32>> {
        None
    }
}

/// Default thumbnail generator: no thumbnails.
pub struct NoThumbnails;

#[async_trait::async_trait]
impl ThumbnailGenerator for NoThumbnails {
    async fn generate(&self, _file_path: &Path, _asset_id: &str) -> Option<String> {
        None
    }
}
