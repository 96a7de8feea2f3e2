//! Storage abstractions for published artifacts and poller state.
//!
//! Artifacts are keyed under a version prefix so that clients of an older
//! layout keep reading their own files:
//!
//! ```text
//! {version}/
//! ├── data_kma_ko.json          # One JSON artifact per source and language
//! ├── data_jma_sindo_en.json
//! ├── data_jma_singen_ja.json
//! └── img/                      # Bulletin images
//!     ├── eqk_img_3_20240101092812.png
//!     └── jma_eq_20240101100100391-01.png
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
pub mod state;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::StorageConfig;

// Re-export for convenience
pub use local::LocalStore;
#[cfg(feature = "s3")]
pub use s3::S3Store;
pub use state::StateStore;

pub const JSON_CONTENT: &str = "application/json";
pub const PNG_CONTENT: &str = "image/png";

/// Key of a JSON artifact.
pub fn json_key(version: &str, relative: &str) -> String {
    format!("{}/{}", version.trim_matches('/'), relative)
}

/// Key of an image artifact.
pub fn image_key(version: &str, relative: &str) -> String {
    format!("{}/img/{}", version.trim_matches('/'), relative)
}

/// Trait for artifact storage backends.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write one object, replacing any previous version.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Open the backend named in the configuration.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ArtifactStore>> {
    match config.backend.as_str() {
        "local" => Ok(Arc::new(LocalStore::new(&config.local_dir))),
        #[cfg(feature = "s3")]
        "s3" => Ok(Arc::new(S3Store::from_env(&config.bucket).await)),
        #[cfg(not(feature = "s3"))]
        "s3" => Err(AppError::config("storage.backend = \"s3\" needs the `s3` feature")),
        other => Err(AppError::config(format!("unknown storage backend '{other}'"))),
    }
}
