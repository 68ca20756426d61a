//! # detox-hub
//!
//! Hugging Face model downloading and caching for detox.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use detox_hub::{ModelCache, ModelDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), detox_hub::HubError> {
//!     let cache = ModelCache::default_cache()?;
//!     let downloader = ModelDownloader::new(cache)?;
//!     let dir = downloader.pull("unitary/toxic-bert", "main", None).await?;
//!     println!("Model cached in {}", dir.display());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod download;
pub mod error;
pub mod integrity;

pub use cache::{expand_tilde, CachedModel, FileMetadata, ModelCache};
pub use download::{format_bytes, ModelDownloader};
pub use error::{HubError, HubResult};
