pub mod delete;
pub mod distill;
pub mod finetune;
pub mod list;
pub mod metrics;
pub mod normalize;
pub mod pull;
pub mod score;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use tracing::info;

use detox_hub::{ModelCache, ModelDownloader};

use crate::config::{expand_cache_dir, AppConfig};

/// Split `owner/repo[@revision]` into `(repo_id, revision)`, defaulting the
/// revision to `main`.  An optional `hf.co/` prefix is stripped.
pub fn parse_model_ref(raw: &str) -> (&str, &str) {
    let stripped = raw.strip_prefix("hf.co/").unwrap_or(raw);
    match stripped.rsplit_once('@') {
        Some((repo, rev)) if !repo.is_empty() && !rev.is_empty() => (repo, rev),
        _ => (stripped, "main"),
    }
}

/// Resolve a model argument to a directory on disk.
///
/// An existing directory is used as is.  Anything else is a Hugging Face repo
/// id, downloaded into the cache first when missing.
pub async fn resolve_model(raw: &str, config: &AppConfig) -> Result<PathBuf> {
    let local = Path::new(raw);
    if local.is_dir() {
        info!(path = %local.display(), "Using local model directory");
        return Ok(local.to_path_buf());
    }

    let (repo_id, revision) = parse_model_ref(raw);
    let cache_dir = expand_cache_dir(&config.model.cache_dir);
    ensure_cached(repo_id, revision, &cache_dir)
        .await
        .with_context(|| format!("Failed to fetch model '{raw}'"))
}

/// Ensure a model is present in the local cache and return its directory.
async fn ensure_cached(repo_id: &str, revision: &str, cache_dir: &Path) -> Result<PathBuf> {
    let cache = ModelCache::new(cache_dir)?;

    if cache.has_model(repo_id, revision) {
        info!(model_id = repo_id, revision, "Model already cached, skipping download");
        return Ok(cache.model_dir(repo_id, revision));
    }

    println!("Model '{repo_id}' not found in cache, downloading from Hugging Face ...");

    let downloader = ModelDownloader::new(cache)
        .context("Failed to create model downloader")?;
    let mp = MultiProgress::new();
    let dir = downloader
        .pull(repo_id, revision, Some(&mp))
        .await
        .with_context(|| format!("Download failed for '{repo_id}'"))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_repo_id_defaults_to_main() {
        assert_eq!(parse_model_ref("unitary/toxic-bert"), ("unitary/toxic-bert", "main"));
    }

    #[test]
    fn revision_suffix() {
        assert_eq!(parse_model_ref("unitary/toxic-bert@v1"), ("unitary/toxic-bert", "v1"));
        assert_eq!(parse_model_ref("hf.co/unitary/toxic-bert@abc123"), ("unitary/toxic-bert", "abc123"));
    }

    #[test]
    fn dangling_at_is_not_a_revision() {
        assert_eq!(parse_model_ref("unitary/toxic-bert@"), ("unitary/toxic-bert@", "main"));
    }

    #[tokio::test]
    async fn existing_directory_is_used_without_download() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = AppConfig::default();
        let resolved = resolve_model(dir.path().to_str().unwrap(), &cfg).await.unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[tokio::test]
    async fn cached_model_is_resolved_from_cache() {
        let root = tempfile::TempDir::new().unwrap();
        let cache = ModelCache::new(root.path()).unwrap();
        let config_path = cache.file_path("unitary/toxic-bert", "main", "config.json");
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        std::fs::write(&config_path, "{}").unwrap();
        cache
            .write_meta(&detox_hub::FileMetadata {
                repo_id: "unitary/toxic-bert".into(),
                revision: "main".into(),
                filename: "config.json".into(),
                sha256: String::new(),
                size_bytes: 2,
            })
            .unwrap();

        let mut cfg = AppConfig::default();
        cfg.model.cache_dir = root.path().to_string_lossy().to_string();
        let resolved = resolve_model("unitary/toxic-bert", &cfg).await.unwrap();
        assert_eq!(resolved, cache.model_dir("unitary/toxic-bert", "main"));
    }
}
