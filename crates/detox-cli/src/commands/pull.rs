use indicatif::MultiProgress;
use tracing::info;

use detox_hub::{format_bytes, ModelCache, ModelDownloader};

use crate::commands::parse_model_ref;
use crate::config::{expand_cache_dir, AppConfig};

/// Download a classifier from Hugging Face Hub into the local cache.
///
/// A `@revision` suffix on the model id takes precedence over `--revision`.
pub async fn run(raw_model_id: &str, revision: &str, config: &AppConfig) -> anyhow::Result<()> {
    let (repo_id, parsed_rev) = parse_model_ref(raw_model_id);
    let revision = if raw_model_id.contains('@') { parsed_rev } else { revision };
    let cache_dir = expand_cache_dir(&config.model.cache_dir);

    info!(
        repo_id,
        revision,
        cache_dir = %cache_dir.display(),
        "Pulling model"
    );

    let cache = ModelCache::new(&cache_dir)?;
    let downloader = ModelDownloader::new(cache)?;
    let mp = MultiProgress::new();

    let model_dir = downloader.pull(repo_id, revision, Some(&mp)).await?;
    let cache = downloader.cache();

    println!("\nModel '{repo_id}' @ {revision} cached to {}", model_dir.display());
    for name in cache.cached_files(repo_id, revision)? {
        let size = std::fs::metadata(model_dir.join(&name)).map(|m| m.len()).unwrap_or(0);
        println!("  {:<40} {:>10}", name, format_bytes(size));
    }

    Ok(())
}
