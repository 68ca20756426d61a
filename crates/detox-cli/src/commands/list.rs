use detox_hub::{format_bytes, ModelCache};

use crate::config::{expand_cache_dir, AppConfig};

/// List all models stored in the local cache.
pub fn run(verify: bool, config: &AppConfig) -> anyhow::Result<()> {
    let cache_dir = expand_cache_dir(&config.model.cache_dir);
    let cache = ModelCache::new(&cache_dir)?;

    let models = cache.list_models()?;

    if models.is_empty() {
        println!("No models cached in {}.", cache_dir.display());
        println!("Use `detox pull <model-id>` to download a model.");
        return Ok(());
    }

    println!("{:<50} {:<16} {:>10}", "MODEL ID", "REVISION", "SIZE");
    println!("{}", "-".repeat(78));
    let mut failures = 0usize;
    for m in &models {
        let size = cache
            .model_size(&m.repo_id, &m.revision)
            .map(format_bytes)
            .unwrap_or_else(|_| "?".to_string());
        let status = if verify {
            match cache.verify_model(&m.repo_id, &m.revision) {
                Ok(n) => format!("  ok ({n} files)"),
                Err(e) => {
                    failures += 1;
                    format!("  FAILED: {e}")
                }
            }
        } else {
            String::new()
        };
        println!("{:<50} {:<16} {:>10}{}", m.repo_id, m.revision, size, status);
    }
    println!("\n{} model(s) cached in {}", models.len(), cache_dir.display());

    if failures > 0 {
        anyhow::bail!("{failures} cached model(s) failed integrity verification");
    }
    Ok(())
}
