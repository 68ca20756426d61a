use std::collections::BTreeSet;
use std::path::PathBuf;

use hf_hub::{
    api::tokio::{Api, ApiBuilder, ApiRepo},
    Repo, RepoType,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::{
    cache::{FileMetadata, ModelCache},
    error::{HubError, HubResult},
    integrity::sha256_file,
};

/// Files a classifier repo must provide besides its weights.
const REQUIRED_FILES: &[&str] = &["config.json"];

/// Tokenizer artifacts; which ones exist depends on the model family.
const OPTIONAL_FILES: &[&str] = &[
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "vocab.txt",
    "vocab.json",
    "merges.txt",
];

const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";
const SAFETENSORS_SINGLE: &str = "model.safetensors";

const PB_TEMPLATE_SPINNER: &str = "{spinner:.green} {wide_msg}  [{elapsed_precise}]";

/// High-level model downloader.
pub struct ModelDownloader {
    cache: ModelCache,
    api: Api,
}

impl ModelDownloader {
    /// Reads `HUGGING_FACE_HUB_TOKEN` from the environment if present.
    pub fn new(cache: ModelCache) -> HubResult<Self> {
        let hf_token = std::env::var("HUGGING_FACE_HUB_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let api = ApiBuilder::new()
            .with_token(hf_token)
            .with_progress(false)
            .build()
            .map_err(|e| HubError::DownloadFailed {
                file: "<api init>".into(),
                reason: e.to_string(),
            })?;

        Ok(Self { cache, api })
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Download config, tokenizer files and safetensors weights (single file
    /// or every shard named by the index) into the cache.
    ///
    /// Returns the model directory.
    pub async fn pull(
        &self,
        repo_id: &str,
        revision: &str,
        mp: Option<&MultiProgress>,
    ) -> HubResult<PathBuf> {
        info!(repo_id, revision, "Pulling model");

        let repo = self.api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let mut required: Vec<String> = REQUIRED_FILES.iter().map(|s| s.to_string()).collect();
        match repo.get(SAFETENSORS_INDEX).await {
            Ok(index_path) => {
                let index_str = std::fs::read_to_string(&index_path).map_err(HubError::Io)?;
                let index: serde_json::Value = serde_json::from_str(&index_str)?;
                let shards = shard_filenames(&index);
                debug!(shards = shards.len(), "Sharded checkpoint");
                required.extend(shards);
                required.push(SAFETENSORS_INDEX.to_string());
            }
            Err(_) => required.push(SAFETENSORS_SINGLE.to_string()),
        }

        for filename in &required {
            self.download_file(&repo, repo_id, revision, filename, mp)
                .await
                .map_err(|e| HubError::DownloadFailed {
                    file: filename.clone(),
                    reason: format!("{e}{}", auth_hint(&e.to_string())),
                })?;
        }

        let mut optional = 0usize;
        for filename in OPTIONAL_FILES {
            match self.download_file(&repo, repo_id, revision, filename, mp).await {
                Ok(_) => optional += 1,
                Err(e) => debug!(filename, error = %e, "Optional file not available"),
            }
        }
        if !self.cache.is_cached(repo_id, revision, "tokenizer.json") {
            warn!(repo_id, "Repository has no tokenizer.json; it cannot be used as a teacher");
        }

        info!(
            repo_id,
            revision,
            files = required.len() + optional,
            "Model cached"
        );
        Ok(self.cache.model_dir(repo_id, revision))
    }

    /// Fetch one file through the hub client, then copy it into the cache
    /// with a sidecar.  Already cached files are skipped.
    async fn download_file(
        &self,
        repo: &ApiRepo,
        repo_id: &str,
        revision: &str,
        filename: &str,
        mp: Option<&MultiProgress>,
    ) -> HubResult<PathBuf> {
        let dest = self.cache.file_path(repo_id, revision, filename);
        if self.cache.is_cached(repo_id, revision, filename) {
            debug!(filename, "Already cached, skipping download");
            return Ok(dest);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(HubError::Io)?;
        }

        let pb = spinner(filename, mp);
        let fetched = repo.get(filename).await;
        let src = match fetched {
            Ok(p) => p,
            Err(e) => {
                pb.finish_and_clear();
                return Err(e.into());
            }
        };

        let tmp = dest.with_file_name(format!("{filename}.part"));
        tokio::fs::copy(&src, &tmp).await.map_err(HubError::Io)?;
        tokio::fs::rename(&tmp, &dest).await.map_err(HubError::Io)?;

        let sha256 = sha256_file(&dest)?;
        let size_bytes = std::fs::metadata(&dest).map_err(HubError::Io)?.len();
        self.cache.write_meta(&FileMetadata {
            repo_id: repo_id.to_string(),
            revision: revision.to_string(),
            filename: filename.to_string(),
            sha256,
            size_bytes,
        })?;

        pb.finish_with_message(format!("{filename}  {}", format_bytes(size_bytes)));
        info!(filename, size_bytes, "Downloaded");
        Ok(dest)
    }
}

/// Unique shard filenames named by a `model.safetensors.index.json`, sorted.
pub fn shard_filenames(index: &serde_json::Value) -> Vec<String> {
    index["weight_map"]
        .as_object()
        .map(|m| {
            m.values()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
}

fn spinner(filename: &str, mp: Option<&MultiProgress>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let pb = match mp {
        Some(mp) => mp.add(pb),
        None => pb,
    };
    if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE_SPINNER) {
        pb.set_style(style);
    }
    pb.set_message(filename.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

/// `1536` → `"1.5 KiB"`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn auth_hint(msg: &str) -> &'static str {
    if msg.contains("401") || msg.contains("403") {
        " (hint: set HUGGING_FACE_HUB_TOKEN for gated repos)"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_filenames_dedup_and_sort() {
        let index = serde_json::json!({
            "metadata": {"total_size": 10},
            "weight_map": {
                "bert.embeddings.word_embeddings.weight": "model-00002-of-00002.safetensors",
                "bert.pooler.dense.weight": "model-00001-of-00002.safetensors",
                "classifier.weight": "model-00002-of-00002.safetensors"
            }
        });
        assert_eq!(
            shard_filenames(&index),
            vec!["model-00001-of-00002.safetensors", "model-00002-of-00002.safetensors"]
        );
    }

    #[test]
    fn test_shard_filenames_missing_map() {
        assert!(shard_filenames(&serde_json::json!({})).is_empty());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(438 * 1024 * 1024), "438.0 MiB");
    }

    #[test]
    fn test_auth_hint() {
        assert!(auth_hint("status 401").contains("HUGGING_FACE_HUB_TOKEN"));
        assert!(auth_hint("timeout").is_empty());
    }
}
