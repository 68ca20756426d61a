use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HubError, HubResult};
use crate::integrity::verify_integrity;

const META_SUFFIX: &str = ".meta.json";

/// Metadata stored alongside each cached file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub repo_id: String,
    pub revision: String,
    pub filename: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// A `(repo_id, revision)` pair present in the cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CachedModel {
    pub repo_id: String,
    pub revision: String,
}

/// Manages the on-disk model cache layout.
///
/// Layout: `<cache_dir>/<owner>__<repo>/<revision>/<filename>`
/// Metadata sidecar: `<filename>.meta.json`
#[derive(Debug, Clone)]
pub struct ModelCache {
    root: PathBuf,
}

impl ModelCache {
    /// Create a cache rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> HubResult<Self> {
        let expanded = expand_tilde(&root.into());
        std::fs::create_dir_all(&expanded).map_err(HubError::Io)?;
        Ok(Self { root: expanded })
    }

    /// Default cache directory: `~/.cache/detox`.
    pub fn default_cache() -> HubResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            HubError::InvalidCacheDir("Cannot determine home directory".to_string())
        })?;
        Self::new(home.join(".cache").join("detox"))
    }

    /// Absolute path for a given `(repo_id, revision, filename)` tuple.
    pub fn file_path(&self, repo_id: &str, revision: &str, filename: &str) -> PathBuf {
        self.model_dir(repo_id, revision).join(filename)
    }

    /// Absolute path for the metadata sidecar of a given file.
    pub fn meta_path(&self, repo_id: &str, revision: &str, filename: &str) -> PathBuf {
        self.model_dir(repo_id, revision)
            .join(format!("{filename}{META_SUFFIX}"))
    }

    /// `true` if both the file and its sidecar exist.
    pub fn is_cached(&self, repo_id: &str, revision: &str, filename: &str) -> bool {
        self.file_path(repo_id, revision, filename).exists()
            && self.meta_path(repo_id, revision, filename).exists()
    }

    /// `true` if a model directory with at least a `config.json` exists.
    pub fn has_model(&self, repo_id: &str, revision: &str) -> bool {
        self.is_cached(repo_id, revision, "config.json")
    }

    /// Persist file metadata to disk.
    pub fn write_meta(&self, meta: &FileMetadata) -> HubResult<()> {
        let path = self.meta_path(&meta.repo_id, &meta.revision, &meta.filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(HubError::Io)?;
        }
        let json = serde_json::to_string_pretty(meta)?;
        std::fs::write(&path, json).map_err(HubError::Io)?;
        debug!("Wrote metadata to {}", path.display());
        Ok(())
    }

    /// Read file metadata from disk.
    pub fn read_meta(&self, repo_id: &str, revision: &str, filename: &str) -> HubResult<FileMetadata> {
        let path = self.meta_path(repo_id, revision, filename);
        let json = std::fs::read_to_string(&path).map_err(HubError::Io)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// All cached models, sorted.
    pub fn list_models(&self) -> HubResult<Vec<CachedModel>> {
        let mut results = Vec::new();
        if !self.root.exists() {
            return Ok(results);
        }
        for entry in std::fs::read_dir(&self.root).map_err(HubError::Io)? {
            let entry = entry.map_err(HubError::Io)?;
            let repo_dir = entry.path();
            if !repo_dir.is_dir() {
                continue;
            }
            let repo_id = entry.file_name().to_string_lossy().replace("__", "/");
            for rev_entry in std::fs::read_dir(&repo_dir).map_err(HubError::Io)? {
                let rev_entry = rev_entry.map_err(HubError::Io)?;
                if rev_entry.path().is_dir() {
                    results.push(CachedModel {
                        repo_id: repo_id.clone(),
                        revision: rev_entry.file_name().to_string_lossy().to_string(),
                    });
                }
            }
        }
        results.sort();
        Ok(results)
    }

    /// Data files (not sidecars) cached for a model, sorted by name.
    pub fn cached_files(&self, repo_id: &str, revision: &str) -> HubResult<Vec<String>> {
        let dir = self.model_dir(repo_id, revision);
        if !dir.is_dir() {
            return Err(HubError::NotCached(format!("{repo_id}@{revision}")));
        }
        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .map_err(HubError::Io)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| !n.ends_with(META_SUFFIX))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Total size on disk of a cached model, sidecars excluded.
    pub fn model_size(&self, repo_id: &str, revision: &str) -> HubResult<u64> {
        let dir = self.model_dir(repo_id, revision);
        let mut total = 0u64;
        for name in self.cached_files(repo_id, revision)? {
            total += std::fs::metadata(dir.join(name)).map_err(HubError::Io)?.len();
        }
        Ok(total)
    }

    /// Re-hash every cached file of a model against its sidecar.
    ///
    /// Files without a sidecar are reported as not cached.
    pub fn verify_model(&self, repo_id: &str, revision: &str) -> HubResult<usize> {
        let files = self.cached_files(repo_id, revision)?;
        for name in &files {
            if !self.meta_path(repo_id, revision, name).exists() {
                return Err(HubError::NotCached(format!("{repo_id}@{revision}/{name}")));
            }
            let meta = self.read_meta(repo_id, revision, name)?;
            verify_integrity(&self.file_path(repo_id, revision, name), &meta.sha256)?;
        }
        Ok(files.len())
    }

    /// The directory where all files for a given `(repo_id, revision)` live.
    ///
    /// This is the model directory handed to the loaders in `detox-core`.
    pub fn model_dir(&self, repo_id: &str, revision: &str) -> PathBuf {
        self.root.join(repo_id.replace('/', "__")).join(revision)
    }

    /// Delete all cached files for a given `(repo_id, revision)`.
    ///
    /// Returns the number of files removed.  If `revision` is `None`, all
    /// revisions are deleted.
    pub fn delete_model(&self, repo_id: &str, revision: Option<&str>) -> HubResult<usize> {
        let repo_root = self.root.join(repo_id.replace('/', "__"));

        if !repo_root.exists() {
            return Err(HubError::NotCached(repo_id.to_string()));
        }

        let dirs_to_remove: Vec<PathBuf> = match revision {
            Some(rev) => {
                let rev_dir = repo_root.join(rev);
                if !rev_dir.exists() {
                    return Err(HubError::NotCached(format!("{repo_id}@{rev}")));
                }
                vec![rev_dir]
            }
            None => std::fs::read_dir(&repo_root)
                .map_err(HubError::Io)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect(),
        };

        let mut count = 0usize;
        for dir in &dirs_to_remove {
            count += count_files(dir);
            std::fs::remove_dir_all(dir).map_err(HubError::Io)?;
        }

        // Drop the repo directory once its last revision is gone.
        if std::fs::read_dir(&repo_root)
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
        {
            let _ = std::fs::remove_dir(&repo_root);
        }

        Ok(count)
    }

    /// The root cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Recursively count files in a directory, sidecars excluded.
fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                count_files(&path)
            } else if path.to_string_lossy().ends_with(META_SUFFIX) {
                0
            } else {
                1
            }
        })
        .sum()
}

/// `~/x` → `$HOME/x`; anything else is returned unchanged.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s == "~" {
        return dirs::home_dir().unwrap_or_else(|| path.to_path_buf());
    }
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::sha256_file;

    fn temp_cache() -> (ModelCache, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ModelCache::new(dir.path()).unwrap();
        (cache, dir)
    }

    fn put(cache: &ModelCache, repo: &str, rev: &str, name: &str, data: &[u8]) {
        let path = cache.file_path(repo, rev, name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        cache
            .write_meta(&FileMetadata {
                repo_id: repo.into(),
                revision: rev.into(),
                filename: name.into(),
                sha256: sha256_file(&path).unwrap(),
                size_bytes: data.len() as u64,
            })
            .unwrap();
    }

    #[test]
    fn test_file_path_encodes_slash() {
        let (cache, _dir) = temp_cache();
        let p = cache.file_path("unitary/toxic-bert", "main", "config.json");
        assert!(p.ends_with("unitary__toxic-bert/main/config.json"));
    }

    #[test]
    fn test_meta_path_has_suffix() {
        let (cache, _dir) = temp_cache();
        let p = cache.meta_path("a/b", "rev", "model.safetensors");
        assert!(p.to_string_lossy().ends_with("model.safetensors.meta.json"));
    }

    #[test]
    fn test_is_cached_requires_sidecar() {
        let (cache, _dir) = temp_cache();
        let path = cache.file_path("a/b", "main", "config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}").unwrap();
        assert!(!cache.is_cached("a/b", "main", "config.json"));

        put(&cache, "a/b", "main", "config.json", b"{}");
        assert!(cache.is_cached("a/b", "main", "config.json"));
        assert!(cache.has_model("a/b", "main"));
    }

    #[test]
    fn test_metadata_write_read_roundtrip() {
        let (cache, _dir) = temp_cache();
        let meta = FileMetadata {
            repo_id: "test/model".to_string(),
            revision: "main".to_string(),
            filename: "config.json".to_string(),
            sha256: "deadbeef".to_string(),
            size_bytes: 1024,
        };
        cache.write_meta(&meta).unwrap();
        let read_back = cache.read_meta("test/model", "main", "config.json").unwrap();
        assert_eq!(read_back.sha256, "deadbeef");
        assert_eq!(read_back.size_bytes, 1024);
    }

    #[test]
    fn test_list_models_sorted() {
        let (cache, _dir) = temp_cache();
        assert!(cache.list_models().unwrap().is_empty());
        put(&cache, "unitary/toxic-bert", "main", "config.json", b"{}");
        put(&cache, "bert-base-uncased", "main", "config.json", b"{}");
        let models = cache.list_models().unwrap();
        assert_eq!(
            models,
            vec![
                CachedModel { repo_id: "bert-base-uncased".into(), revision: "main".into() },
                CachedModel { repo_id: "unitary/toxic-bert".into(), revision: "main".into() },
            ]
        );
    }

    #[test]
    fn test_cached_files_skips_sidecars() {
        let (cache, _dir) = temp_cache();
        put(&cache, "a/b", "main", "config.json", b"{}");
        put(&cache, "a/b", "main", "model.safetensors", b"weights");
        assert_eq!(cache.cached_files("a/b", "main").unwrap(), vec!["config.json", "model.safetensors"]);
        assert_eq!(cache.model_size("a/b", "main").unwrap(), 9);
        assert!(matches!(cache.cached_files("x/y", "main"), Err(HubError::NotCached(_))));
    }

    #[test]
    fn test_verify_model_detects_tampering() {
        let (cache, _dir) = temp_cache();
        put(&cache, "a/b", "main", "model.safetensors", b"weights");
        assert_eq!(cache.verify_model("a/b", "main").unwrap(), 1);

        std::fs::write(cache.file_path("a/b", "main", "model.safetensors"), b"tampered").unwrap();
        assert!(matches!(cache.verify_model("a/b", "main"), Err(HubError::IntegrityMismatch { .. })));
    }

    #[test]
    fn test_delete_single_revision_and_repo() {
        let (cache, dir) = temp_cache();
        put(&cache, "a/b", "main", "config.json", b"{}");
        put(&cache, "a/b", "main", "model.safetensors", b"w");
        put(&cache, "a/b", "v2", "config.json", b"{}");

        assert_eq!(cache.delete_model("a/b", Some("main")).unwrap(), 2);
        assert!(dir.path().join("a__b").exists());

        assert_eq!(cache.delete_model("a/b", None).unwrap(), 1);
        assert!(!dir.path().join("a__b").exists());
        assert!(matches!(cache.delete_model("a/b", None), Err(HubError::NotCached(_))));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/.cache/detox")), home.join(".cache/detox"));
        }
    }
}
