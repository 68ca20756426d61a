use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use detox_distill::{DistillConfig, FineTuneConfig};
use serde::{Deserialize, Serialize};

/// Full runtime configuration loaded from TOML + env vars.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelCacheConfig,
    pub device: DeviceConfig,
    /// Defaults for `detox finetune`.
    pub training: FineTuneConfig,
    /// Defaults for `detox distill`.
    pub distill: DistillConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelCacheConfig {
    pub cache_dir: String,
}

impl Default for ModelCacheConfig {
    fn default() -> Self {
        Self { cache_dir: "~/.cache/detox".to_string() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub prefer_gpu: bool,
    pub cuda_device_id: usize,
}

/// Load configuration from:
/// 1. Built-in defaults
/// 2. `config/default.toml` (if present)
/// 3. A custom config file path (if provided)
/// 4. Environment variables prefixed with `DETOX_`, sections separated by
///    `__` (e.g. `DETOX_DISTILL__TEMPERATURE=4`)
pub fn load_config(config_file: Option<&PathBuf>) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();

    let mut builder = Config::builder()
        .set_default("model.cache_dir", defaults.model.cache_dir)?
        .set_default("device.prefer_gpu", defaults.device.prefer_gpu)?
        .set_default("device.cuda_device_id", defaults.device.cuda_device_id as i64)?
        .add_source(File::with_name("config/default").required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("DETOX")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// Expand `~` in cache_dir to the actual home directory.
pub fn expand_cache_dir(raw: &str) -> PathBuf {
    detox_hub::expand_tilde(std::path::Path::new(raw))
}
