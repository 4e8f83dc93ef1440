use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for hearth (~/.config/hearth/config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where the database and blob tree live (defaults to the platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub blobs: BlobConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Largest accepted attachment, in bytes
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,

    /// JPEG quality for re-encoded photos (1-100)
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,

    /// Digest length in hex characters
    #[serde(default = "default_digest_len")]
    pub digest_len: usize,

    #[serde(default)]
    pub verify_on_dedup: bool,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_size: default_max_blob_size(),
            image_quality: default_image_quality(),
            digest_len: default_digest_len(),
            verify_on_dedup: false,
        }
    }
}

fn default_max_blob_size() -> u64 {
    50 * 1024 * 1024
}

fn default_image_quality() -> u8 {
    80
}

fn default_digest_len() -> usize {
    16
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, writing the defaults there if it does not exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            Ok(config)
        }
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "hearth", "hearth") {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.hearth/config.toml")
        }
    }
}
