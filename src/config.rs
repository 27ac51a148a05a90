use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub faces: FacesConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacesConfig {
    /// Turns off facial recognition maintenance entirely.
    #[serde(default)]
    pub disabled: bool,

    /// Minimum cosine similarity between a cluster seed and a member marker.
    #[serde(default = "default_cluster_similarity")]
    pub cluster_similarity: f32,

    /// Minimum number of markers before a cluster becomes a face.
    #[serde(default = "default_cluster_min_size")]
    pub cluster_min_size: usize,

    /// Minimum cosine similarity for matching a marker to an existing face.
    #[serde(default = "default_match_similarity")]
    pub match_similarity: f32,

    /// Minimum cosine similarity for merging two faces of the same subject.
    #[serde(default = "default_merge_similarity")]
    pub merge_similarity: f32,
}

fn default_cluster_similarity() -> f32 {
    0.6
}

fn default_cluster_min_size() -> usize {
    2
}

fn default_match_similarity() -> f32 {
    0.55
}

fn default_merge_similarity() -> f32 {
    0.8
}

impl Default for FacesConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            cluster_similarity: default_cluster_similarity(),
            cluster_min_size: default_cluster_min_size(),
            match_similarity: default_match_similarity(),
            merge_similarity: default_merge_similarity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between maintenance cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Hour of day (0-23) maintenance may start.
    #[serde(default)]
    pub hours_start: Option<u8>,

    /// Hour of day (0-23) maintenance must stop.
    #[serde(default)]
    pub hours_end: Option<u8>,
}

fn default_interval_secs() -> u64 {
    15 * 60
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            hours_start: None,
            hours_end: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facekeeper")
        .join("index.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            faces: FacesConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults on first use.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Config file path, honoring `FACEKEEPER_CONFIG`.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("FACEKEEPER_CONFIG") {
            return PathBuf::from(path);
        }

        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facekeeper")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
db_path = "/tmp/index.db"

[faces]
disabled = true
cluster_min_size = 4
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/index.db"));
        assert!(config.faces.disabled);
        assert_eq!(config.faces.cluster_min_size, 4);
        assert!((config.faces.match_similarity - 0.55).abs() < 0.0001);
        assert_eq!(config.daemon.interval_secs, 900);
        assert!(config.daemon.hours_start.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.daemon.hours_start = Some(22);
        config.daemon.hours_end = Some(6);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.daemon.hours_start, Some(22));
        assert_eq!(loaded.daemon.hours_end, Some(6));
        assert!(!loaded.faces.disabled);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "faces = 3").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
