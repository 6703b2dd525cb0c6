use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default Phototag.ai keywords endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://server.phototag.ai/api/keywords";

/// Application name used for per-platform data/config directories.
const APP_DIR_NAME: &str = "phototag-ai";

/// Top-level configuration for the phototag-ai library.
///
/// Controls where profile settings live, how the classification service is
/// reached, and how the batch pipeline behaves. Profile parameters and the
/// API key are **not** part of this file; they live in the workspace settings
/// store (see [`crate::workspace::Workspace`]).
///
/// # Loading
///
/// ```rust,no_run
/// use phototag_ai::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.workspace.id = "studio".into();
/// config.pipeline.dry_run = true;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which workspace to open and where its stores live.
    pub workspace: WorkspaceConfig,
    /// Classification service connection settings.
    pub service: ServiceConfig,
    /// Batch pipeline behavior.
    pub pipeline: PipelineConfig,
    /// Attribute database location.
    pub attributes: AttributesConfig,
}

/// Workspace identity and storage roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub id: String,
    /// Root of the shared (per-workspace) settings store.
    pub settings_dir: Option<String>,
    /// Root of the per-user settings store.
    pub local_dir: Option<String>,
}

/// Phototag.ai service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest edge, in pixels, of thumbnails generated for formats the
    /// service can't consume directly.
    pub thumbnail_size: u32,
    /// If `true`, classify files but don't write any attributes.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesConfig {
    /// Path of the attribute database file.
    pub path: Option<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            id: "default-workspace".to_string(),
            settings_dir: None,
            local_dir: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: 1024,
            dry_run: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: WorkspaceConfig::default(),
            service: ServiceConfig::default(),
            pipeline: PipelineConfig::default(),
            attributes: AttributesConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the config file path (same directory as the executable).
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Directory of the shared, per-workspace settings store.
    pub fn settings_dir(&self) -> Result<PathBuf> {
        match &self.workspace.settings_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => {
                let base = dirs::data_dir().context("Could not determine data directory")?;
                Ok(base.join(APP_DIR_NAME).join(&self.workspace.id))
            }
        }
    }

    /// Directory of the per-user settings store.
    pub fn local_dir(&self) -> Result<PathBuf> {
        match &self.workspace.local_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => {
                let base = dirs::config_dir().context("Could not determine config directory")?;
                Ok(base.join(APP_DIR_NAME).join(&self.workspace.id))
            }
        }
    }

    /// Location of the attribute database.
    pub fn attributes_path(&self) -> Result<PathBuf> {
        match &self.attributes.path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(self.settings_dir()?.join("attributes.json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_point_at_phototag() {
        let config = Config::default();
        assert_eq!(config.service.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.pipeline.thumbnail_size, 1024);
        assert!(!config.pipeline.dry_run);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config.workspace.id, "default-workspace");
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.workspace.id = "studio".into();
        config.service.timeout_secs = 30;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.workspace.id, "studio");
        assert_eq!(loaded.service.timeout_secs, 30);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"pipeline": {"dry_run": true}}"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.pipeline.dry_run);
        assert_eq!(config.pipeline.thumbnail_size, 1024);
        assert_eq!(config.service.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn explicit_dirs_win() {
        let mut config = Config::default();
        config.workspace.settings_dir = Some("/tmp/shared".into());
        config.workspace.local_dir = Some("/tmp/local".into());
        assert_eq!(config.settings_dir().unwrap(), PathBuf::from("/tmp/shared"));
        assert_eq!(config.local_dir().unwrap(), PathBuf::from("/tmp/local"));
        assert_eq!(
            config.attributes_path().unwrap(),
            PathBuf::from("/tmp/shared/attributes.json")
        );
    }
}
