//! Configuration file support for Lexis.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/lexis/config.toml`.

use crate::catalog::LEVEL_PLACEHOLDER;
use crate::{Error, Result, SamplingMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Where vocabulary lists come from
///
/// When `paths` is non-empty those files are loaded instead of the level
/// files in `dir`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    #[serde(default = "default_first_level")]
    pub first_level: u32,

    #[serde(default = "default_max_level")]
    pub max_level: u32,

    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dir: default_catalog_dir(),
            file_pattern: default_file_pattern(),
            first_level: default_first_level(),
            max_level: default_max_level(),
            paths: Vec::new(),
        }
    }
}

/// New-item lottery parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_daily_quota")]
    pub daily_quota: usize,

    /// Slots reserved for never-seen items
    #[serde(default = "default_unseen_slots")]
    pub unseen_slots: usize,

    #[serde(default)]
    pub sampling: SamplingMode,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_quota: default_daily_quota(),
            unseen_slots: default_unseen_slots(),
            sampling: SamplingMode::default(),
        }
    }
}

/// External quiz generator
///
/// `command` is a program plus arguments that reads a prompt on stdin and
/// prints a JSON quiz on stdout. Empty means quizzes are built offline from
/// the catalog.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub command: Vec<String>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("lexis")
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_file_pattern() -> String {
    "ap_vocab_hsk{level}.json".into()
}

fn default_first_level() -> u32 {
    1
}

fn default_max_level() -> u32 {
    3
}

fn default_daily_quota() -> usize {
    8
}

fn default_unseen_slots() -> usize {
    6
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("lexis").join("config.toml")
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.schedule.daily_quota == 0 {
            return Err(Error::Config("schedule.daily_quota must be positive".into()));
        }
        if self.catalog.first_level > self.catalog.max_level {
            return Err(Error::Config(format!(
                "catalog.first_level {} exceeds max_level {}",
                self.catalog.first_level, self.catalog.max_level
            )));
        }
        if self.catalog.paths.is_empty() && !self.catalog.file_pattern.contains(LEVEL_PLACEHOLDER)
        {
            return Err(Error::Config(format!(
                "catalog.file_pattern must contain {}",
                LEVEL_PLACEHOLDER
            )));
        }
        Ok(())
    }

    /// Progress store location
    pub fn progress_path(data_dir: &Path) -> PathBuf {
        data_dir.join("user_progress.json")
    }

    /// Review log location
    pub fn review_log_path(data_dir: &Path) -> PathBuf {
        data_dir.join("reviews.wal")
    }

    /// Review CSV export location
    pub fn review_csv_path(data_dir: &Path) -> PathBuf {
        data_dir.join("reviews.csv")
    }
}
