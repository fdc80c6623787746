use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use time::Duration;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "BookmarkRanker";
const APP_NAME: &str = "bmrank";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load();
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("BMRANK_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("BMRANK_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let database_path = data_root.join("bmrank.db");

        Ok(Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
        })
    }

    /// Lays every path out under one root; used by tests and `--data-dir` style sandboxes.
    pub fn rooted_at(root: &Path) -> Self {
        let config_dir = root.join("config");
        let data_dir = root.join("data");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            database_path: data_dir.join("bmrank.db"),
            data_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ranking: RankingOptions,
    pub history: HistoryOptions,
    pub display: DisplayOptions,
    pub storage: StorageOptions,
}

impl AppConfig {
    fn post_load(&mut self) {
        if self.ranking.recent_days == 0 {
            tracing::warn!("recent_days must be positive, falling back to 7");
            self.ranking.recent_days = RankingOptions::default().recent_days;
        }
        if self.display.path_separator.is_empty() {
            self.display.path_separator = DisplayOptions::default().path_separator;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingOptions {
    /// Zeroes the frequency dimension instead of removing it from the sort.
    pub frequency_enabled: bool,
    pub recency_enabled: bool,
    pub frequent_visit_threshold: u32,
    pub recent_days: u32,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            frequency_enabled: true,
            recency_enabled: true,
            frequent_visit_threshold: 10,
            recent_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryOptions {
    pub max_results: usize,
    pub lookback_days: u32,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            max_results: 1000,
            lookback_days: 90,
        }
    }
}

impl HistoryOptions {
    pub fn lookback(&self) -> Duration {
        Duration::days(self.lookback_days as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    pub path_separator: String,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            path_separator: " > ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            wal_autocheckpoint: 1000,
        }
    }
}
