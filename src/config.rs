use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::loader::{DEFAULT_TEMPLATE_ZERO_PADDING, LoadOptions};

/// Neuropixels AP band sample rate.
pub const DEFAULT_SAMPLE_RATE: f64 = 30_000.0;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Defaults for loading sorting output directories.
    pub loader: LoaderConfig,
}

/// Loader defaults; CLI flags override each of these.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub sample_rate: f64,
    pub convert_to_seconds: bool,
    pub use_master_clock: bool,
    pub include_pcs: bool,
    pub template_zero_padding: usize,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            convert_to_seconds: true,
            use_master_clock: false,
            include_pcs: false,
            template_zero_padding: DEFAULT_TEMPLATE_ZERO_PADDING,
            workers: 0,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/spikeload/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::from_toml(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.loader.workers > 0 {
            self.loader.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Loader options seeded from this config.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            sample_rate: self.loader.sample_rate,
            convert_to_seconds: self.loader.convert_to_seconds,
            use_master_clock: self.loader.use_master_clock,
            include_pcs: self.loader.include_pcs,
            template_zero_padding: self.loader.template_zero_padding,
            workers: self.resolve_workers(),
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
