//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/clickscope/config.toml`
//!
//! Paths follow the XDG Base Directory layout:
//! - Config: `$XDG_CONFIG_HOME/clickscope/` (~/.config/clickscope/)
//! - Data: `$XDG_DATA_HOME/clickscope/` (~/.local/share/clickscope/)
//! - State/Logs: `$XDG_STATE_HOME/clickscope/` (~/.local/state/clickscope/)

use crate::analytics::delay_search::{
    DEFAULT_DELAY_BIN_WIDTH, DEFAULT_SEARCH_STEP, MAX_DELAY_BINS,
};
use crate::analytics::product_revenue::DEFAULT_HISTOGRAM_BUCKETS;
use crate::error::{Error, Result};
use crate::store::DataSource;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Where the five datasets are read from
    #[serde(default)]
    pub data: DataConfig,

    /// Revenue histogram settings
    #[serde(default)]
    pub histogram: HistogramConfig,

    /// Delay vs. search heat map settings
    #[serde(default)]
    pub heatmap: HeatmapConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dataset location
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataConfig {
    /// Directory holding the `<dataset>.json` files
    pub dir: Option<PathBuf>,
    /// HTTP base URL serving the same files; takes precedence over `dir`
    pub base_url: Option<String>,
}

/// Revenue histogram settings
#[derive(Debug, Clone, Deserialize)]
pub struct HistogramConfig {
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bucket_count: default_bucket_count(),
        }
    }
}

fn default_bucket_count() -> usize {
    DEFAULT_HISTOGRAM_BUCKETS
}

/// Heat map binning
#[derive(Debug, Clone, Deserialize)]
pub struct HeatmapConfig {
    /// Width of one delay bin in minutes
    #[serde(default = "default_delay_bin_width")]
    pub delay_bin_width: f64,

    /// Fixed number of delay bins; overrides `delay_bin_width` when set
    #[serde(default)]
    pub delay_bin_count: Option<usize>,

    /// Width of one search-count bucket
    #[serde(default = "default_search_step")]
    pub search_step: u64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            delay_bin_width: default_delay_bin_width(),
            delay_bin_count: None,
            search_step: default_search_step(),
        }
    }
}

fn default_delay_bin_width() -> f64 {
    DEFAULT_DELAY_BIN_WIDTH
}

fn default_search_step() -> u64 {
    DEFAULT_SEARCH_STEP
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of rotated log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would produce empty or infinite binnings.
    pub fn validate(&self) -> Result<()> {
        if self.histogram.bucket_count == 0 {
            return Err(Error::Config(
                "histogram.bucket_count must be at least 1".to_string(),
            ));
        }
        let width = self.heatmap.delay_bin_width;
        if width.is_nan() || width.is_infinite() || width <= 0.0 {
            return Err(Error::Config(
                "heatmap.delay_bin_width must be a positive number".to_string(),
            ));
        }
        if let Some(count) = self.heatmap.delay_bin_count {
            if count == 0 || count > MAX_DELAY_BINS {
                return Err(Error::Config(format!(
                    "heatmap.delay_bin_count must be between 1 and {}",
                    MAX_DELAY_BINS
                )));
            }
        }
        if self.heatmap.search_step == 0 {
            return Err(Error::Config(
                "heatmap.search_step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured dataset source. A base URL wins over a directory.
    pub fn data_source(&self) -> DataSource {
        match (&self.data.base_url, &self.data.dir) {
            (Some(url), _) => DataSource::Http(url.clone()),
            (None, Some(dir)) => DataSource::Directory(dir.clone()),
            (None, None) => DataSource::Directory(Self::default_data_dir()),
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/clickscope/config.toml` (~/.config/clickscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("clickscope").join("config.toml")
    }

    /// `$XDG_DATA_HOME/clickscope/` (~/.local/share/clickscope/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("clickscope")
    }

    /// Default location of the datasets when `[data]` is empty
    ///
    /// `$XDG_DATA_HOME/clickscope/subset_data/`
    pub fn default_data_dir() -> PathBuf {
        Self::data_dir().join("subset_data")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/clickscope/` (~/.local/state/clickscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("clickscope")
    }

    /// Directory holding the daily log files
    ///
    /// Files inside are named `clickscope.log.YYYY-MM-DD`.
    pub fn log_dir() -> PathBuf {
        Self::state_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.histogram.bucket_count, 20);
        assert_eq!(config.heatmap.delay_bin_width, 4000.0);
        assert_eq!(config.heatmap.delay_bin_count, None);
        assert_eq!(config.heatmap.search_step, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[data]
dir = "/srv/clickstream"

[heatmap]
delay_bin_count = 8

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.data_source(),
            DataSource::Directory(PathBuf::from("/srv/clickstream"))
        );
        assert_eq!(config.heatmap.delay_bin_count, Some(8));
        assert_eq!(config.heatmap.search_step, 10);
        assert_eq!(config.histogram.bucket_count, 20);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_base_url_wins_over_dir() {
        let toml = r#"
[data]
dir = "/srv/clickstream"
base_url = "https://data.example.com/subset"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.data_source(),
            DataSource::Http("https://data.example.com/subset".to_string())
        );
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.histogram.bucket_count = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.heatmap.delay_bin_width = 0.0;
        assert!(config.validate().is_err());

        config.heatmap.delay_bin_width = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.heatmap.search_step = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.heatmap.delay_bin_count = Some(0);
        assert!(config.validate().is_err());

        config.heatmap.delay_bin_count = Some(MAX_DELAY_BINS + 1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("delay_bin_count"));

        config.heatmap.delay_bin_count = Some(MAX_DELAY_BINS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[histogram]\nbucket_count = 0").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("bucket_count"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[histogram]\nbucket_count = 12").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.histogram.bucket_count, 12);
    }

    #[test]
    fn test_paths_end_with_app_name() {
        assert!(Config::config_path().ends_with("clickscope/config.toml"));
        assert!(Config::log_dir().ends_with("clickscope"));
        assert!(Config::default_data_dir().ends_with("clickscope/subset_data"));
    }
}
