//! Configuration loading and data folder resolution

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::scoring::Thresholds;
use crate::{Error, Result};

/// Environment variable overriding the data folder location
pub const DATA_FOLDER_ENV: &str = "GRILLE_DATA_FOLDER";

const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REMEDIATION_THRESHOLD: u8 = 50;
/// Negative threshold values mean "unset": no band is assigned
const UNSET_THRESHOLD: i16 = -1;

/// Engine configuration, loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct GrilleConfig {
    /// Base URL of the remote control service
    pub remote_url: String,
    /// Fixed recipient of the close-of-control notification
    pub notify_recipient: String,
    /// Fixed submission timeout, after which a request counts as failed
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
    /// Lower banding threshold (percentage), negative when unset
    #[serde(default = "default_unset_threshold")]
    pub score_low: i16,
    /// Upper banding threshold (percentage), negative when unset
    #[serde(default = "default_unset_threshold")]
    pub score_high: i16,
    /// Overall percentage below which a plan-of-action is required
    #[serde(default = "default_remediation_threshold")]
    pub remediation_threshold: u8,
    /// Explicit data folder; resolution falls back to env then OS default
    #[serde(default)]
    pub data_folder: Option<PathBuf>,
}

fn default_submit_timeout() -> u64 {
    DEFAULT_SUBMIT_TIMEOUT_SECS
}

fn default_unset_threshold() -> i16 {
    UNSET_THRESHOLD
}

fn default_remediation_threshold() -> u8 {
    DEFAULT_REMEDIATION_THRESHOLD
}

impl GrilleConfig {
    /// Parse and validate a TOML configuration string
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: GrilleConfig =
            toml::from_str(input).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.remote_url.is_empty() {
            return Err(Error::Config("remote_url must not be empty".to_string()));
        }
        if self.remediation_threshold > 100 {
            return Err(Error::Config(format!(
                "remediation_threshold above 100: {}",
                self.remediation_threshold
            )));
        }
        // Validates ordering when both thresholds are set
        self.thresholds()?;
        Ok(())
    }

    /// Banding thresholds, `None` when either side is unset
    pub fn thresholds(&self) -> Result<Option<Thresholds>> {
        if self.score_low < 0 || self.score_high < 0 {
            return Ok(None);
        }
        if self.score_low > 100 || self.score_high > 100 {
            return Err(Error::Config(format!(
                "score thresholds above 100: low={} high={}",
                self.score_low, self.score_high
            )));
        }
        Thresholds::new(self.score_low as u8, self.score_high as u8).map(Some)
    }

    /// Resolve the sqlite database path
    ///
    /// Priority order: explicit `data_folder` from the config file, then
    /// the environment variable, then the OS-dependent default data
    /// directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_folder().join("grille.db")
    }

    fn data_folder(&self) -> PathBuf {
        if let Some(folder) = &self.data_folder {
            return folder.clone();
        }
        if let Ok(folder) = std::env::var(DATA_FOLDER_ENV) {
            return PathBuf::from(folder);
        }
        dirs::data_local_dir()
            .map(|d| d.join("grille"))
            .unwrap_or_else(|| PathBuf::from("./grille_data"))
    }
}
