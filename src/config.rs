// ⚙️ Pipeline configuration
// JSON file + environment overrides, every field has a default

use crate::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_BATCH_SIZE: &str = "RNCP_BATCH_SIZE";
pub const ENV_PARTNER_DIR: &str = "RNCP_PARTNER_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Column holding the registration status
    pub status_column: String,

    /// Only rows whose status equals this value reach the extractor
    pub active_status: String,

    /// Field delimiter of the registry export
    pub delimiter: char,

    /// Directory of per-certification partner listings (`rncp-12345.csv`)
    pub partner_dir: Option<PathBuf>,

    /// Base URL used to build partner listing links
    pub listing_base_url: String,

    /// Rows per parallel batch; 0 keeps extraction sequential
    pub batch_size: usize,

    /// Stop enriching after this many entries
    pub max_enriched_entries: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            status_column: "Statut".to_string(),
            active_status: "Active".to_string(),
            delimiter: ',',
            partner_dir: None,
            listing_base_url: "https://www.francecompetences.fr".to_string(),
            batch_size: 256,
            max_enriched_entries: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file; missing keys fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content).map_err(|e| {
            ExtractError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = raw.trim().parse().map_err(|_| {
                ExtractError::Config(format!("{} must be an integer, got {:?}", ENV_BATCH_SIZE, raw))
            })?;
        }

        if let Some(dir) = lookup(ENV_PARTNER_DIR) {
            if !dir.trim().is_empty() {
                self.partner_dir = Some(PathBuf::from(dir));
            }
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.status_column.trim().is_empty() {
            return Err(ExtractError::Config("status_column is empty".to_string()));
        }
        self.delimiter_byte()?;
        Ok(())
    }

    /// Delimiter as the byte the csv reader expects; non-ASCII delimiters are rejected
    pub fn delimiter_byte(&self) -> Result<u8> {
        if !self.delimiter.is_ascii() {
            return Err(ExtractError::Config(format!(
                "delimiter {:?} is not a single-byte character",
                self.delimiter
            )));
        }
        Ok(self.delimiter as u8)
    }
}
