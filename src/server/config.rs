//! Server configuration
//!
//! Defaults, optionally overlaid by a YAML file, then by CLI flags or
//! environment variables (see the `sheets-server` binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::SheetResult;

pub const DEFAULT_PORT: u16 = 2112;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding sheet records, the sheet index and credentials.
    pub data_dir: PathBuf,
    /// Seconds between background saves of changed sheets.
    pub save_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("spreadsheets"),
            save_interval_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Load a YAML config file; missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> SheetResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> SheetResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }
}
