//! CLI configuration.
//!
//! Supplies *defaults* only — `maxconnections`/`retries`/`timeout`/output
//! directory — loaded from an optional YAML file with environment variable
//! overrides. No run history or other cross-invocation state is
//! persisted here; this core keeps none.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// CLI-wide defaults, overridable per invocation by flags.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Default bounded concurrency for `download-playlist`.
    /// Override: `YTDL_MAXCONNECTIONS`
    pub maxconnections: usize,

    /// Default retry budget per item.
    /// Override: `YTDL_RETRIES`
    pub retries: u32,

    /// Default inactivity timeout, in milliseconds.
    /// Override: `YTDL_TIMEOUT_MS`
    pub timeout_ms: u64,

    /// Default output filename template.
    pub output: String,

    /// Directory resolved output filenames are written under.
    /// Override: `YTDL_OUTPUT_DIR`
    pub output_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            maxconnections: 5,
            retries: 5,
            timeout_ms: 120_000,
            output: "{videoDetails.title}".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl CliConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("YTDL_MAXCONNECTIONS") {
            if let Ok(parsed) = val.parse() {
                self.maxconnections = parsed;
            }
        }
        if let Ok(val) = std::env::var("YTDL_RETRIES") {
            if let Ok(parsed) = val.parse() {
                self.retries = parsed;
            }
        }
        if let Ok(val) = std::env::var("YTDL_TIMEOUT_MS") {
            if let Ok(parsed) = val.parse() {
                self.timeout_ms = parsed;
            }
        }
        if let Ok(val) = std::env::var("YTDL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }
    }
}
