//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! API keys never live in the TOML; the config names a key file and the
//! keys are loaded from there at startup.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub pool: PoolConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub copier: CopierConfig,
    pub pipeline: PipelineConfig,
}

/// Key pool settings: one daily/rpm limit pair shared by all keys.
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    /// Newline-delimited API key file, one key per line
    pub key_file: PathBuf,
    pub daily_limit: u32,
    pub rpm_limit: u32,
    /// Wait before the pool's single rescan when every key is at a limit
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

/// Segmentation window settings
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Token budget per candidate window (embedding tokenizer)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Coarse window growth granularity, in words
    #[serde(default = "default_step_words")]
    pub step_words: usize,
}

/// Generation service settings
#[derive(Debug, Deserialize)]
pub struct CopierConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for CopierConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Driver input/output and retry settings
#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    /// JSONL input, one `{"id", "text"}` record per line
    pub passages_file: PathBuf,
    /// JSON segment store written by the pipeline
    pub segments_file: PathBuf,
    /// Wait between attempts at a failing passage
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_max_tokens() -> usize {
    450
}

fn default_step_words() -> usize {
    10
}

fn default_model() -> String {
    "gemini-2.5-flash".to_owned()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_owned()
}

fn default_timeout() -> u64 {
    60
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if config.pool.key_file.as_os_str().is_empty() {
            return Err(common::Error::Config("pool.key_file must not be empty".into()));
        }
        if config.pipeline.passages_file.as_os_str().is_empty() {
            return Err(common::Error::Config(
                "pipeline.passages_file must not be empty".into(),
            ));
        }
        if config.pipeline.segments_file.as_os_str().is_empty() {
            return Err(common::Error::Config(
                "pipeline.segments_file must not be empty".into(),
            ));
        }
        if config.pool.daily_limit == 0 {
            return Err(common::Error::Config(
                "pool.daily_limit must be greater than 0".into(),
            ));
        }
        if config.pool.rpm_limit == 0 {
            return Err(common::Error::Config(
                "pool.rpm_limit must be greater than 0".into(),
            ));
        }
        if config.engine.max_tokens == 0 {
            return Err(common::Error::Config(
                "engine.max_tokens must be greater than 0".into(),
            ));
        }
        if config.engine.step_words == 0 {
            return Err(common::Error::Config(
                "engine.step_words must be greater than 0".into(),
            ));
        }
        if config.copier.timeout_secs == 0 {
            return Err(common::Error::Config(
                "copier.timeout_secs must be greater than 0".into(),
            ));
        }
        if !config.copier.base_url.starts_with("http://")
            && !config.copier.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "copier.base_url must start with http:// or https://, got: {}",
                config.copier.base_url
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("segmenter.toml")
    }
}
