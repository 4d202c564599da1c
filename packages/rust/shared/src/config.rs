//! Application configuration for meetingorder.
//!
//! User config lives at `~/.meetingorder/meetingorder.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MeetingOrderError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "meetingorder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".meetingorder";

// ---------------------------------------------------------------------------
// Config structs (matching meetingorder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Matching oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Input and output file locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Calendar page scraping settings.
    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// `[oracle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of the chat-completions API (without the `/chat/completions` suffix).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used to match meetings against work orders.
    #[serde(default = "default_match_model")]
    pub match_model: String,

    /// Model used to read calendar screenshots.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Completion token ceiling for both calls.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            match_model: default_match_model(),
            vision_model: default_vision_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OracleConfig {
    /// Parse `base_url`, rejecting anything that is not an absolute URL.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            MeetingOrderError::config(format!("invalid oracle base_url '{}': {e}", self.base_url))
        })
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_match_model() -> String {
    "gpt-4o-mini".into()
}
fn default_vision_model() -> String {
    "gpt-4o".into()
}
fn default_max_tokens() -> u32 {
    3000
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Work-order CSV read on every run.
    #[serde(default = "default_workorders_path")]
    pub workorders: PathBuf,

    /// CSV export destination, overwritten on every run.
    #[serde(default = "default_output_path")]
    pub output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            workorders: default_workorders_path(),
            output: default_output_path(),
        }
    }
}

fn default_workorders_path() -> PathBuf {
    PathBuf::from("workorder.csv")
}
fn default_output_path() -> PathBuf {
    PathBuf::from("meetingorder.csv")
}

/// `[calendar]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Calendar page scraped by the `scrape` command when no snapshot is given.
    #[serde(default = "default_calendar_url")]
    pub url: String,

    /// How long to wait for the calendar grid before giving up.
    #[serde(default = "default_grid_timeout")]
    pub grid_timeout_secs: u64,

    /// How long to wait for event elements once the grid is present.
    #[serde(default = "default_event_timeout")]
    pub event_timeout_secs: u64,

    /// Delay between readiness polls of a live page.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            url: default_calendar_url(),
            grid_timeout_secs: default_grid_timeout(),
            event_timeout_secs: default_event_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_calendar_url() -> String {
    "https://outlook.office.com/calendar/".into()
}
fn default_grid_timeout() -> u64 {
    30
}
fn default_event_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    500
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.meetingorder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MeetingOrderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.meetingorder/meetingorder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MeetingOrderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MeetingOrderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MeetingOrderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MeetingOrderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MeetingOrderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the oracle API key from the configured env var.
///
/// Called once at process start; the returned key is handed to the oracle
/// client explicitly and never stored elsewhere.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.oracle.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(MeetingOrderError::config(format!(
            "oracle API key not found. Set the {var_name} environment variable."
        ))),
    }
}
