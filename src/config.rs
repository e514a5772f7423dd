use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "mixscope.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub stems: StemsConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    /// Per-track time budget in seconds; 0 disables it
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: f64,
    #[serde(default)]
    pub partial: bool,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

#[derive(Debug, Deserialize)]
pub struct StemsConfig {
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_script")]
    pub script: PathBuf,
    #[serde(default)]
    pub ca_bundle: Option<PathBuf>,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            partial: false,
            parallel: default_parallel(),
        }
    }
}

impl Default for StemsConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            script: default_script(),
            ca_bundle: None,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

pub fn default_deadline_secs() -> f64 { 120.0 }
fn default_parallel() -> bool { true }
pub fn default_python() -> String { "python3".into() }
pub fn default_script() -> PathBuf { PathBuf::from("separate_stems.py") }
pub fn default_heartbeat_secs() -> f64 { 2.0 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::debug!("{}: {}", path.display(), e);
            None
        }
    }
}

/// Explicit path first, then ./mixscope.toml, ~/.config/mixscope/config.toml
/// and the platform config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("mixscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("mixscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
