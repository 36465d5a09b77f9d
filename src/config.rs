use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::display::{DisplayMode, DEFAULT_BITS_PER_SAMPLE};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feeder: FeederConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
pub struct FeederConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub channel: usize,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub mode: DisplayMode,
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            channel: 0,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::default(),
            bits_per_sample: default_bits_per_sample(),
        }
    }
}

pub fn default_tick_ms() -> u64 { 100 }
fn default_bits_per_sample() -> u16 { DEFAULT_BITS_PER_SAMPLE }

/// `bandscope.toml` in the working directory, then the user config dirs.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("bandscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("bandscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("bandscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}
