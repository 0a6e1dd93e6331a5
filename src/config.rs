use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub resample: ResampleConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_frame_length_ms")]
    pub frame_length_ms: f64,
    #[serde(default = "default_frame_index")]
    pub frame_index: usize,
    #[serde(default)]
    pub legacy_windowing: bool,
    #[serde(default)]
    pub bit_depth: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ResampleConfig {
    #[serde(default = "default_rates")]
    pub rates: Vec<u32>,
    #[serde(default)]
    pub load_rate: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default)]
    pub font_url: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_length_ms: default_frame_length_ms(),
            frame_index: default_frame_index(),
            legacy_windowing: false,
            bit_depth: None,
        }
    }
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            rates: default_rates(),
            load_rate: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            width: default_width(),
            height: default_height(),
            font: None,
            font_url: None,
        }
    }
}

fn default_frame_length_ms() -> f64 { 20.0 }
fn default_frame_index() -> usize { 1 }
fn default_rates() -> Vec<u32> { vec![16000, 8000] }
fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_width() -> u32 { 1000 }
fn default_height() -> u32 { 400 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path, then `./specframe.toml`, then the user config directories.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("specframe.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("specframe").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("specframe").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
