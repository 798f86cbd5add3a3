use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::encoder::{ExportFormat, Mp3Bitrate};
use crate::utils::timing::TimingModel;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_build")]
    pub build_folder: String,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub video: VideoConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AudioConfig {
    #[serde(default = "default_crossfade_seconds")]
    pub crossfade_seconds: f64,
    #[serde(default = "default_sfx_volume")]
    pub default_sfx_volume: f32,
    #[serde(default)]
    pub export_format: ExportFormat,
    #[serde(default)]
    pub mp3_bitrate: Mp3Bitrate,
    #[serde(default)]
    pub timing: TimingModel,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Same-origin proxy endpoint; catalog URLs are passed as `?url=`.
    pub base_url: Option<String>,
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VideoConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

fn default_output() -> String {
    "output".to_string()
}
fn default_build() -> String {
    "build".to_string()
}
fn default_crossfade_seconds() -> f64 {
    crate::services::compositor::CROSSFADE_SECONDS
}
fn default_sfx_volume() -> f32 {
    crate::services::compositor::DEFAULT_SFX_VOLUME
}
fn default_allowed_hosts() -> Vec<String> {
    vec![
        "freesound.org".to_string(),
        "cdn.freesound.org".to_string(),
        "jamendo.com".to_string(),
        "storage.jamendo.com".to_string(),
        "prod-1.storage.jamendo.com".to_string(),
    ]
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_concurrency() -> usize {
    4
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_fps() -> u32 {
    30
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_folder: default_output(),
            build_folder: default_build(),
            audio: AudioConfig::default(),
            proxy: ProxyConfig::default(),
            video: VideoConfig::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            crossfade_seconds: default_crossfade_seconds(),
            default_sfx_volume: default_sfx_volume(),
            export_format: ExportFormat::default(),
            mp3_bitrate: Mp3Bitrate::default(),
            timing: TimingModel::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            allowed_hosts: default_allowed_hosts(),
            timeout_seconds: default_timeout_seconds(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

impl VideoConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("video width/height must be non-zero");
        }
        if self.fps == 0 {
            anyhow::bail!("video fps must be non-zero");
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            anyhow::bail!("video width/height must be even (required for yuv420p mp4 output)");
        }
        Ok(())
    }
}

impl Config {
    /// Loads `config.yml` from the working directory, falling back to defaults
    /// when it does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if !path.exists() {
            log::info!("{} not found, using default settings", DEFAULT_CONFIG_PATH);
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.build_folder)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_fills_defaults() -> Result<()> {
        let yaml = "audio:\n  export_format: mp3\n  mp3_bitrate: 320\nproxy:\n  base_url: http://localhost:3000/api/proxy\n";
        let config: Config = serde_yaml_ng::from_str(yaml)?;

        assert_eq!(config.output_folder, "output");
        assert_eq!(config.audio.export_format, ExportFormat::Mp3);
        assert_eq!(config.audio.mp3_bitrate, Mp3Bitrate::Kbps320);
        assert_eq!(config.audio.crossfade_seconds, 1.5);
        assert_eq!(config.audio.timing, TimingModel::default());
        assert_eq!(
            config.proxy.base_url.as_deref(),
            Some("http://localhost:3000/api/proxy")
        );
        assert!(config
            .proxy
            .allowed_hosts
            .contains(&"cdn.freesound.org".to_string()));
        assert!(!config.video.enabled);
        Ok(())
    }

    #[test]
    fn unsupported_bitrate_is_rejected() {
        let yaml = "audio:\n  mp3_bitrate: 100\n";
        assert!(serde_yaml_ng::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn written_config_loads_back() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.video.enabled = true;
        config.audio.default_sfx_volume = 0.7;
        fs::write(&path, serde_yaml_ng::to_string(&config)?)?;

        let loaded = Config::load_from(&path)?;
        assert!(loaded.video.enabled);
        assert_eq!(loaded.audio.default_sfx_volume, 0.7);
        Ok(())
    }

    #[test]
    fn video_dimensions_must_be_even() {
        let mut video = VideoConfig::default();
        assert!(video.validate().is_ok());
        video.width = 1279;
        assert!(video.validate().is_err());
        video.width = 1280;
        video.fps = 0;
        assert!(video.validate().is_err());
    }

    #[test]
    fn explicit_missing_path_fails() {
        assert!(Config::load_from(Path::new("/nope/config.yml")).is_err());
    }
}
