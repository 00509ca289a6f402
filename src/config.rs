// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::{CameraFacing, FrontLightMode, Size};
use crate::backends::camera::ParameterRequest;
use crate::constants::{self, BitratePreset, BITS_PER_KILOBIT};
use crate::errors::{AppError, AppResult};
use crate::pipelines::video::state::{DurationPolicy, PauseStrategy, VideoTarget};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

const CONFIG_DIR: &str = "camera-recorder";
const CONFIG_FILE: &str = "config.json";

/// Persisted recorder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recording width
    pub video_width: u32,
    /// Recording height
    pub video_height: u32,
    /// Recording frame rate
    pub frame_rate: u32,
    /// Bit-rate in kilobits per second; derived from the preset when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate_kbps: Option<u32>,
    /// Preset used when no bit-rate is pinned
    pub bitrate_preset: BitratePreset,
    /// Preferred camera facing
    pub facing: CameraFacing,
    /// Manual camera index, overriding the facing preference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_index: Option<usize>,
    /// Open the camera as soon as the preview surface is available
    pub auto_open: bool,
    /// Shortest keepable take (0 = no minimum)
    pub min_duration_ms: u64,
    /// Automatic stop (0 = no maximum)
    pub max_duration_ms: u64,
    /// Initial torch setting
    pub front_light_mode: FrontLightMode,
    /// Output directory; `~/Videos/recorder` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Output file name without extension
    pub base_name: String,
    /// Force a pause strategy instead of following the encoder capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_strategy: Option<PauseStrategy>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_width: constants::DEFAULT_WIDTH,
            video_height: constants::DEFAULT_HEIGHT,
            frame_rate: constants::DEFAULT_FRAME_RATE,
            bit_rate_kbps: None,
            bitrate_preset: BitratePreset::default(),
            facing: CameraFacing::Back,
            camera_index: None,
            auto_open: true,
            min_duration_ms: constants::DEFAULT_MIN_DURATION_MS,
            max_duration_ms: constants::DEFAULT_MAX_DURATION_MS,
            front_light_mode: FrontLightMode::Off,
            output_dir: None,
            base_name: constants::DEFAULT_BASE_NAME.to_string(),
            pause_strategy: None,
        }
    }
}

impl Config {
    /// Location of the config file, if the platform has a config directory
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load the config, falling back to defaults when missing or unreadable
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            warn!("No config directory on this platform, using defaults");
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                }
                Self::default()
            }
        }
    }

    pub fn load_from(path: &std::path::Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Persist the config as pretty JSON
    pub fn save(&self) -> AppResult<()> {
        let path = Self::path()
            .ok_or_else(|| AppError::Config("no config directory on this platform".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Bits per second handed to the encoder
    pub fn bit_rate(&self) -> u32 {
        let kbps = self.bit_rate_kbps.unwrap_or_else(|| {
            self.bitrate_preset
                .bitrate_kbps(self.video_width, self.video_height)
        });
        kbps.saturating_mul(BITS_PER_KILOBIT)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(crate::storage::default_video_dir)
    }

    /// Runtime capture configuration
    pub fn capture_config(&self) -> AppResult<CaptureConfig> {
        if self.video_width == 0 || self.video_height == 0 || self.frame_rate == 0 {
            return Err(AppError::Config(format!(
                "invalid video format {}x{}@{}",
                self.video_width, self.video_height, self.frame_rate
            )));
        }
        if self.base_name.trim().is_empty() {
            return Err(AppError::Config("empty output base name".into()));
        }
        let duration = DurationPolicy::new(self.min_duration_ms, self.max_duration_ms)?;

        Ok(CaptureConfig {
            target: VideoTarget {
                width: self.video_width,
                height: self.video_height,
                frame_rate: self.frame_rate,
                bit_rate: self.bit_rate(),
            },
            facing: self.facing,
            camera_index: self.camera_index,
            auto_open: self.auto_open,
            duration,
            front_light: self.front_light_mode,
            output_dir: self.output_dir(),
            base_name: self.base_name.clone(),
            pause_strategy: self.pause_strategy,
        })
    }
}

/// Validated settings the recorder runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub target: VideoTarget,
    pub facing: CameraFacing,
    pub camera_index: Option<usize>,
    pub auto_open: bool,
    pub duration: DurationPolicy,
    pub front_light: FrontLightMode,
    pub output_dir: PathBuf,
    pub base_name: String,
    pub pause_strategy: Option<PauseStrategy>,
}

impl CaptureConfig {
    /// What the camera session should configure the device for
    pub fn parameter_request(&self) -> ParameterRequest {
        ParameterRequest {
            target: Size::new(self.target.width, self.target.height),
            frame_rate: self.target.frame_rate,
            front_light: self.front_light,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let config = Config::default();
        Self {
            target: VideoTarget {
                width: config.video_width,
                height: config.video_height,
                frame_rate: config.frame_rate,
                bit_rate: config.bit_rate(),
            },
            facing: config.facing,
            camera_index: None,
            auto_open: config.auto_open,
            duration: DurationPolicy::default(),
            front_light: config.front_light_mode,
            output_dir: config.output_dir(),
            base_name: config.base_name,
            pause_strategy: None,
        }
    }
}
