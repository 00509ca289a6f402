// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default recording width
pub const DEFAULT_WIDTH: u32 = 1920;
/// Default recording height
pub const DEFAULT_HEIGHT: u32 = 1080;
/// Default recording frame rate
pub const DEFAULT_FRAME_RATE: u32 = 30;
/// Default minimum take length
pub const DEFAULT_MIN_DURATION_MS: u64 = 3_000;
/// Default maximum take length
pub const DEFAULT_MAX_DURATION_MS: u64 = 15_000;
/// Default output base name (without extension)
pub const DEFAULT_BASE_NAME: &str = "sample";
/// Container extension of every take
pub const FILE_EXTENSION: &str = "mp4";
/// Bits per configured kilobit
pub const BITS_PER_KILOBIT: u32 = 1_000;

/// Video encoder bitrate presets
///
/// Used to derive a bitrate when the configuration does not pin one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    /// Get all preset variants for iteration
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Bitrate in kbit/s for a given resolution
    ///
    /// - SD (640x480): Low=1, Medium=2, High=4 Mbps
    /// - HD (1280x720): Low=2.5, Medium=5, High=10 Mbps
    /// - Full HD (1920x1080): Low=4, Medium=8, High=16 Mbps
    /// - 4K (3840x2160): Low=15, Medium=30, High=50 Mbps
    pub fn bitrate_kbps(&self, width: u32, height: u32) -> u32 {
        // Portrait targets are tiered by their long edge
        let tier = ResolutionTier::for_width(width.max(height));

        match (tier, self) {
            (ResolutionTier::SD, BitratePreset::Low) => 1_000,
            (ResolutionTier::SD, BitratePreset::Medium) => 2_000,
            (ResolutionTier::SD, BitratePreset::High) => 4_000,
            (ResolutionTier::HD, BitratePreset::Low) => 2_500,
            (ResolutionTier::HD, BitratePreset::Medium) => 5_000,
            (ResolutionTier::HD, BitratePreset::High) => 10_000,
            (ResolutionTier::FullHD, BitratePreset::Low) => 4_000,
            (ResolutionTier::FullHD, BitratePreset::Medium) => 8_000,
            (ResolutionTier::FullHD, BitratePreset::High) => 16_000,
            (ResolutionTier::FourK, BitratePreset::Low) => 15_000,
            (ResolutionTier::FourK, BitratePreset::Medium) => 30_000,
            (ResolutionTier::FourK, BitratePreset::High) => 50_000,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// 640x480 and below
    SD,
    /// up to 1280x720
    HD,
    /// up to 1920x1080
    FullHD,
    /// anything larger
    FourK,
}

impl ResolutionTier {
    pub fn for_width(width: u32) -> Self {
        if width <= 640 {
            ResolutionTier::SD
        } else if width <= 1280 {
            ResolutionTier::HD
        } else if width <= 1920 {
            ResolutionTier::FullHD
        } else {
            ResolutionTier::FourK
        }
    }
}

/// Format a bitrate for logs and CLI output
pub fn format_bitrate(kbps: u32) -> String {
    if kbps >= 1000 {
        format!("{:.1} Mbps", kbps as f64 / 1000.0)
    } else {
        format!("{} kbps", kbps)
    }
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Period of the duration timer
    pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

    /// Period of the auto-focus management loop
    pub const AUTO_FOCUS_INTERVAL: Duration = Duration::from_millis(2000);

    /// How long the encoder waits for EOS to drain on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// How long the encoder watches the bus for start errors
    pub const START_CHECK_MS: u64 = 500;
}

/// Preview size selection bounds
pub mod preview {
    /// Numerator of the preview-to-target ratio
    pub const TARGET_RATIO_NUM: u32 = 5;
    /// Denominator of the preview-to-target ratio
    pub const TARGET_RATIO_DEN: u32 = 8;
}

/// Application information utilities
pub mod app_info {
    /// Application version stamped by build.rs
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_tiers() {
        assert_eq!(ResolutionTier::for_width(3840), ResolutionTier::FourK);
        assert_eq!(ResolutionTier::for_width(1920), ResolutionTier::FullHD);
        assert_eq!(ResolutionTier::for_width(1280), ResolutionTier::HD);
        assert_eq!(ResolutionTier::for_width(320), ResolutionTier::SD);
    }

    #[test]
    fn test_portrait_uses_long_edge() {
        assert_eq!(
            BitratePreset::Medium.bitrate_kbps(1080, 1920),
            BitratePreset::Medium.bitrate_kbps(1920, 1080)
        );
    }

    #[test]
    fn test_format_bitrate() {
        assert_eq!(format_bitrate(512), "512 kbps");
        assert_eq!(format_bitrate(8_000), "8.0 Mbps");
    }
}
