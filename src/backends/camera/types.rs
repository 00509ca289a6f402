// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Direction a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraFacing {
    /// Rear camera
    #[default]
    Back,
    /// Selfie camera
    Front,
}

impl CameraFacing {
    /// The opposite facing, used by camera reversal
    pub fn reversed(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraFacing::Back => write!(f, "back"),
            CameraFacing::Front => write!(f, "front"),
        }
    }
}

/// Front light preference applied together with the full parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrontLightMode {
    /// Torch on as soon as the camera is configured
    On,
    /// Torch on in low light; there is no ambient sensor so this stays off
    Auto,
    /// Torch off
    #[default]
    Off,
}

/// Sensor rotation in degrees (clockwise)
///
/// Camera sensors may be physically mounted at various angles relative to the device.
/// The encoder receives this as its orientation hint so players rotate the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorRotation {
    /// No rotation (sensor is oriented correctly)
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// Create rotation from an integer degree value (normalised to 0-360).
    pub fn from_degrees_int(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => SensorRotation::Rotate90,
            180 => SensorRotation::Rotate180,
            270 => SensorRotation::Rotate270,
            _ => SensorRotation::None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, SensorRotation::Rotate90 | SensorRotation::Rotate270)
    }
}

impl fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_portrait(&self) -> bool {
        self.width < self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Same size with the long edge first
    pub fn landscape(&self) -> Size {
        if self.is_portrait() {
            Size::new(self.height, self.width)
        } else {
            *self
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Supported preview frame-rate range in frames per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpsRange {
    pub min_fps: u32,
    pub max_fps: u32,
}

impl FpsRange {
    pub const fn new(min_fps: u32, max_fps: u32) -> Self {
        Self { min_fps, max_fps }
    }

    pub fn contains(&self, fps: u32) -> bool {
        self.min_fps <= fps && fps <= self.max_fps
    }
}

impl fmt::Display for FpsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min_fps, self.max_fps)
    }
}

/// Focus strategy understood by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    /// One-shot auto focus, re-triggered by the focus loop
    Auto,
    /// Driver-managed continuous focus tuned for video
    ContinuousVideo,
    /// Fixed-focus lens
    Fixed,
}

impl fmt::Display for FocusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusMode::Auto => write!(f, "auto"),
            FocusMode::ContinuousVideo => write!(f, "continuous-video"),
            FocusMode::Fixed => write!(f, "fixed"),
        }
    }
}

/// Snapshot of a camera's parameters
///
/// Cloning a snapshot before mutating it gives the last-known-good set that
/// is restored when the device rejects a new one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CameraParameters {
    pub preview_size: Option<Size>,
    pub supported_preview_sizes: Vec<Size>,
    pub preview_fps_range: Option<FpsRange>,
    pub supported_fps_ranges: Vec<FpsRange>,
    pub focus_mode: Option<FocusMode>,
    pub supported_focus_modes: Vec<FocusMode>,
    pub torch_supported: bool,
    pub torch_on: bool,
}

impl CameraParameters {
    /// Flattened `key=value;` form, used when logging saved parameters
    pub fn flatten(&self) -> String {
        let join = |items: Vec<String>| items.join(",");
        let mut parts = Vec::new();
        if let Some(size) = self.preview_size {
            parts.push(format!("preview-size={}", size));
        }
        parts.push(format!(
            "preview-size-values={}",
            join(self.supported_preview_sizes.iter().map(Size::to_string).collect())
        ));
        if let Some(range) = self.preview_fps_range {
            parts.push(format!("preview-fps-range={}", range));
        }
        parts.push(format!(
            "preview-fps-range-values={}",
            join(self.supported_fps_ranges.iter().map(FpsRange::to_string).collect())
        ));
        if let Some(mode) = self.focus_mode {
            parts.push(format!("focus-mode={}", mode));
        }
        parts.push(format!(
            "focus-mode-values={}",
            join(self.supported_focus_modes.iter().map(FocusMode::to_string).collect())
        ));
        if self.torch_supported {
            let mode = if self.torch_on { "torch" } else { "off" };
            parts.push(format!("flash-mode={}", mode));
        }
        parts.join(";")
    }

    pub fn supports_focus(&self, mode: FocusMode) -> bool {
        self.supported_focus_modes.contains(&mode)
    }
}

impl fmt::Display for CameraParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten())
    }
}

/// A camera as reported by device enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Enumeration index
    pub index: usize,
    /// Human-readable device name
    pub name: String,
    /// Direction the camera faces
    pub facing: CameraFacing,
    /// Sensor mounting orientation
    pub orientation: SensorRotation,
    /// Platform path (e.g. `/dev/video0`), when there is one
    pub path: Option<String>,
}

/// An opened physical camera
///
/// `index` and `facing` never change while the handle is alive; the
/// parameter snapshot is refreshed whenever parameters are re-applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraHandle {
    index: usize,
    facing: CameraFacing,
    orientation: SensorRotation,
    pub parameters: CameraParameters,
}

impl CameraHandle {
    pub fn new(info: &CameraInfo, parameters: CameraParameters) -> Self {
        Self {
            index: info.index,
            facing: info.facing,
            orientation: info.orientation,
            parameters,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn orientation(&self) -> SensorRotation {
        self.orientation
    }
}

impl fmt::Display for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Camera #{} : {},{}", self.index, self.facing, self.orientation)
    }
}

/// What an encoder needs to take over an unlocked camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBinding {
    pub index: usize,
    pub path: Option<String>,
    pub orientation: SensorRotation,
}

/// Where preview frames are drawn
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SurfaceTarget {
    /// No visible output; frames only reach the preview callback
    #[default]
    Headless,
    /// Named platform sink (e.g. a GStreamer video sink factory)
    Sink(String),
}

/// Ownership of the camera device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    /// No device open
    #[default]
    Closed,
    /// Device locked by the session, used for preview
    Preview,
    /// Device unlocked and handed to the encoder
    Encoder,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Closed => write!(f, "closed"),
            LockState::Preview => write!(f, "locked for preview"),
            LockState::Encoder => write!(f, "unlocked for encoder"),
        }
    }
}

/// A preview frame delivered to the preview callback
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub data: Arc<[u8]>,
    pub size: Size,
    pub captured_at: Instant,
}

/// Callback receiving preview frames
pub type PreviewCallback = Box<dyn FnMut(&PreviewFrame) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_normalisation() {
        assert_eq!(SensorRotation::from_degrees_int(-90), SensorRotation::Rotate270);
        assert_eq!(SensorRotation::from_degrees_int(450), SensorRotation::Rotate90);
        assert!(SensorRotation::Rotate90.swaps_dimensions());
        assert!(!SensorRotation::Rotate180.swaps_dimensions());
    }

    #[test]
    fn test_flatten_lists_current_and_supported_values() {
        let params = CameraParameters {
            preview_size: Some(Size::new(1280, 720)),
            supported_preview_sizes: vec![Size::new(1280, 720), Size::new(640, 480)],
            preview_fps_range: Some(FpsRange::new(15, 30)),
            supported_fps_ranges: vec![FpsRange::new(15, 30)],
            focus_mode: Some(FocusMode::Auto),
            supported_focus_modes: vec![FocusMode::Auto],
            torch_supported: true,
            torch_on: false,
        };
        let flat = params.flatten();
        assert!(flat.contains("preview-size=1280x720"));
        assert!(flat.contains("preview-size-values=1280x720,640x480"));
        assert!(flat.contains("preview-fps-range=15-30"));
        assert!(flat.contains("focus-mode=auto"));
        assert!(flat.contains("flash-mode=off"));
    }

    #[test]
    fn test_facing_reversal() {
        assert_eq!(CameraFacing::Front.reversed(), CameraFacing::Back);
        assert_eq!(CameraFacing::Back.reversed().reversed(), CameraFacing::Back);
    }
}
