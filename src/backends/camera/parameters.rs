// SPDX-License-Identifier: GPL-3.0-only

//! Camera parameter selection and application
//!
//! The desired parameter set is derived from the current snapshot and a
//! [`ParameterRequest`]. Application is two-phase: [`try_apply`] pushes the
//! desired set, and when the device refuses it [`fallback`] restores the
//! last-known-good snapshot and retries with the safe-mode subset.

use super::types::{CameraParameters, FocusMode, FpsRange, FrontLightMode, Size};
use super::CameraDevice;
use crate::constants::preview::{TARGET_RATIO_DEN, TARGET_RATIO_NUM};
use crate::errors::CameraResult;
use tracing::{debug, info, warn};

/// What the session wants from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterRequest {
    /// Recording resolution; the preview is sized from it
    pub target: Size,
    /// Recording frame rate
    pub frame_rate: u32,
    pub front_light: FrontLightMode,
}

/// Which parameter set ended up on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The full desired set was accepted
    Full,
    /// The full set was rejected; the safe-mode subset was accepted
    SafeMode,
    /// Both attempts were rejected; the device keeps its previous parameters
    LastKnownGood,
}

/// Scale a target dimension to the preview ratio and clamp it to the hardware range
pub fn desired_dimension(target: u32, hard_min: u32, hard_max: u32) -> u32 {
    let scaled = u64::from(target) * u64::from(TARGET_RATIO_NUM) / u64::from(TARGET_RATIO_DEN);
    let dim = u32::try_from(scaled).unwrap_or(u32::MAX);
    if hard_min > hard_max {
        return dim;
    }
    dim.clamp(hard_min, hard_max)
}

/// Pick the supported preview size closest to 5/8 of the target
///
/// Sizes are compared in landscape form so a portrait target still matches
/// the sensor's landscape modes. Distance is `|dw| + |dh|`; ties go to the
/// larger size.
pub fn choose_preview_size(supported: &[Size], target: Size) -> Option<Size> {
    let sizes: Vec<Size> = supported.iter().map(Size::landscape).collect();
    let min_w = sizes.iter().map(|s| s.width).min()?;
    let max_w = sizes.iter().map(|s| s.width).max()?;
    let min_h = sizes.iter().map(|s| s.height).min()?;
    let max_h = sizes.iter().map(|s| s.height).max()?;

    let target = target.landscape();
    let want = Size::new(
        desired_dimension(target.width, min_w, max_w),
        desired_dimension(target.height, min_h, max_h),
    );

    supported
        .iter()
        .copied()
        .min_by(|a, b| {
            let dist = |s: &Size| {
                let s = s.landscape();
                u64::from(s.width.abs_diff(want.width))
                    + u64::from(s.height.abs_diff(want.height))
            };
            dist(a)
                .cmp(&dist(b))
                .then_with(|| b.area().cmp(&a.area()))
        })
}

/// Pick the frame-rate range for a target fps
///
/// Prefers the narrowest range containing the target. Without one, the range
/// whose maximum is closest to the target is used.
pub fn choose_fps_range(supported: &[FpsRange], fps: u32) -> Option<FpsRange> {
    let containing = supported
        .iter()
        .filter(|r| r.contains(fps))
        .min_by_key(|r| (r.max_fps - r.min_fps, std::cmp::Reverse(r.min_fps)));
    if let Some(range) = containing {
        return Some(*range);
    }
    supported
        .iter()
        .min_by_key(|r| (r.max_fps.abs_diff(fps), std::cmp::Reverse(r.max_fps)))
        .copied()
}

/// Build the parameter set to push, starting from `current`
///
/// Safe mode only touches the preview size and uses plain auto focus; it
/// leaves frame rate and torch alone.
pub fn desired_parameters(
    current: &CameraParameters,
    request: &ParameterRequest,
    safe_mode: bool,
) -> CameraParameters {
    let mut params = current.clone();

    if let Some(size) = choose_preview_size(&current.supported_preview_sizes, request.target) {
        params.preview_size = Some(size);
    }

    let focus_order: &[FocusMode] = if safe_mode {
        &[FocusMode::Auto]
    } else {
        &[FocusMode::ContinuousVideo, FocusMode::Auto]
    };
    if let Some(mode) = focus_order.iter().find(|m| current.supports_focus(**m)) {
        params.focus_mode = Some(*mode);
    }

    if safe_mode {
        return params;
    }

    if let Some(range) = choose_fps_range(&current.supported_fps_ranges, request.frame_rate) {
        params.preview_fps_range = Some(range);
    }

    if current.torch_supported {
        // No light sensor to drive Auto, so it behaves like Off
        params.torch_on = matches!(request.front_light, FrontLightMode::On);
    }

    params
}

/// Push the full desired set
pub fn try_apply(device: &mut dyn CameraDevice, desired: &CameraParameters) -> CameraResult<()> {
    debug!(params = %desired, "Applying camera parameters");
    device.set_parameters(desired)
}

/// Restore `last_known_good` and retry with the safe-mode subset
pub fn fallback(
    device: &mut dyn CameraDevice,
    last_known_good: &CameraParameters,
    request: &ParameterRequest,
) -> ApplyOutcome {
    info!(saved = %last_known_good, "Resetting to saved camera params");
    if let Err(e) = device.set_parameters(last_known_good) {
        warn!(error = %e, "Device rejected its own saved parameters");
    }

    let safe = desired_parameters(last_known_good, request, true);
    match device.set_parameters(&safe) {
        Ok(()) => {
            info!(params = %safe, "Safe-mode camera parameters applied");
            ApplyOutcome::SafeMode
        }
        Err(e) => {
            warn!(error = %e, "Camera rejected even safe-mode parameters; keeping saved set");
            if let Err(e) = device.set_parameters(last_known_good) {
                warn!(error = %e, "Could not restore saved camera parameters");
            }
            ApplyOutcome::LastKnownGood
        }
    }
}

/// Apply parameters to a device, falling back instead of failing
///
/// With `safe_mode` the subset is applied directly. Rejections are logged and
/// never returned.
pub fn apply(
    device: &mut dyn CameraDevice,
    request: &ParameterRequest,
    safe_mode: bool,
) -> ApplyOutcome {
    let last_known_good = match device.parameters() {
        Ok(params) => params,
        Err(e) => {
            warn!(error = %e, "Device has no readable parameters; leaving them untouched");
            return ApplyOutcome::LastKnownGood;
        }
    };

    if safe_mode {
        info!("Initial camera parameters: {}", last_known_good);
        return fallback(device, &last_known_good, request);
    }

    let desired = desired_parameters(&last_known_good, request, false);
    match try_apply(device, &desired) {
        Ok(()) => ApplyOutcome::Full,
        Err(e) => {
            warn!(
                error = %e,
                "Camera rejected parameters. Setting only minimal safe-mode parameters"
            );
            fallback(device, &last_known_good, request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> Vec<Size> {
        vec![
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(960, 540),
            Size::new(640, 480),
            Size::new(320, 240),
        ]
    }

    #[test]
    fn test_preview_is_five_eighths_of_target() {
        // 1920x1080 * 5/8 = 1200x675, closest is 1280x720
        let size = choose_preview_size(&sizes(), Size::new(1920, 1080));
        assert_eq!(size, Some(Size::new(1280, 720)));
    }

    #[test]
    fn test_preview_clamps_to_hardware_range() {
        let size = choose_preview_size(&sizes(), Size::new(7680, 4320));
        assert_eq!(size, Some(Size::new(1920, 1080)));
        let size = choose_preview_size(&sizes(), Size::new(160, 120));
        assert_eq!(size, Some(Size::new(320, 240)));
    }

    #[test]
    fn test_huge_target_does_not_overflow() {
        assert_eq!(desired_dimension(u32::MAX, 320, 1920), 1920);
        assert_eq!(desired_dimension(u32::MAX, 1, 0), 2_684_354_559);
        let size = choose_preview_size(&sizes(), Size::new(1_000_000_000, 1080));
        assert_eq!(size, Some(Size::new(1920, 1080)));
    }

    #[test]
    fn test_portrait_target_matches_landscape_sizes() {
        let size = choose_preview_size(&sizes(), Size::new(1080, 1920));
        assert_eq!(size, Some(Size::new(1280, 720)));
    }

    #[test]
    fn test_no_supported_sizes() {
        assert_eq!(choose_preview_size(&[], Size::new(1920, 1080)), None);
    }

    #[test]
    fn test_fps_prefers_narrowest_containing_range() {
        let ranges = [FpsRange::new(7, 30), FpsRange::new(30, 30), FpsRange::new(15, 60)];
        assert_eq!(choose_fps_range(&ranges, 30), Some(FpsRange::new(30, 30)));
        assert_eq!(choose_fps_range(&ranges, 45), Some(FpsRange::new(15, 60)));
        assert_eq!(choose_fps_range(&[FpsRange::new(7, 24)], 30), Some(FpsRange::new(7, 24)));
    }

    #[test]
    fn test_safe_mode_only_touches_size_and_focus() {
        let current = CameraParameters {
            supported_preview_sizes: sizes(),
            supported_fps_ranges: vec![FpsRange::new(30, 30)],
            supported_focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousVideo],
            torch_supported: true,
            ..Default::default()
        };
        let request = ParameterRequest {
            target: Size::new(1920, 1080),
            frame_rate: 30,
            front_light: FrontLightMode::On,
        };

        let full = desired_parameters(&current, &request, false);
        assert_eq!(full.focus_mode, Some(FocusMode::ContinuousVideo));
        assert_eq!(full.preview_fps_range, Some(FpsRange::new(30, 30)));
        assert!(full.torch_on);

        let safe = desired_parameters(&current, &request, true);
        assert_eq!(safe.preview_size, Some(Size::new(1280, 720)));
        assert_eq!(safe.focus_mode, Some(FocusMode::Auto));
        assert_eq!(safe.preview_fps_range, None);
        assert!(!safe.torch_on);
    }

    #[test]
    fn test_auto_front_light_keeps_torch_off() {
        let current = CameraParameters {
            torch_supported: true,
            ..Default::default()
        };
        let request = ParameterRequest {
            target: Size::new(1280, 720),
            frame_rate: 30,
            front_light: FrontLightMode::Auto,
        };
        assert!(!desired_parameters(&current, &request, false).torch_on);
    }
}
