// SPDX-License-Identifier: GPL-3.0-only

//! Camera session
//!
//! Owns the single open camera of a recorder: selection and opening,
//! parameter application, preview, the auto-focus loop, torch, and the lock
//! hand-off to the encoder.
//!
//! # Lock protocol
//!
//! ```text
//! Closed ──open──▶ Preview ──unlock_for_encoder──▶ Encoder
//!    ▲                │  ▲                            │
//!    └──────close─────┘  └───────────relock───────────┘
//! ```

use super::focus_loop::FocusLoop;
use super::parameters::{self, ApplyOutcome, ParameterRequest};
use super::types::{
    CameraFacing, CameraHandle, CameraInfo, DeviceBinding, LockState, PreviewCallback, Size,
    SurfaceTarget,
};
use super::{CameraBackend, CameraDevice};
use crate::constants::timing::AUTO_FOCUS_INTERVAL;
use crate::errors::{CameraError, CameraResult};
use tracing::{debug, error, info, warn};

/// Choose which camera to open
///
/// A requested index is taken literally. Otherwise the first camera with the
/// preferred facing wins, falling back to camera 0.
pub fn select_camera(
    cameras: &[CameraInfo],
    requested_index: Option<usize>,
    preferred_facing: CameraFacing,
) -> CameraResult<&CameraInfo> {
    if cameras.is_empty() {
        return Err(CameraError::NoCameraAvailable);
    }

    if let Some(index) = requested_index {
        return cameras.get(index).ok_or(CameraError::IndexOutOfRange {
            requested: index,
            available: cameras.len(),
        });
    }

    match cameras.iter().find(|c| c.facing == preferred_facing) {
        Some(info) => Ok(info),
        None => {
            info!(
                facing = %preferred_facing,
                "No camera facing the requested direction; opening camera #0"
            );
            Ok(&cameras[0])
        }
    }
}

struct OpenCamera {
    device: Box<dyn CameraDevice>,
    handle: CameraHandle,
}

/// The recorder's camera
pub struct CameraSession {
    backend: Box<dyn CameraBackend>,
    request: ParameterRequest,
    camera: Option<OpenCamera>,
    lock_state: LockState,
    previewing: bool,
    focus_loop: Option<FocusLoop>,
    /// Preview size in use, for orientation checks
    camera_resolution: Option<Size>,
    /// Display size reported by the backend
    screen_resolution: Option<Size>,
    last_outcome: Option<ApplyOutcome>,
}

impl CameraSession {
    pub fn new(backend: Box<dyn CameraBackend>, request: ParameterRequest) -> Self {
        info!(backend = backend.backend_name(), "Creating camera session");
        Self {
            backend,
            request,
            camera: None,
            lock_state: LockState::Closed,
            previewing: false,
            focus_loop: None,
            camera_resolution: None,
            screen_resolution: None,
            last_outcome: None,
        }
    }

    /// Cameras the backend can see
    pub fn cameras(&self) -> Vec<CameraInfo> {
        self.backend.enumerate_cameras()
    }

    /// Open a camera and apply parameters
    ///
    /// Opening while a camera is already open returns the existing handle.
    pub fn open(
        &mut self,
        requested_index: Option<usize>,
        preferred_facing: CameraFacing,
    ) -> CameraResult<CameraHandle> {
        if let Some(camera) = &self.camera {
            debug!(camera = %camera.handle, "Camera already open");
            return Ok(camera.handle.clone());
        }

        let cameras = self.backend.enumerate_cameras();
        info!(count = cameras.len(), "Enumerated cameras");
        let info = select_camera(&cameras, requested_index, preferred_facing)?.clone();

        info!(index = info.index, name = %info.name, facing = %info.facing, "Opening camera");
        let mut device = self.backend.open(&info).map_err(|e| match e {
            CameraError::CameraOpenFailed(_) => e,
            other => CameraError::CameraOpenFailed(other.to_string()),
        })?;

        let outcome = parameters::apply(device.as_mut(), &self.request, false);
        let params = match device.parameters() {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "Cannot read parameters after configuration");
                Default::default()
            }
        };
        let handle = CameraHandle::new(&info, params);

        self.camera_resolution = handle.parameters.preview_size;
        self.screen_resolution = self.backend.display_size();
        self.last_outcome = Some(outcome);
        self.camera = Some(OpenCamera {
            device,
            handle: handle.clone(),
        });
        self.lock_state = LockState::Preview;

        info!(camera = %handle, ?outcome, "Camera opened");
        Ok(handle)
    }

    /// Re-apply parameters to the open camera
    pub fn apply_parameters(&mut self, safe_mode: bool) -> CameraResult<ApplyOutcome> {
        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;
        if self.lock_state == LockState::Encoder {
            return Err(CameraError::Busy);
        }

        let outcome = parameters::apply(camera.device.as_mut(), &self.request, safe_mode);
        if let Ok(params) = camera.device.parameters() {
            self.camera_resolution = params.preview_size;
            camera.handle.parameters = params;
        }
        self.last_outcome = Some(outcome);
        Ok(outcome)
    }

    /// Which parameter set the last application left on the device
    pub fn last_outcome(&self) -> Option<ApplyOutcome> {
        self.last_outcome
    }

    pub fn start_preview(&mut self, target: &SurfaceTarget) -> CameraResult<()> {
        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;
        if self.lock_state == LockState::Encoder {
            return Err(CameraError::Busy);
        }
        if self.previewing {
            return Ok(());
        }

        camera.device.set_preview_target(target)?;
        camera.device.start_preview()?;
        self.previewing = true;
        debug!(?target, "Preview started");

        self.start_focus_loop();
        Ok(())
    }

    pub fn stop_preview(&mut self) {
        self.stop_focus_loop();

        let Some(camera) = self.camera.as_mut() else {
            self.previewing = false;
            return;
        };
        camera.device.set_preview_callback(None);

        if self.previewing {
            if let Err(e) = camera.device.stop_preview() {
                warn!(error = %e, "Failed to stop preview");
            }
            self.previewing = false;
            debug!("Preview stopped");
        }
    }

    /// Install or remove the preview frame callback
    pub fn set_preview_callback(&mut self, callback: Option<PreviewCallback>) -> CameraResult<()> {
        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;
        camera.device.set_preview_callback(callback);
        Ok(())
    }

    /// Switch the torch, pausing the focus loop around the change
    ///
    /// Works in every lock state, including while the encoder owns the device.
    pub fn set_torch(&mut self, enable: bool) -> CameraResult<()> {
        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;
        let params = camera.device.parameters()?;

        if !params.torch_supported {
            debug!("Torch not supported by this camera");
            return Ok(());
        }
        if params.torch_on == enable {
            return Ok(());
        }

        let loop_was_running = self.focus_loop.is_some();
        self.stop_focus_loop();

        let result = self
            .camera
            .as_mut()
            .ok_or(CameraError::NotOpen)
            .and_then(|camera| {
                camera.device.set_torch(enable)?;
                camera.handle.parameters.torch_on = enable;
                Ok(())
            });

        if loop_was_running {
            self.start_focus_loop();
        }

        match &result {
            Ok(()) => info!(enable, "Torch switched"),
            Err(e) => warn!(enable, error = %e, "Failed to switch torch"),
        }
        result
    }

    /// Whether the torch is currently lit
    pub fn torch_state(&self) -> bool {
        self.camera
            .as_ref()
            .and_then(|c| c.device.parameters().ok())
            .map(|p| p.torch_supported && p.torch_on)
            .unwrap_or(false)
    }

    /// Whether the open camera has a controllable torch
    pub fn torch_supported(&self) -> bool {
        self.camera
            .as_ref()
            .map(|c| c.handle.parameters.torch_supported)
            .unwrap_or(false)
    }

    /// Stop the preview, release the device and forget cached geometry
    pub fn close(&mut self) {
        if self.camera.is_none() {
            self.lock_state = LockState::Closed;
            return;
        }

        self.stop_preview();

        if let Some(mut camera) = self.camera.take() {
            camera.device.set_preview_callback(None);
            if self.lock_state == LockState::Encoder {
                // Take the device back before releasing it
                if let Err(e) = camera.device.lock() {
                    warn!(error = %e, "Failed to relock camera before release");
                }
            }
            camera.device.release();
            info!(camera = %camera.handle, "Camera released");
        }

        self.lock_state = LockState::Closed;
        self.camera_resolution = None;
        self.screen_resolution = None;
        self.last_outcome = None;
    }

    /// Hand the device to the encoder
    ///
    /// Stops the focus loop since the session no longer owns the device.
    pub fn unlock_for_encoder(&mut self) -> CameraResult<DeviceBinding> {
        if self.lock_state != LockState::Preview {
            return Err(CameraError::InvalidLockTransition {
                from: self.lock_state,
                to: LockState::Encoder,
            });
        }
        self.stop_focus_loop();

        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;
        if let Err(e) = camera.device.unlock() {
            self.start_focus_loop();
            return Err(e);
        }
        self.lock_state = LockState::Encoder;
        debug!("Camera unlocked for encoder");
        Ok(camera.device.binding())
    }

    /// Take the device back from the encoder
    pub fn relock(&mut self) -> CameraResult<()> {
        if self.lock_state != LockState::Encoder {
            return Err(CameraError::InvalidLockTransition {
                from: self.lock_state,
                to: LockState::Preview,
            });
        }

        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;
        if let Err(e) = camera.device.lock() {
            error!(error = %e, "Failed to relock camera");
            return Err(e);
        }
        self.lock_state = LockState::Preview;
        debug!("Camera relocked for preview");

        if self.previewing {
            self.start_focus_loop();
        }
        Ok(())
    }

    /// Camera and display share portrait/landscape orientation
    ///
    /// Unknown geometry counts as the same orientation.
    pub fn is_same_orientation(&self) -> bool {
        match (self.camera_resolution, self.screen_resolution) {
            (Some(camera), Some(screen)) => camera.is_portrait() == screen.is_portrait(),
            _ => true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.camera.is_some()
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }

    pub fn lock_state(&self) -> LockState {
        self.lock_state
    }

    pub fn handle(&self) -> Option<&CameraHandle> {
        self.camera.as_ref().map(|c| &c.handle)
    }

    pub fn request(&self) -> &ParameterRequest {
        &self.request
    }

    fn start_focus_loop(&mut self) {
        if self.focus_loop.is_some() || !self.previewing || self.lock_state != LockState::Preview {
            return;
        }
        let Some(focus) = self.camera.as_ref().and_then(|c| c.device.focus_control()) else {
            return;
        };
        self.focus_loop = Some(FocusLoop::start("auto-focus", focus, AUTO_FOCUS_INTERVAL));
    }

    fn stop_focus_loop(&mut self) {
        if let Some(mut focus_loop) = self.focus_loop.take() {
            focus_loop.stop();
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::SensorRotation;

    fn info(index: usize, facing: CameraFacing) -> CameraInfo {
        CameraInfo {
            index,
            name: format!("cam{}", index),
            facing,
            orientation: SensorRotation::Rotate90,
            path: None,
        }
    }

    #[test]
    fn test_select_prefers_facing() {
        let cams = [info(0, CameraFacing::Back), info(1, CameraFacing::Front)];
        let chosen = select_camera(&cams, None, CameraFacing::Front).unwrap();
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let cams = [info(0, CameraFacing::Back)];
        let chosen = select_camera(&cams, None, CameraFacing::Front).unwrap();
        assert_eq!(chosen.index, 0);
    }

    #[test]
    fn test_select_manual_index() {
        let cams = [info(0, CameraFacing::Back), info(1, CameraFacing::Front)];
        assert_eq!(select_camera(&cams, Some(0), CameraFacing::Front).unwrap().index, 0);
        assert!(matches!(
            select_camera(&cams, Some(5), CameraFacing::Back),
            Err(CameraError::IndexOutOfRange {
                requested: 5,
                available: 2
            })
        ));
    }

    #[test]
    fn test_select_without_cameras() {
        assert!(matches!(
            select_camera(&[], None, CameraFacing::Back),
            Err(CameraError::NoCameraAvailable)
        ));
    }
}
