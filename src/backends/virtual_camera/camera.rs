// SPDX-License-Identifier: GPL-3.0-only

//! Software camera

use super::CallJournal;
use crate::backends::camera::types::{
    CameraFacing, CameraInfo, CameraParameters, DeviceBinding, FocusMode, FpsRange,
    PreviewCallback, PreviewFrame, SensorRotation, Size, SurfaceTarget,
};
use crate::backends::camera::{CameraBackend, CameraDevice, FocusControl};
use crate::errors::{CameraError, CameraResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Predicate deciding which parameter sets a virtual camera refuses
pub type ParameterRule = Arc<dyn Fn(&CameraParameters) -> bool + Send + Sync>;

/// Description of one virtual camera
#[derive(Debug, Clone)]
pub struct VirtualCameraSpec {
    pub name: String,
    pub facing: CameraFacing,
    pub orientation: SensorRotation,
    /// Parameters the device starts with
    pub parameters: CameraParameters,
}

impl VirtualCameraSpec {
    /// Rear camera with continuous focus and a torch
    pub fn back() -> Self {
        Self {
            name: "Virtual Back Camera".into(),
            facing: CameraFacing::Back,
            orientation: SensorRotation::Rotate90,
            parameters: CameraParameters {
                preview_size: Some(Size::new(640, 480)),
                supported_preview_sizes: common_sizes(),
                preview_fps_range: Some(FpsRange::new(15, 30)),
                supported_fps_ranges: vec![FpsRange::new(15, 30), FpsRange::new(30, 30)],
                focus_mode: Some(FocusMode::Auto),
                supported_focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousVideo],
                torch_supported: true,
                torch_on: false,
            },
        }
    }

    /// Fixed-focus selfie camera without a torch
    pub fn front() -> Self {
        Self {
            name: "Virtual Front Camera".into(),
            facing: CameraFacing::Front,
            orientation: SensorRotation::Rotate270,
            parameters: CameraParameters {
                preview_size: Some(Size::new(640, 480)),
                supported_preview_sizes: common_sizes(),
                preview_fps_range: Some(FpsRange::new(15, 30)),
                supported_fps_ranges: vec![FpsRange::new(15, 30)],
                focus_mode: Some(FocusMode::Fixed),
                supported_focus_modes: vec![FocusMode::Fixed],
                torch_supported: false,
                torch_on: false,
            },
        }
    }
}

fn common_sizes() -> Vec<Size> {
    vec![
        Size::new(1920, 1080),
        Size::new(1280, 720),
        Size::new(960, 540),
        Size::new(640, 480),
        Size::new(320, 240),
    ]
}

/// Backend serving [`VirtualCamera`]s
pub struct VirtualCameraBackend {
    cameras: Vec<VirtualCameraSpec>,
    journal: CallJournal,
    display_size: Option<Size>,
    reject: Option<ParameterRule>,
    fail_open: bool,
    fail_lock: bool,
    focus_triggers: Arc<AtomicU32>,
}

impl VirtualCameraBackend {
    /// A back and a front camera
    pub fn new(journal: CallJournal) -> Self {
        Self::with_cameras(
            journal,
            vec![VirtualCameraSpec::back(), VirtualCameraSpec::front()],
        )
    }

    pub fn with_cameras(journal: CallJournal, cameras: Vec<VirtualCameraSpec>) -> Self {
        Self {
            cameras,
            journal,
            display_size: None,
            reject: None,
            fail_open: false,
            fail_lock: false,
            focus_triggers: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Report a display size for orientation checks
    pub fn display_size_of(mut self, size: Size) -> Self {
        self.display_size = Some(size);
        self
    }

    /// Refuse every parameter set matching `rule`
    pub fn reject_parameters(mut self, rule: ParameterRule) -> Self {
        self.reject = Some(rule);
        self
    }

    /// Make every open fail
    pub fn fail_open(mut self, fail: bool) -> Self {
        self.fail_open = fail;
        self
    }

    /// Make every device refuse to be locked again after an unlock
    pub fn fail_lock(mut self, fail: bool) -> Self {
        self.fail_lock = fail;
        self
    }

    /// Counter of auto-focus triggers across all devices
    pub fn focus_triggers(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.focus_triggers)
    }
}

impl CameraBackend for VirtualCameraBackend {
    fn backend_name(&self) -> &'static str {
        "virtual"
    }

    fn enumerate_cameras(&self) -> Vec<CameraInfo> {
        self.cameras
            .iter()
            .enumerate()
            .map(|(index, spec)| CameraInfo {
                index,
                name: spec.name.clone(),
                facing: spec.facing,
                orientation: spec.orientation,
                path: None,
            })
            .collect()
    }

    fn open(&mut self, info: &CameraInfo) -> CameraResult<Box<dyn CameraDevice>> {
        self.journal.record(format!("camera.open#{}", info.index));
        if self.fail_open {
            return Err(CameraError::CameraOpenFailed(format!(
                "virtual camera #{} is unavailable",
                info.index
            )));
        }
        let spec = self
            .cameras
            .get(info.index)
            .ok_or(CameraError::IndexOutOfRange {
                requested: info.index,
                available: self.cameras.len(),
            })?;

        info!(index = info.index, name = %spec.name, "Opened virtual camera");
        Ok(Box::new(VirtualCamera {
            index: info.index,
            orientation: spec.orientation,
            parameters: spec.parameters.clone(),
            journal: self.journal.clone(),
            reject: self.reject.clone(),
            locked: true,
            fail_lock: self.fail_lock,
            previewing: false,
            released: false,
            callback: None,
            focus: Arc::new(VirtualFocus {
                triggers: Arc::clone(&self.focus_triggers),
            }),
        }))
    }

    fn display_size(&self) -> Option<Size> {
        self.display_size
    }
}

struct VirtualFocus {
    triggers: Arc<AtomicU32>,
}

impl FocusControl for VirtualFocus {
    fn trigger_auto_focus(&self) -> CameraResult<()> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An opened virtual camera
pub struct VirtualCamera {
    index: usize,
    orientation: SensorRotation,
    parameters: CameraParameters,
    journal: CallJournal,
    reject: Option<ParameterRule>,
    locked: bool,
    fail_lock: bool,
    previewing: bool,
    released: bool,
    callback: Option<PreviewCallback>,
    focus: Arc<VirtualFocus>,
}

impl VirtualCamera {
    fn ensure_usable(&self) -> CameraResult<()> {
        if self.released {
            return Err(CameraError::Backend("virtual camera already released".into()));
        }
        Ok(())
    }

    fn ensure_locked(&self) -> CameraResult<()> {
        self.ensure_usable()?;
        if !self.locked {
            return Err(CameraError::Busy);
        }
        Ok(())
    }

    fn deliver_frame(&mut self) {
        let size = self.parameters.preview_size.unwrap_or(Size::new(320, 240));
        if let Some(callback) = self.callback.as_mut() {
            // NV21 buffer of mid-grey
            let len = (size.area() * 3 / 2) as usize;
            let frame = PreviewFrame {
                data: vec![0x80u8; len].into(),
                size,
                captured_at: Instant::now(),
            };
            callback(&frame);
        }
    }
}

impl CameraDevice for VirtualCamera {
    fn parameters(&self) -> CameraResult<CameraParameters> {
        self.ensure_usable()?;
        Ok(self.parameters.clone())
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> CameraResult<()> {
        self.ensure_locked()?;
        if self.reject.as_ref().is_some_and(|rule| rule(params)) {
            self.journal.record("camera.set_parameters:rejected");
            return Err(CameraError::ParameterRejected(params.flatten()));
        }
        if let Some(size) = params.preview_size {
            if !self.parameters.supported_preview_sizes.contains(&size) {
                self.journal.record("camera.set_parameters:rejected");
                return Err(CameraError::ParameterRejected(format!(
                    "unsupported preview size {}",
                    size
                )));
            }
        }
        if params.torch_on && !self.parameters.torch_supported {
            return Err(CameraError::ParameterRejected("no torch".into()));
        }

        self.parameters = CameraParameters {
            supported_preview_sizes: self.parameters.supported_preview_sizes.clone(),
            supported_fps_ranges: self.parameters.supported_fps_ranges.clone(),
            supported_focus_modes: self.parameters.supported_focus_modes.clone(),
            torch_supported: self.parameters.torch_supported,
            ..params.clone()
        };
        self.journal.record("camera.set_parameters");
        Ok(())
    }

    fn set_torch(&mut self, on: bool) -> CameraResult<()> {
        self.ensure_usable()?;
        if !self.parameters.torch_supported {
            return Err(CameraError::ParameterRejected("no torch".into()));
        }
        self.parameters.torch_on = on;
        self.journal
            .record(if on { "camera.torch:on" } else { "camera.torch:off" });
        Ok(())
    }

    fn set_preview_target(&mut self, target: &SurfaceTarget) -> CameraResult<()> {
        self.ensure_locked()?;
        debug!(?target, "Virtual preview target set");
        Ok(())
    }

    fn start_preview(&mut self) -> CameraResult<()> {
        self.ensure_locked()?;
        self.previewing = true;
        self.journal.record("camera.start_preview");
        self.deliver_frame();
        Ok(())
    }

    fn stop_preview(&mut self) -> CameraResult<()> {
        self.ensure_usable()?;
        self.previewing = false;
        self.journal.record("camera.stop_preview");
        Ok(())
    }

    fn set_preview_callback(&mut self, callback: Option<PreviewCallback>) {
        self.callback = callback;
        if self.previewing {
            self.deliver_frame();
        }
    }

    fn focus_control(&self) -> Option<Arc<dyn FocusControl>> {
        let can_focus = self.parameters.supports_focus(FocusMode::Auto)
            || self.parameters.supports_focus(FocusMode::ContinuousVideo);
        can_focus.then(|| Arc::clone(&self.focus) as Arc<dyn FocusControl>)
    }

    fn unlock(&mut self) -> CameraResult<()> {
        self.ensure_locked()?;
        self.locked = false;
        self.journal.record("camera.unlock");
        Ok(())
    }

    fn lock(&mut self) -> CameraResult<()> {
        self.ensure_usable()?;
        if self.fail_lock {
            self.journal.record("camera.lock:failed");
            return Err(CameraError::Backend("virtual camera refused the lock".into()));
        }
        self.locked = true;
        self.journal.record("camera.lock");
        Ok(())
    }

    fn binding(&self) -> DeviceBinding {
        DeviceBinding {
            index: self.index,
            path: None,
            orientation: self.orientation,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.previewing = false;
        self.callback = None;
        self.journal.record("camera.release");
    }
}
