// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera backend driven through GStreamer
//!
//! Cameras are discovered with a `Video/Source` device monitor. An opened
//! camera runs a small preview pipeline:
//!
//! ```text
//! v4l2src → capsfilter → identity(handoff) → videoconvert → sink
//! ```
//!
//! Unlocking for the encoder tears that pipeline down so the encoder pipeline
//! can open the same `/dev/videoN` node; locking builds it again.

pub mod controls;

use crate::backends::camera::types::{
    CameraFacing, CameraInfo, CameraParameters, DeviceBinding, FocusMode, FpsRange,
    PreviewCallback, PreviewFrame, SensorRotation, Size, SurfaceTarget,
};
use crate::backends::camera::{CameraBackend, CameraDevice, FocusControl};
use crate::errors::{CameraError, CameraResult};
use crate::flash::{FlashHardware, Torch};
use controls::{V4L2_CID_FOCUS_AUTO, V4l2Focus};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Camera found by the device monitor
#[derive(Debug, Clone)]
struct DiscoveredCamera {
    info: CameraInfo,
    parameters: CameraParameters,
}

/// Backend listing V4L2 nodes through GStreamer
pub struct V4l2Backend {
    cameras: Vec<DiscoveredCamera>,
}

impl V4l2Backend {
    /// Initialize GStreamer and scan for cameras
    pub fn new() -> CameraResult<Self> {
        gst::init().map_err(|e| CameraError::Backend(format!("GStreamer init failed: {}", e)))?;
        let cameras = discover_cameras();
        info!(count = cameras.len(), "V4L2 cameras discovered");
        Ok(Self { cameras })
    }
}

fn discover_cameras() -> Vec<DiscoveredCamera> {
    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    if let Err(e) = monitor.start() {
        warn!(error = %e, "Device monitor failed to start");
        return Vec::new();
    }

    let torch_present = FlashHardware::detect().has_devices();
    let mut cameras = Vec::new();
    for device in monitor.devices() {
        let name = device.display_name().to_string();
        let props = device.properties();
        let prop = |key: &str| -> Option<String> {
            props.as_ref().and_then(|p| p.get::<String>(key).ok())
        };

        let Some(path) = prop("api.v4l2.path").or_else(|| prop("device.path")) else {
            debug!(%name, "Skipping video source without a device node");
            continue;
        };

        let facing = match prop("api.libcamera.location").as_deref() {
            Some("front") => CameraFacing::Front,
            Some(_) => CameraFacing::Back,
            None => facing_from_name(&name),
        };
        let orientation = prop("api.libcamera.rotation")
            .and_then(|r| r.parse::<i32>().ok())
            .map(SensorRotation::from_degrees_int)
            .unwrap_or_default();

        let mut parameters = device
            .caps()
            .map(|caps| parameters_from_caps(&caps))
            .unwrap_or_default();
        parameters.supported_focus_modes = focus_modes(&path);
        parameters.focus_mode = parameters.supported_focus_modes.first().copied();
        parameters.torch_supported = torch_present && facing == CameraFacing::Back;

        let index = cameras.len();
        debug!(index, %name, %path, %facing, "Found V4L2 camera");
        cameras.push(DiscoveredCamera {
            info: CameraInfo {
                index,
                name,
                facing,
                orientation,
                path: Some(path),
            },
            parameters,
        });
    }
    monitor.stop();
    cameras
}

fn facing_from_name(name: &str) -> CameraFacing {
    let lower = name.to_lowercase();
    if lower.contains("front") || lower.contains("user") || lower.contains("integrated") {
        CameraFacing::Front
    } else {
        CameraFacing::Back
    }
}

fn focus_modes(path: &str) -> Vec<FocusMode> {
    let mut modes = Vec::new();
    if controls::has_control(path, V4L2_CID_FOCUS_AUTO) {
        modes.push(FocusMode::ContinuousVideo);
    }
    if V4l2Focus::probe(path).is_some() {
        modes.push(FocusMode::Auto);
    }
    if modes.is_empty() {
        modes.push(FocusMode::Fixed);
    }
    modes
}

/// Sizes and frame rates from raw video caps
fn parameters_from_caps(caps: &gst::Caps) -> CameraParameters {
    let mut sizes: Vec<Size> = Vec::new();
    let mut ranges: Vec<FpsRange> = Vec::new();

    for s in caps.iter() {
        if s.name() != "video/x-raw" {
            continue;
        }
        let (Ok(w), Ok(h)) = (s.get::<i32>("width"), s.get::<i32>("height")) else {
            continue;
        };
        let size = Size::new(w.max(0) as u32, h.max(0) as u32);
        if !sizes.contains(&size) {
            sizes.push(size);
        }

        let rate = if let Ok(f) = s.get::<gst::Fraction>("framerate") {
            let fps = fraction_fps(f);
            Some(FpsRange::new(fps, fps))
        } else if let Ok(r) = s.get::<gst::FractionRange>("framerate") {
            Some(FpsRange::new(fraction_fps(r.min()), fraction_fps(r.max())))
        } else if let Ok(list) = s.get::<gst::List>("framerate") {
            let fps: Vec<u32> = list
                .iter()
                .filter_map(|v| v.get::<gst::Fraction>().ok())
                .map(fraction_fps)
                .collect();
            match (fps.iter().min(), fps.iter().max()) {
                (Some(&min), Some(&max)) => Some(FpsRange::new(min, max)),
                _ => None,
            }
        } else {
            None
        };
        if let Some(range) = rate {
            if range.max_fps > 0 && !ranges.contains(&range) {
                ranges.push(range);
            }
        }
    }

    sizes.sort_by(|a, b| b.area().cmp(&a.area()));
    CameraParameters {
        preview_size: sizes.first().copied(),
        supported_preview_sizes: sizes,
        preview_fps_range: ranges.first().copied(),
        supported_fps_ranges: ranges,
        ..CameraParameters::default()
    }
}

fn fraction_fps(f: gst::Fraction) -> u32 {
    if f.denom() == 0 {
        return 0;
    }
    (f.numer() / f.denom()).max(0) as u32
}

impl CameraBackend for V4l2Backend {
    fn backend_name(&self) -> &'static str {
        "v4l2"
    }

    fn enumerate_cameras(&self) -> Vec<CameraInfo> {
        self.cameras.iter().map(|c| c.info.clone()).collect()
    }

    fn open(&mut self, info: &CameraInfo) -> CameraResult<Box<dyn CameraDevice>> {
        let camera = self
            .cameras
            .get(info.index)
            .ok_or(CameraError::IndexOutOfRange {
                requested: info.index,
                available: self.cameras.len(),
            })?;
        let path = camera
            .info
            .path
            .clone()
            .ok_or_else(|| CameraError::CameraOpenFailed("no device node".into()))?;

        // Probe that the node can be opened at all
        std::fs::File::open(&path)
            .map_err(|e| CameraError::CameraOpenFailed(format!("{}: {}", path, e)))?;

        let torch = if camera.parameters.torch_supported {
            Torch::new(FlashHardware::detect().devices)
        } else {
            Torch::default()
        };

        info!(index = info.index, %path, "Opened V4L2 camera");
        Ok(Box::new(V4l2Camera {
            index: info.index,
            focus: V4l2Focus::probe(&path).map(Arc::new),
            path,
            orientation: camera.info.orientation,
            parameters: camera.parameters.clone(),
            torch,
            target: SurfaceTarget::Headless,
            pipeline: None,
            callback: Arc::new(Mutex::new(None)),
            locked: true,
            preview_wanted: false,
            released: false,
        }))
    }
}

/// An opened V4L2 camera
pub struct V4l2Camera {
    index: usize,
    path: String,
    orientation: SensorRotation,
    parameters: CameraParameters,
    torch: Torch,
    focus: Option<Arc<V4l2Focus>>,
    target: SurfaceTarget,
    pipeline: Option<gst::Pipeline>,
    callback: Arc<Mutex<Option<PreviewCallback>>>,
    locked: bool,
    /// Preview was requested and should run whenever the device is locked
    preview_wanted: bool,
    released: bool,
}

impl V4l2Camera {
    fn ensure_locked(&self) -> CameraResult<()> {
        if self.released {
            return Err(CameraError::NotOpen);
        }
        if !self.locked {
            return Err(CameraError::Busy);
        }
        Ok(())
    }

    fn pipeline_description(&self) -> String {
        let mut caps = String::from("video/x-raw");
        if let Some(size) = self.parameters.preview_size {
            caps.push_str(&format!(",width={},height={}", size.width, size.height));
        }
        if let Some(range) = self.parameters.preview_fps_range {
            caps.push_str(&format!(",framerate={}/1", range.max_fps));
        }
        let sink = match &self.target {
            SurfaceTarget::Headless => "fakesink sync=false".to_string(),
            SurfaceTarget::Sink(name) => name.clone(),
        };
        format!(
            "v4l2src device={} ! {} ! identity name=tap signal-handoffs=true ! videoconvert ! {}",
            self.path, caps, sink
        )
    }

    fn build_pipeline(&mut self) -> CameraResult<()> {
        let description = self.pipeline_description();
        debug!(pipeline = %description, "Building preview pipeline");
        let pipeline = gst::parse::launch(&description)
            .map_err(|e| CameraError::Backend(format!("Preview pipeline: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::Backend("Preview is not a pipeline".into()))?;

        if let Some(tap) = pipeline.by_name("tap") {
            let callback = Arc::clone(&self.callback);
            let size = self
                .parameters
                .preview_size
                .unwrap_or(Size::new(crate::constants::DEFAULT_WIDTH, crate::constants::DEFAULT_HEIGHT));
            tap.connect("handoff", false, move |values| {
                let Some(buffer) = values.get(1).and_then(|v| v.get::<gst::Buffer>().ok()) else {
                    return None;
                };
                let mut guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(cb) = guard.as_mut() {
                    if let Ok(map) = buffer.map_readable() {
                        let frame = PreviewFrame {
                            data: Arc::from(map.as_slice()),
                            size,
                            captured_at: Instant::now(),
                        };
                        cb(&frame);
                    }
                }
                None
            });
        }

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CameraError::Backend(format!("Failed to start preview: {}", e)))?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn teardown_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                error!(error = %e, "Failed to stop preview pipeline");
            }
        }
    }

    fn apply_focus(&self, mode: Option<FocusMode>) -> CameraResult<()> {
        if !controls::has_control(&self.path, V4L2_CID_FOCUS_AUTO) {
            return Ok(());
        }
        match mode {
            Some(FocusMode::ContinuousVideo) => {
                controls::set_control(&self.path, V4L2_CID_FOCUS_AUTO, 1)
            }
            Some(FocusMode::Auto) | Some(FocusMode::Fixed) => {
                controls::set_control(&self.path, V4L2_CID_FOCUS_AUTO, 0)
            }
            None => Ok(()),
        }
    }
}

impl CameraDevice for V4l2Camera {
    fn parameters(&self) -> CameraResult<CameraParameters> {
        if self.released {
            return Err(CameraError::NotOpen);
        }
        let mut params = self.parameters.clone();
        if params.torch_supported {
            params.torch_on = self.torch.is_on();
        }
        if controls::has_control(&self.path, V4L2_CID_FOCUS_AUTO) {
            params.focus_mode = match controls::get_control(&self.path, V4L2_CID_FOCUS_AUTO) {
                Some(0) => params.focus_mode.filter(|m| *m != FocusMode::ContinuousVideo),
                Some(_) => Some(FocusMode::ContinuousVideo),
                None => params.focus_mode,
            };
        }
        Ok(params)
    }

    fn set_parameters(&mut self, params: &CameraParameters) -> CameraResult<()> {
        self.ensure_locked()?;
        if let Some(size) = params.preview_size {
            if !self.parameters.supported_preview_sizes.contains(&size) {
                return Err(CameraError::ParameterRejected(format!(
                    "unsupported preview size {}",
                    size
                )));
            }
        }
        if let Some(range) = params.preview_fps_range {
            if !self.parameters.supported_fps_ranges.contains(&range) {
                return Err(CameraError::ParameterRejected(format!(
                    "unsupported fps range {}",
                    range
                )));
            }
        }
        if let Some(mode) = params.focus_mode {
            if !self.parameters.supports_focus(mode) {
                return Err(CameraError::ParameterRejected(format!(
                    "unsupported focus mode {:?}",
                    mode
                )));
            }
        }
        if params.torch_on && !self.parameters.torch_supported {
            return Err(CameraError::ParameterRejected("no torch".into()));
        }

        self.apply_focus(params.focus_mode)?;
        if self.parameters.torch_supported {
            self.torch
                .set(params.torch_on)
                .map_err(|e| CameraError::ParameterRejected(format!("torch: {}", e)))?;
        }

        let geometry_changed = params.preview_size != self.parameters.preview_size
            || params.preview_fps_range != self.parameters.preview_fps_range;
        self.parameters.preview_size = params.preview_size;
        self.parameters.preview_fps_range = params.preview_fps_range;
        self.parameters.focus_mode = params.focus_mode;
        self.parameters.torch_on = params.torch_on;

        if geometry_changed && self.pipeline.is_some() {
            self.teardown_pipeline();
            self.build_pipeline()?;
        }
        Ok(())
    }

    fn set_torch(&mut self, on: bool) -> CameraResult<()> {
        if self.released {
            return Err(CameraError::NotOpen);
        }
        if !self.parameters.torch_supported {
            return Err(CameraError::ParameterRejected("no torch".into()));
        }
        // The flash LED lives in sysfs, outside the capture device
        self.torch
            .set(on)
            .map_err(|e| CameraError::ParameterRejected(format!("torch: {}", e)))?;
        self.parameters.torch_on = on;
        Ok(())
    }

    fn set_preview_target(&mut self, target: &SurfaceTarget) -> CameraResult<()> {
        self.ensure_locked()?;
        self.target = target.clone();
        Ok(())
    }

    fn start_preview(&mut self) -> CameraResult<()> {
        self.ensure_locked()?;
        self.preview_wanted = true;
        if self.pipeline.is_none() {
            self.build_pipeline()?;
        }
        Ok(())
    }

    fn stop_preview(&mut self) -> CameraResult<()> {
        self.preview_wanted = false;
        self.teardown_pipeline();
        Ok(())
    }

    fn set_preview_callback(&mut self, callback: Option<PreviewCallback>) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    fn focus_control(&self) -> Option<Arc<dyn FocusControl>> {
        self.focus
            .as_ref()
            .map(|f| Arc::clone(f) as Arc<dyn FocusControl>)
    }

    fn unlock(&mut self) -> CameraResult<()> {
        self.ensure_locked()?;
        self.teardown_pipeline();
        self.locked = false;
        debug!(path = %self.path, "V4L2 camera unlocked");
        Ok(())
    }

    fn lock(&mut self) -> CameraResult<()> {
        if self.released {
            return Err(CameraError::NotOpen);
        }
        self.locked = true;
        if self.preview_wanted && self.pipeline.is_none() {
            self.build_pipeline()?;
        }
        debug!(path = %self.path, "V4L2 camera locked");
        Ok(())
    }

    fn binding(&self) -> DeviceBinding {
        DeviceBinding {
            index: self.index,
            path: Some(self.path.clone()),
            orientation: self.orientation,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.teardown_pipeline();
        if self.parameters.torch_on {
            if let Err(e) = self.torch.set(false) {
                warn!(error = %e, "Failed to switch torch off on release");
            }
        }
        self.set_preview_callback(None);
        self.released = true;
        info!(path = %self.path, "V4L2 camera released");
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_from_name() {
        assert_eq!(facing_from_name("Integrated Camera"), CameraFacing::Front);
        assert_eq!(facing_from_name("ov8858 rear"), CameraFacing::Back);
    }

    #[test]
    fn test_parameters_from_caps() {
        gst::init().unwrap();
        let caps: gst::Caps =
            "video/x-raw,width=640,height=480,framerate=30/1; video/x-raw,width=1280,height=720,framerate=15/1"
                .parse()
                .unwrap();
        let params = parameters_from_caps(&caps);
        assert_eq!(params.preview_size, Some(Size::new(1280, 720)));
        assert_eq!(params.supported_preview_sizes.len(), 2);
        assert!(params.supported_fps_ranges.contains(&FpsRange::new(30, 30)));
    }
}
