// SPDX-License-Identifier: GPL-3.0-only
// Camera backend with trait-based abstraction

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ RecordingController │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    CameraSession    │  ← Open/close, preview, lock hand-off, torch
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CameraBackend Trait │  ← Enumeration and device factory
//! └──────────┬──────────┘
//!            │
//!       ┌────┴────┐
//!       ▼         ▼
//!   ┌──────┐  ┌───────┐
//!   │ V4L2 │  │Virtual│
//!   └──────┘  └───────┘
//! ```

pub mod focus_loop;
pub mod parameters;
pub mod session;
pub mod types;
#[cfg(feature = "gstreamer")]
pub mod v4l2;

pub use focus_loop::FocusLoop;
pub use parameters::{ApplyOutcome, ParameterRequest};
pub use session::CameraSession;
pub use types::*;

use crate::errors::CameraResult;
use std::sync::Arc;

/// Device enumeration and opening
///
/// Implementations own whatever platform state is needed to list cameras and
/// hand out [`CameraDevice`]s. Only one device is opened at a time by the
/// session, but backends should not rely on that.
pub trait CameraBackend: Send {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Enumerate available cameras, indexed from zero
    fn enumerate_cameras(&self) -> Vec<CameraInfo>;

    /// Open the given camera
    ///
    /// The returned device is locked by the caller and not yet previewing.
    fn open(&mut self, info: &CameraInfo) -> CameraResult<Box<dyn CameraDevice>>;

    /// Size of the display the preview is shown on, when known
    fn display_size(&self) -> Option<Size> {
        None
    }
}

/// An opened camera device
pub trait CameraDevice: Send {
    /// Read the current parameter snapshot
    fn parameters(&self) -> CameraResult<CameraParameters>;

    /// Apply a full parameter set
    ///
    /// Either every value is applied or the call fails; a failure leaves the
    /// device in an unknown state and callers restore a saved set.
    fn set_parameters(&mut self, params: &CameraParameters) -> CameraResult<()>;

    /// Switch the torch alone
    ///
    /// Unlike [`CameraDevice::set_parameters`] this is valid while the device
    /// is unlocked for the encoder.
    fn set_torch(&mut self, on: bool) -> CameraResult<()>;

    /// Attach the preview output
    fn set_preview_target(&mut self, target: &SurfaceTarget) -> CameraResult<()>;

    fn start_preview(&mut self) -> CameraResult<()>;

    fn stop_preview(&mut self) -> CameraResult<()>;

    /// Install or remove the preview frame callback
    fn set_preview_callback(&mut self, callback: Option<PreviewCallback>);

    /// Auto-focus trigger usable from another thread, if the lens can focus
    fn focus_control(&self) -> Option<Arc<dyn FocusControl>>;

    /// Give up device ownership so an encoder can take it
    fn unlock(&mut self) -> CameraResult<()>;

    /// Take ownership back after the encoder is done
    fn lock(&mut self) -> CameraResult<()>;

    /// What the encoder needs to bind to this device
    fn binding(&self) -> DeviceBinding;

    /// Release the device; the value must not be used afterwards
    fn release(&mut self);
}

/// One-shot auto-focus trigger
pub trait FocusControl: Send + Sync {
    fn trigger_auto_focus(&self) -> CameraResult<()>;
}
