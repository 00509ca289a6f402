// SPDX-License-Identifier: GPL-3.0-only

//! Camera Recorder - time-bounded video capture with pause, resume and torch control
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera backend abstraction (V4L2/GStreamer and virtual)
//! - [`pipelines`]: The recording state machine, encoders and duration timer
//! - [`config`]: User configuration handling
//! - [`storage`]: Output file naming and cleanup
//! - [`flash`]: Flash LED control via sysfs
//!
//! # Example
//!
//! ```ignore
//! let recorder = Recorder::new(camera_backend, encoder_factory, CaptureConfig::default())?;
//! recorder.surface_available(SurfaceTarget::Headless)?;
//! recorder.start()?;
//! // ...
//! let outcome = recorder.stop()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flash;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CameraFacing, CameraSession, SurfaceTarget};
pub use config::{CaptureConfig, Config};
pub use constants::BitratePreset;
pub use errors::{AppError, AppResult, CameraError, EncoderError, RecordingError};
pub use pipelines::video::{Recorder, RecorderEvent, RecorderState};
