// SPDX-License-Identifier: GPL-3.0-only

//! Video recording pipeline
//!
//! - [`controller`]: the recording state machine and its shared handle
//! - [`encoder`]: encoder backend traits and the per-take encoder session
//! - [`state`]: recorder state, duration policy and take bookkeeping
//! - [`timer`]: the periodic duration timer

pub mod controller;
pub mod encoder;
#[cfg(feature = "gstreamer")]
pub mod encoder_selection;
#[cfg(feature = "gstreamer")]
pub mod gst_encoder;
pub mod state;
pub mod timer;

// Re-export commonly used types
pub use controller::{CancelReason, Recorder, RecorderEvent, RecordingController, StopOutcome};
pub use encoder::{EncoderBackend, EncoderFactory, EncoderSession, EncoderSettings};
pub use state::{
    DurationPolicy, PauseStrategy, RecorderState, RecordingSession, VideoTarget, format_duration,
};
pub use timer::{DurationTimer, TickFlow};
