// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipelines
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────┐     ┌──────────────┐
//! │ CameraSession│ ──▶ │ RecordingController │ ──▶ │   MP4 File   │
//! │  (locked)    │     │  - EncoderSession   │     │  (segments)  │
//! │              │     │  - DurationTimer    │     │              │
//! └──────────────┘     └─────────────────────┘     └──────────────┘
//! ```
//!
//! - [`video`]: the recording state machine and encoder backends

pub mod video;
