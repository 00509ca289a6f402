// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Recording Layer                │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │      Camera      │  │ Virtual Camera  │  │
//! │  │ (V4L2/GStreamer) │  │   (software)    │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: camera traits, parameter handling and the camera session
//! - [`virtual_camera`]: software camera and encoder for headless runs and tests

pub mod camera;
pub mod virtual_camera;
