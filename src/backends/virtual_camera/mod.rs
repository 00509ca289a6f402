// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera and encoder backends
//!
//! Software stand-ins for camera hardware and the media encoder. They run the
//! recorder without devices (`camera-recorder record --virtual`) and let tests
//! inject failures and assert on the order of hardware calls.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐      ┌─────────────────────┐
//! │ VirtualCamera      │      │ VirtualEncoder      │
//! │ (CameraDevice)     │      │ (EncoderBackend)    │
//! └─────────┬──────────┘      └──────────┬──────────┘
//!           │                            │
//!           └────────────┬───────────────┘
//!                        ▼
//!                ┌──────────────┐
//!                │ CallJournal  │  ← "camera.unlock", "encoder.start", ...
//!                └──────────────┘
//! ```

mod camera;
mod encoder;

pub use camera::{ParameterRule, VirtualCamera, VirtualCameraBackend, VirtualCameraSpec};
pub use encoder::{VirtualEncoder, VirtualEncoderControl, VirtualEncoderFactory};

use std::sync::{Arc, Mutex};

/// Ordered record of hardware calls shared by the virtual camera and encoder
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.into());
        }
    }

    /// Snapshot of all entries so far
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Index of the first entry equal to `entry` at or after `from`
    pub fn position_after(&self, entry: &str, from: usize) -> Option<usize> {
        self.entries()
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, e)| e.as_str() == entry)
            .map(|(i, _)| i)
    }

    /// Number of entries equal to `entry`
    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
