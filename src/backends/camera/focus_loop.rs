// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for the auto-focus loop
//!
//! While the preview runs, a background thread re-triggers auto focus at a
//! fixed interval. The loop must be stopped before the device stops
//! previewing, changes torch state, or is handed to the encoder.

use super::FocusControl;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Action returned by one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for the periodic auto-focus thread
///
/// The thread sleeps on a channel between iterations so [`FocusLoop::stop`]
/// wakes it immediately instead of waiting out the interval.
pub struct FocusLoop {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Dropping or sending on this wakes and stops the thread
    stop_tx: Option<Sender<()>>,
    /// Name for logging
    name: String,
}

impl FocusLoop {
    /// Start triggering auto focus every `interval`
    ///
    /// The first trigger happens immediately.
    pub fn start(name: &str, focus: Arc<dyn FocusControl>, interval: Duration) -> Self {
        Self::start_with(name, interval, move || match focus.trigger_auto_focus() {
            Ok(()) => LoopAction::Continue,
            Err(e) => {
                warn!(error = %e, "Auto focus trigger failed");
                LoopAction::Continue
            }
        })
    }

    /// Start a loop running `loop_fn` every `interval` until stopped
    pub fn start_with<F>(name: &str, interval: Duration, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let name_clone = name.to_string();

        info!(name = %name, ?interval, "Starting focus loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Focus loop thread started");

            loop {
                match loop_fn() {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }
                }
            }

            info!(name = %name_clone, "Focus loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_tx: Some(stop_tx),
            name: name.to_string(),
        }
    }

    /// Signal the loop to stop and wait for the thread to finish
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            debug!(name = %self.name, "Signaling focus loop to stop");
            let _ = tx.send(());
        }

        if let Some(handle) = self.thread_handle.take() {
            match handle.join() {
                Ok(()) => debug!(name = %self.name, "Focus loop thread joined"),
                Err(_) => warn!(name = %self.name, "Focus loop thread panicked"),
            }
        }
    }

    /// Check if the loop thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for FocusLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
