// SPDX-License-Identifier: GPL-3.0-only

//! Recording controller
//!
//! The state machine that owns the camera session and the per-take encoder:
//!
//! ```text
//! PREPARED ──start──▶ RECORDING ──pause──▶ PAUSING
//!    ▲                  │   ▲                 │
//!    │                  │   └─────resume──────┘
//!    └──stop/cancel/max─┴─────────────────────┘
//! ```
//!
//! [`Recorder`] is the cloneable, thread-safe handle callers use. Every
//! command runs under one mutex; the duration timer only holds a weak
//! reference and takes the same lock for each tick.

use super::encoder::EncoderFactory;
use super::encoder::EncoderSession;
use super::state::{
    DurationPolicy, PauseStrategy, RecorderState, RecordingSession, VideoTarget,
};
use super::timer::{DurationTimer, TickFlow};
use crate::backends::camera::types::{CameraFacing, DeviceBinding, LockState, SurfaceTarget};
use crate::backends::camera::{ApplyOutcome, CameraBackend, CameraInfo, CameraSession};
use crate::config::CaptureConfig;
use crate::constants::timing::TICK_INTERVAL;
use crate::errors::{RecordingError, RecordingResult};
use crate::storage;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Why a take was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit cancel command
    Requested,
    /// Stop arrived before the minimum duration
    TooShort,
    /// The preview surface went away or the camera was closed
    SurfaceLost,
}

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    Started {
        path: PathBuf,
    },
    Tick {
        elapsed_ms: u64,
        percent: u8,
    },
    Paused {
        elapsed_ms: u64,
    },
    Resumed,
    Stopped {
        duration_ms: u64,
        path: PathBuf,
        /// Every file of the take; more than one only with segmented pause
        segments: Vec<PathBuf>,
    },
    Cancelled {
        reason: CancelReason,
    },
    /// Stop was rejected by the minimum duration; a `Cancelled` follows
    TooShort {
        elapsed_ms: u64,
        min_ms: u64,
    },
    /// Non-fatal camera problem worth showing to the user
    CameraError(String),
}

/// Result of a kept take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub duration_ms: u64,
    pub path: PathBuf,
    pub segments: Vec<PathBuf>,
}

/// The take in progress
struct ActiveTake {
    session: RecordingSession,
    /// None between segments under `StopAndSegment`
    encoder: Option<EncoderSession>,
    binding: DeviceBinding,
    strategy: PauseStrategy,
}

/// Recording state machine
pub struct RecordingController {
    camera: CameraSession,
    encoders: Box<dyn EncoderFactory>,
    target: VideoTarget,
    policy: DurationPolicy,
    facing: CameraFacing,
    manual_camera_id: Option<usize>,
    output_dir: PathBuf,
    base_name: String,
    pause_override: Option<PauseStrategy>,
    auto_open: bool,
    surface: Option<SurfaceTarget>,
    state: RecorderState,
    take: Option<ActiveTake>,
    timer: DurationTimer,
    events: broadcast::Sender<RecorderEvent>,
    runtime: Handle,
    this: Weak<Mutex<RecordingController>>,
}

impl RecordingController {
    fn new(
        camera: CameraSession,
        encoders: Box<dyn EncoderFactory>,
        config: CaptureConfig,
        events: broadcast::Sender<RecorderEvent>,
        runtime: Handle,
        this: Weak<Mutex<RecordingController>>,
    ) -> Self {
        Self {
            camera,
            encoders,
            target: config.target,
            policy: config.duration,
            facing: config.facing,
            manual_camera_id: config.camera_index,
            output_dir: config.output_dir,
            base_name: config.base_name,
            pause_override: config.pause_strategy,
            auto_open: config.auto_open,
            surface: None,
            state: RecorderState::Prepared,
            take: None,
            timer: DurationTimer::new(TICK_INTERVAL),
            events,
            runtime,
            this,
        }
    }

    fn emit(&self, event: RecorderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Adjusted elapsed time of the current take, 0 when idle
    pub fn elapsed_ms(&self) -> u64 {
        self.take
            .as_ref()
            .map(|t| t.session.elapsed_ms(Instant::now()))
            .unwrap_or(0)
    }

    pub fn policy(&self) -> DurationPolicy {
        self.policy
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Pause strategy of the current take
    pub fn pause_strategy(&self) -> Option<PauseStrategy> {
        self.take.as_ref().map(|t| t.strategy)
    }

    pub fn camera(&self) -> &CameraSession {
        &self.camera
    }

    // ===== Surface and camera lifecycle =====

    pub fn surface_available(&mut self, target: SurfaceTarget) -> RecordingResult<()> {
        info!(?target, "Preview surface available");
        self.surface = Some(target);
        if self.auto_open {
            self.open_camera()?;
        }
        Ok(())
    }

    /// The surface is gone: cancel any take and close the camera
    pub fn surface_unavailable(&mut self) {
        info!("Preview surface unavailable");
        // Cleared first so a failed relock does not reopen the camera
        self.surface = None;
        if self.state.is_active() {
            self.cancel_take(CancelReason::SurfaceLost);
        }
        self.camera.close();
    }

    /// Open the camera and start the preview
    pub fn open_camera(&mut self) -> RecordingResult<()> {
        let result = self.open_and_preview();
        if let Err(e) = &result {
            error!(error = %e, "Failed to open camera");
            self.emit(RecorderEvent::CameraError(e.to_string()));
        }
        result
    }

    fn open_and_preview(&mut self) -> RecordingResult<()> {
        let handle = self.camera.open(self.manual_camera_id, self.facing)?;
        if self.camera.last_outcome() != Some(ApplyOutcome::Full) {
            info!(camera = %handle, "Camera running with reduced parameters");
        }
        let target = self.surface.clone().unwrap_or_default();
        if let Err(e) = self.camera.start_preview(&target) {
            self.camera.close();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn close_camera(&mut self) {
        if self.state.is_active() {
            self.cancel_take(CancelReason::SurfaceLost);
        }
        self.camera.close();
    }

    // ===== Commands =====

    /// Start a take
    pub fn start(&mut self) -> RecordingResult<PathBuf> {
        if self.state != RecorderState::Prepared {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "start",
            });
        }
        if !self.camera.is_open() || !self.camera.is_previewing() {
            return Err(RecordingError::CameraNotReady);
        }

        storage::ensure_dir(&self.output_dir)?;
        let path = storage::video_path(&self.output_dir, &self.base_name);
        let strategy =
            PauseStrategy::resolve(self.encoders.supports_native_pause(), self.pause_override);

        let binding = self.camera.unlock_for_encoder()?;
        let encoder = match self.open_encoder(&binding, &path) {
            Ok(encoder) => encoder,
            Err(e) => {
                error!(error = %e, "Failed to start recording");
                self.reclaim_camera();
                if let Err(e) = storage::remove_file_if_exists(&path) {
                    warn!(error = %e, "Failed to delete partial file");
                }
                return Err(e);
            }
        };

        let session = RecordingSession::begin(path.clone(), self.target, Instant::now());
        self.take = Some(ActiveTake {
            session,
            encoder: Some(encoder),
            binding,
            strategy,
        });
        self.state = RecorderState::Recording;
        self.start_timer();

        info!(path = %path.display(), %strategy, "Recording started");
        self.emit(RecorderEvent::Started { path: path.clone() });
        Ok(path)
    }

    pub fn pause(&mut self) -> RecordingResult<()> {
        if self.state != RecorderState::Recording {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "pause",
            });
        }
        let Some(take) = self.take.as_mut() else {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "pause",
            });
        };
        if take.strategy == PauseStrategy::Unsupported {
            return Err(RecordingError::PauseUnsupported);
        }

        self.timer.stop();
        let now = Instant::now();

        match take.strategy {
            PauseStrategy::NativePause => {
                if let Some(encoder) = take.encoder.as_mut() {
                    if let Err(e) = encoder.pause() {
                        warn!(error = %e, "Encoder pause failed");
                        self.start_timer();
                        return Err(e.into());
                    }
                }
            }
            PauseStrategy::StopAndSegment => {
                if let Some(encoder) = take.encoder.take() {
                    let segment = encoder.output_path().to_path_buf();
                    if let Err(e) = encoder.finish() {
                        warn!(error = %e, "Failed to finalize segment");
                    }
                    debug!(segment = %segment.display(), "Segment finalized");
                }
            }
            PauseStrategy::Unsupported => {}
        }

        take.session.pause(now);
        let elapsed_ms = take.session.elapsed_ms(now);
        self.state = RecorderState::Pausing;

        info!(elapsed_ms, "Recording paused");
        self.emit(RecorderEvent::Paused { elapsed_ms });
        Ok(())
    }

    pub fn resume(&mut self) -> RecordingResult<()> {
        if self.state != RecorderState::Pausing {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "resume",
            });
        }
        let Some(take) = self.take.as_mut() else {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "resume",
            });
        };

        match take.strategy {
            PauseStrategy::NativePause => {
                if let Some(encoder) = take.encoder.as_mut() {
                    encoder.resume()?;
                }
            }
            PauseStrategy::StopAndSegment => {
                let part = take.session.segments().len();
                let path = storage::segment_path(&self.output_dir, &self.base_name, part);
                let mut encoder = EncoderSession::configure(
                    self.encoders.as_ref(),
                    take.binding.clone(),
                    self.target,
                    &path,
                )?;
                if let Err(e) = encoder.prepare_and_start() {
                    drop(encoder);
                    if let Err(e) = storage::remove_file_if_exists(&path) {
                        warn!(error = %e, "Failed to delete partial segment");
                    }
                    return Err(e.into());
                }
                take.session.push_segment(path.clone());
                take.encoder = Some(encoder);
                debug!(segment = %path.display(), "New segment started");
            }
            PauseStrategy::Unsupported => {}
        }

        take.session.resume(Instant::now());
        self.state = RecorderState::Recording;
        self.start_timer();

        info!("Recording resumed");
        self.emit(RecorderEvent::Resumed);
        Ok(())
    }

    /// Stop and keep the take
    ///
    /// Below the minimum duration the take is discarded instead and
    /// `DurationTooShort` is returned.
    pub fn stop(&mut self) -> RecordingResult<StopOutcome> {
        if !self.state.is_active() {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "stop",
            });
        }
        self.timer.stop();

        let elapsed_ms = self.elapsed_ms();
        if self.policy.is_too_short(elapsed_ms) {
            let min_ms = self.policy.min_ms();
            warn!(elapsed_ms, min_ms, "Recording too short, discarding");
            self.emit(RecorderEvent::TooShort { elapsed_ms, min_ms });
            self.cancel_take(CancelReason::TooShort);
            return Err(RecordingError::DurationTooShort { elapsed_ms, min_ms });
        }

        self.finish_take(elapsed_ms)
    }

    /// Discard the take
    ///
    /// Cancelling with no take in progress does nothing.
    pub fn cancel(&mut self) {
        if !self.state.is_active() {
            debug!("Cancel with no take in progress");
            return;
        }
        self.cancel_take(CancelReason::Requested);
    }

    /// Switch between front and back camera
    pub fn reverse_camera(&mut self) -> RecordingResult<CameraFacing> {
        if self.state.is_active() {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "switch camera",
            });
        }
        self.facing = self.facing.reversed();
        self.manual_camera_id = None;
        info!(facing = %self.facing, "Reversing camera");
        self.reopen_camera()?;
        Ok(self.facing)
    }

    /// Pin a camera index, or go back to facing-based selection with `None`
    pub fn set_manual_camera_id(&mut self, index: Option<usize>) -> RecordingResult<()> {
        if self.state.is_active() {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "select camera",
            });
        }
        self.manual_camera_id = index;
        self.reopen_camera()
    }

    fn reopen_camera(&mut self) -> RecordingResult<()> {
        if !self.camera.is_open() {
            return Ok(());
        }
        self.camera.close();
        if self.surface.is_some() || self.auto_open {
            self.open_camera()?;
        }
        Ok(())
    }

    pub fn set_torch(&mut self, enable: bool) -> RecordingResult<()> {
        self.camera.set_torch(enable)?;
        Ok(())
    }

    pub fn torch_state(&self) -> bool {
        self.camera.torch_state()
    }

    /// Torch control is offered for the back camera only
    pub fn torch_available(&self) -> bool {
        self.camera
            .handle()
            .map(|h| h.facing() == CameraFacing::Back)
            .unwrap_or(false)
            && self.camera.torch_supported()
    }

    pub fn set_duration(&mut self, min_ms: u64, max_ms: u64) -> RecordingResult<()> {
        self.policy = DurationPolicy::new(min_ms, max_ms)?;
        info!(min_ms, max_ms, "Duration policy updated");
        Ok(())
    }

    /// Output location for the next take
    pub fn set_video_path(&mut self, dir: PathBuf, base_name: &str) -> RecordingResult<()> {
        if self.state.is_active() {
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "change output path",
            });
        }
        if base_name.trim().is_empty() {
            return Err(RecordingError::Storage("empty base name".into()));
        }
        self.output_dir = dir;
        self.base_name = base_name.to_string();
        Ok(())
    }

    pub fn video_path(&self) -> PathBuf {
        storage::video_path(&self.output_dir, &self.base_name)
    }

    pub fn is_same_orientation(&self) -> bool {
        self.camera.is_same_orientation()
    }

    // ===== Internals =====

    fn open_encoder(
        &mut self,
        binding: &DeviceBinding,
        path: &std::path::Path,
    ) -> RecordingResult<EncoderSession> {
        let mut encoder =
            EncoderSession::configure(self.encoders.as_ref(), binding.clone(), self.target, path)?;
        encoder.prepare_and_start()?;
        Ok(encoder)
    }

    fn start_timer(&mut self) {
        let weak = self.this.clone();
        self.timer.start(&self.runtime, move |generation| {
            let Some(inner) = weak.upgrade() else {
                return TickFlow::Stop;
            };
            let mut controller = lock(&inner);
            controller.on_tick(generation)
        });
    }

    fn on_tick(&mut self, generation: u64) -> TickFlow {
        if !self.timer.is_current(generation) || self.state != RecorderState::Recording {
            return TickFlow::Stop;
        }

        let elapsed_ms = self.elapsed_ms();
        let percent = self.policy.progress_percent(elapsed_ms);
        self.emit(RecorderEvent::Tick {
            elapsed_ms,
            percent,
        });

        if self.policy.reached_max(elapsed_ms) {
            info!(elapsed_ms, "Maximum duration reached");
            self.timer.stop();
            if let Err(e) = self.finish_take(elapsed_ms) {
                error!(error = %e, "Failed to stop at maximum duration");
            }
            return TickFlow::Stop;
        }
        TickFlow::Continue
    }

    /// Finalize the encoder, give the camera back and report the file
    fn finish_take(&mut self, elapsed_ms: u64) -> RecordingResult<StopOutcome> {
        self.timer.stop();
        let Some(mut take) = self.take.take() else {
            self.state = RecorderState::Prepared;
            return Err(RecordingError::InvalidState {
                state: self.state,
                command: "stop",
            });
        };

        if let Some(encoder) = take.encoder.take() {
            if let Err(e) = encoder.finish() {
                warn!(error = %e, "Encoder teardown failed; keeping what was written");
            }
        }
        self.reclaim_camera();
        self.state = RecorderState::Prepared;

        let outcome = StopOutcome {
            duration_ms: elapsed_ms,
            path: take.session.path().clone(),
            segments: take.session.segments().to_vec(),
        };
        info!(
            duration_ms = outcome.duration_ms,
            path = %outcome.path.display(),
            segments = outcome.segments.len(),
            "Recording stopped"
        );
        self.emit(RecorderEvent::Stopped {
            duration_ms: outcome.duration_ms,
            path: outcome.path.clone(),
            segments: outcome.segments.clone(),
        });
        Ok(outcome)
    }

    /// Tear the take down and delete its files
    fn cancel_take(&mut self, reason: CancelReason) {
        self.timer.stop();

        if let Some(mut take) = self.take.take() {
            if let Some(mut encoder) = take.encoder.take() {
                encoder.teardown();
            }
            self.reclaim_camera();
            for path in take.session.segments() {
                if let Err(e) = storage::remove_file_if_exists(path) {
                    warn!(path = %path.display(), error = %e, "Failed to delete cancelled take");
                }
            }
        } else {
            self.reclaim_camera();
        }

        self.state = RecorderState::Prepared;
        info!(?reason, "Recording cancelled");
        self.emit(RecorderEvent::Cancelled { reason });
    }

    /// Relock the camera after the encoder is gone
    ///
    /// A camera that refuses to relock is closed and, with a surface present,
    /// reopened so the next take can start.
    fn reclaim_camera(&mut self) {
        if self.camera.lock_state() != LockState::Encoder {
            return;
        }
        if let Err(e) = self.camera.relock() {
            warn!(error = %e, "Camera relock failed, reopening");
            self.emit(RecorderEvent::CameraError(e.to_string()));
            self.camera.close();
            if self.surface.is_some() {
                if let Err(e) = self.open_camera() {
                    debug!(error = %e, "Camera reopen after failed relock did not succeed");
                }
            }
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.timer.stop();
        if self.state.is_active() {
            self.cancel_take(CancelReason::SurfaceLost);
        }
    }
}

fn lock(inner: &Mutex<RecordingController>) -> MutexGuard<'_, RecordingController> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to a [`RecordingController`]
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Mutex<RecordingController>>,
    events: broadcast::Sender<RecorderEvent>,
}

impl Recorder {
    /// Build a recorder on the current tokio runtime
    pub fn new(
        camera: Box<dyn CameraBackend>,
        encoders: Box<dyn EncoderFactory>,
        config: CaptureConfig,
    ) -> RecordingResult<Self> {
        let runtime = Handle::try_current().map_err(|_| RecordingError::NoRuntime)?;
        Ok(Self::with_runtime(camera, encoders, config, runtime))
    }

    /// Build a recorder whose timer runs on `runtime`
    pub fn with_runtime(
        camera: Box<dyn CameraBackend>,
        encoders: Box<dyn EncoderFactory>,
        config: CaptureConfig,
        runtime: Handle,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = CameraSession::new(camera, config.parameter_request());
        let controller_events = events.clone();

        let inner = Arc::new_cyclic(|weak| {
            Mutex::new(RecordingController::new(
                session,
                encoders,
                config,
                controller_events,
                runtime,
                weak.clone(),
            ))
        });

        Self { inner, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    fn controller(&self) -> MutexGuard<'_, RecordingController> {
        lock(&self.inner)
    }

    pub fn surface_available(&self, target: SurfaceTarget) -> RecordingResult<()> {
        self.controller().surface_available(target)
    }

    pub fn surface_unavailable(&self) {
        self.controller().surface_unavailable()
    }

    pub fn open_camera(&self) -> RecordingResult<()> {
        self.controller().open_camera()
    }

    pub fn close_camera(&self) {
        self.controller().close_camera()
    }

    pub fn start(&self) -> RecordingResult<PathBuf> {
        self.controller().start()
    }

    pub fn pause(&self) -> RecordingResult<()> {
        self.controller().pause()
    }

    pub fn resume(&self) -> RecordingResult<()> {
        self.controller().resume()
    }

    pub fn stop(&self) -> RecordingResult<StopOutcome> {
        self.controller().stop()
    }

    pub fn cancel(&self) {
        self.controller().cancel()
    }

    pub fn reverse_camera(&self) -> RecordingResult<CameraFacing> {
        self.controller().reverse_camera()
    }

    pub fn set_manual_camera_id(&self, index: Option<usize>) -> RecordingResult<()> {
        self.controller().set_manual_camera_id(index)
    }

    pub fn set_torch(&self, enable: bool) -> RecordingResult<()> {
        self.controller().set_torch(enable)
    }

    pub fn torch_state(&self) -> bool {
        self.controller().torch_state()
    }

    pub fn torch_available(&self) -> bool {
        self.controller().torch_available()
    }

    pub fn set_duration(&self, min_ms: u64, max_ms: u64) -> RecordingResult<()> {
        self.controller().set_duration(min_ms, max_ms)
    }

    pub fn duration_policy(&self) -> DurationPolicy {
        self.controller().policy()
    }

    pub fn set_video_path(&self, dir: PathBuf, base_name: &str) -> RecordingResult<()> {
        self.controller().set_video_path(dir, base_name)
    }

    pub fn video_path(&self) -> PathBuf {
        self.controller().video_path()
    }

    pub fn state(&self) -> RecorderState {
        self.controller().state()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.controller().elapsed_ms()
    }

    pub fn pause_strategy(&self) -> Option<PauseStrategy> {
        self.controller().pause_strategy()
    }

    pub fn facing(&self) -> CameraFacing {
        self.controller().facing()
    }

    pub fn is_same_orientation(&self) -> bool {
        self.controller().is_same_orientation()
    }

    /// Lock state of the camera device
    pub fn camera_lock_state(&self) -> LockState {
        self.controller().camera().lock_state()
    }

    pub fn is_camera_open(&self) -> bool {
        self.controller().camera().is_open()
    }

    pub fn cameras(&self) -> Vec<CameraInfo> {
        self.controller().camera().cameras()
    }

    /// Handle of the open camera
    pub fn camera_handle(&self) -> Option<crate::backends::camera::CameraHandle> {
        self.controller().camera().handle().cloned()
    }
}
