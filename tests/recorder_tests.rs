// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the recording state machine
//!
//! Every test runs on a paused tokio clock against the virtual camera and
//! encoder, so durations are exact.

use camera_recorder::backends::camera::{CameraFacing, LockState, SurfaceTarget};
use camera_recorder::backends::virtual_camera::{
    CallJournal, VirtualCameraBackend, VirtualEncoderControl, VirtualEncoderFactory,
};
use camera_recorder::config::CaptureConfig;
use camera_recorder::errors::RecordingError;
use camera_recorder::pipelines::video::{
    CancelReason, DurationPolicy, PauseStrategy, Recorder, RecorderEvent, RecorderState,
};
use camera_recorder::storage::file_size;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    recorder: Recorder,
    journal: CallJournal,
    encoder: Arc<VirtualEncoderControl>,
    events: broadcast::Receiver<RecorderEvent>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(native_pause: bool, pause_strategy: Option<PauseStrategy>) -> Self {
        let journal = CallJournal::new();
        let camera = VirtualCameraBackend::new(journal.clone());
        Self::with_camera(camera, journal, native_pause, pause_strategy)
    }

    fn with_camera(
        camera: VirtualCameraBackend,
        journal: CallJournal,
        native_pause: bool,
        pause_strategy: Option<PauseStrategy>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let factory = VirtualEncoderFactory::new(journal.clone()).native_pause(native_pause);
        let encoder = factory.control();

        let config = CaptureConfig {
            output_dir: dir.path().to_path_buf(),
            pause_strategy,
            ..CaptureConfig::default()
        };
        let recorder = Recorder::new(Box::new(camera), Box::new(factory), config).unwrap();
        let events = recorder.subscribe();

        Self {
            recorder,
            journal,
            encoder,
            events,
            _dir: dir,
        }
    }

    /// Recorder with the camera open and previewing
    fn ready() -> Self {
        let harness = Self::new(true, None);
        harness
            .recorder
            .surface_available(SurfaceTarget::Headless)
            .unwrap();
        harness
    }

    fn drain(&mut self) -> Vec<RecorderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_start_produces_file_and_event() {
    let mut h = Harness::ready();
    let path = h.recorder.start().unwrap();

    assert_eq!(h.recorder.state(), RecorderState::Recording);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Encoder);
    assert_eq!(path.file_name().unwrap(), "sample.mp4");
    assert!(path.exists());

    let events = h.drain();
    assert_eq!(events.first(), Some(&RecorderEvent::Started { path }));
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_the_take() {
    let mut h = Harness::ready();
    let path = h.recorder.start().unwrap();
    advance(5_000).await;

    let outcome = h.recorder.stop().unwrap();
    assert_eq!(outcome.duration_ms, 5_000);
    assert_eq!(outcome.path, path);
    assert_eq!(outcome.segments, vec![path.clone()]);
    assert!(file_size(&path) > 0);
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Preview);

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        RecorderEvent::Stopped { duration_ms: 5_000, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_report_progress() {
    let mut h = Harness::ready();
    h.recorder.start().unwrap();
    advance(1_500).await;

    let ticks: Vec<(u64, u8)> = h
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            RecorderEvent::Tick {
                elapsed_ms,
                percent,
            } => Some((elapsed_ms, percent)),
            _ => None,
        })
        .collect();

    assert!(ticks.len() >= 14);
    assert!(ticks.windows(2).all(|w| w[0].0 < w[1].0));
    let &(last_ms, last_percent) = ticks.last().unwrap();
    assert!(last_ms <= 1_500);
    assert_eq!(last_percent, (last_ms * 100 / 15_000) as u8);
}

#[tokio::test(start_paused = true)]
async fn test_paused_time_is_excluded() {
    let mut h = Harness::ready();
    h.recorder.start().unwrap();

    advance(2_000).await;
    h.recorder.pause().unwrap();
    assert_eq!(h.recorder.state(), RecorderState::Pausing);
    assert_eq!(h.recorder.elapsed_ms(), 2_000);

    advance(5_000).await;
    assert_eq!(h.recorder.elapsed_ms(), 2_000);
    h.recorder.resume().unwrap();

    advance(4_000).await;
    let outcome = h.recorder.stop().unwrap();
    assert_eq!(outcome.duration_ms, 6_000);
    assert_eq!(outcome.segments.len(), 1);
    assert_eq!(h.journal.count("encoder.pause"), 1);
    assert_eq!(h.journal.count("encoder.resume"), 1);

    let events = h.drain();
    assert!(events.contains(&RecorderEvent::Paused { elapsed_ms: 2_000 }));
    assert!(events.contains(&RecorderEvent::Resumed));
}

#[tokio::test(start_paused = true)]
async fn test_no_ticks_while_paused() {
    let mut h = Harness::ready();
    h.recorder.start().unwrap();
    advance(1_000).await;
    h.recorder.pause().unwrap();
    h.drain();

    advance(3_000).await;
    assert!(
        !h.drain()
            .iter()
            .any(|e| matches!(e, RecorderEvent::Tick { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_max_duration_stops_exactly_once() {
    let mut h = Harness::ready();
    let path = h.recorder.start().unwrap();

    advance(16_000).await;
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert!(file_size(&path) > 0);

    let events = h.drain();
    let stops: Vec<&RecorderEvent> = events
        .iter()
        .filter(|e| matches!(e, RecorderEvent::Stopped { .. }))
        .collect();
    assert_eq!(stops.len(), 1);
    assert!(matches!(
        stops[0],
        RecorderEvent::Stopped {
            duration_ms: 15_000,
            ..
        }
    ));

    let last_tick = events
        .iter()
        .rev()
        .find_map(|e| match e {
            RecorderEvent::Tick { percent, .. } => Some(*percent),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_tick, 100);

    // A stop after the automatic stop is rejected
    assert!(matches!(
        h.recorder.stop(),
        Err(RecordingError::InvalidState { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_too_short_stop_discards_take() {
    let mut h = Harness::ready();
    let path = h.recorder.start().unwrap();
    advance(1_000).await;

    let result = h.recorder.stop();
    assert!(matches!(
        result,
        Err(RecordingError::DurationTooShort {
            elapsed_ms: 1_000,
            min_ms: 3_000
        })
    ));
    assert!(!path.exists());
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Preview);

    let events = h.drain();
    let too_short = events
        .iter()
        .position(|e| matches!(e, RecorderEvent::TooShort { .. }))
        .unwrap();
    let cancelled = events
        .iter()
        .position(|e| {
            *e == RecorderEvent::Cancelled {
                reason: CancelReason::TooShort,
            }
        })
        .unwrap();
    assert!(too_short < cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_recording() {
    let mut h = Harness::ready();
    let path = h.recorder.start().unwrap();
    advance(4_000).await;

    h.recorder.cancel();
    assert!(!path.exists());
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert!(h.drain().contains(&RecorderEvent::Cancelled {
        reason: CancelReason::Requested
    }));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_paused() {
    let mut h = Harness::ready();
    let path = h.recorder.start().unwrap();
    advance(4_000).await;
    h.recorder.pause().unwrap();

    h.recorder.cancel();
    assert!(!path.exists());
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_when_idle_is_a_no_op() {
    let mut h = Harness::ready();
    h.recorder.cancel();
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert!(h.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_commands_rejected_in_wrong_state() {
    let h = Harness::ready();
    assert!(matches!(
        h.recorder.pause(),
        Err(RecordingError::InvalidState { .. })
    ));
    assert!(matches!(
        h.recorder.resume(),
        Err(RecordingError::InvalidState { .. })
    ));
    assert!(matches!(
        h.recorder.stop(),
        Err(RecordingError::InvalidState { .. })
    ));

    h.recorder.start().unwrap();
    assert!(matches!(
        h.recorder.start(),
        Err(RecordingError::InvalidState { .. })
    ));
    assert!(matches!(
        h.recorder.resume(),
        Err(RecordingError::InvalidState { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_start_without_camera() {
    let h = Harness::new(true, None);
    assert!(matches!(
        h.recorder.start(),
        Err(RecordingError::CameraNotReady)
    ));
    assert_eq!(h.journal.count("encoder.configure"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_set_duration_validation() {
    let h = Harness::ready();
    assert!(matches!(
        h.recorder.set_duration(5_000, 1_000),
        Err(RecordingError::InvalidDurationPolicy {
            min_ms: 5_000,
            max_ms: 1_000
        })
    ));
    assert_eq!(h.recorder.duration_policy(), DurationPolicy::default());

    h.recorder.set_duration(5_000, 0).unwrap();
    let policy = h.recorder.duration_policy();
    assert_eq!(policy.min_ms(), 5_000);
    assert_eq!(policy.max_ms(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_maximum_keeps_recording() {
    let mut h = Harness::ready();
    h.recorder.set_duration(0, 0).unwrap();
    h.recorder.start().unwrap();
    advance(60_000).await;

    assert_eq!(h.recorder.state(), RecorderState::Recording);
    assert!(h.drain().iter().all(|e| match e {
        RecorderEvent::Tick { percent, .. } => *percent == 0,
        _ => true,
    }));
    assert_eq!(h.recorder.stop().unwrap().duration_ms, 60_000);
}

#[tokio::test(start_paused = true)]
async fn test_camera_handed_to_encoder_in_order() {
    let h = Harness::ready();
    h.recorder.start().unwrap();
    advance(3_500).await;
    h.recorder.stop().unwrap();

    let j = &h.journal;
    let unlock = j.position_after("camera.unlock", 0).unwrap();
    let configure = j.position_after("encoder.configure", 0).unwrap();
    assert!(unlock < configure);

    let stop = j.position_after("encoder.stop", configure).unwrap();
    let reset = j.position_after("encoder.reset", stop).unwrap();
    let release = j.position_after("encoder.release", reset).unwrap();
    let relock = j.position_after("camera.lock", 0).unwrap();
    assert!(release < relock);
}

#[tokio::test(start_paused = true)]
async fn test_prepare_failure_unwinds() {
    let mut h = Harness::ready();
    h.encoder.set_fail_prepare(true);

    let result = h.recorder.start();
    assert!(matches!(result, Err(RecordingError::EncoderPrepareFailed(_))));
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Preview);
    assert!(!h.recorder.video_path().exists());
    assert_eq!(h.journal.count("encoder.start"), 0);
    assert_eq!(h.journal.count("encoder.release"), 1);
    assert!(
        !h.drain()
            .iter()
            .any(|e| matches!(e, RecorderEvent::Started { .. }))
    );

    // The next attempt works
    h.encoder.set_fail_prepare(false);
    h.recorder.start().unwrap();
    assert_eq!(h.recorder.state(), RecorderState::Recording);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_removes_file() {
    let h = Harness::ready();
    h.encoder.set_fail_start(true);

    assert!(h.recorder.start().is_err());
    assert!(!h.recorder.video_path().exists());
    assert_eq!(h.recorder.camera_lock_state(), LockState::Preview);
}

#[tokio::test(start_paused = true)]
async fn test_encoder_stop_failure_still_returns_to_prepared() {
    let h = Harness::ready();
    h.recorder.start().unwrap();
    advance(4_000).await;
    h.encoder.set_fail_stop(true);

    let outcome = h.recorder.stop().unwrap();
    assert_eq!(outcome.duration_ms, 4_000);
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Preview);
    assert_eq!(h.journal.count("encoder.release"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_segmented_pause() {
    let h = Harness::new(false, None);
    h.recorder
        .surface_available(SurfaceTarget::Headless)
        .unwrap();

    let path = h.recorder.start().unwrap();
    assert_eq!(
        h.recorder.pause_strategy(),
        Some(PauseStrategy::StopAndSegment)
    );
    advance(3_000).await;
    h.recorder.pause().unwrap();
    // The first file is finalized while paused
    assert_eq!(h.journal.count("encoder.release"), 1);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Encoder);

    advance(1_000).await;
    h.recorder.resume().unwrap();
    advance(1_000).await;
    let outcome = h.recorder.stop().unwrap();

    let part = path.with_file_name("sample_part1.mp4");
    assert_eq!(outcome.duration_ms, 4_000);
    assert_eq!(outcome.segments, vec![path.clone(), part.clone()]);
    assert!(file_size(&path) > 0);
    assert!(file_size(&part) > 0);
    assert_eq!(h.journal.count("encoder.pause"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_removes_every_segment() {
    let h = Harness::new(false, None);
    h.recorder
        .surface_available(SurfaceTarget::Headless)
        .unwrap();

    let path = h.recorder.start().unwrap();
    advance(1_000).await;
    h.recorder.pause().unwrap();
    h.recorder.resume().unwrap();
    advance(1_000).await;
    h.recorder.cancel();

    assert!(!path.exists());
    assert!(!path.with_file_name("sample_part1.mp4").exists());
}

#[tokio::test(start_paused = true)]
async fn test_pause_unsupported() {
    let h = Harness::new(true, Some(PauseStrategy::Unsupported));
    h.recorder
        .surface_available(SurfaceTarget::Headless)
        .unwrap();
    h.recorder.start().unwrap();

    assert!(matches!(
        h.recorder.pause(),
        Err(RecordingError::PauseUnsupported)
    ));
    assert_eq!(h.recorder.state(), RecorderState::Recording);
}

#[tokio::test(start_paused = true)]
async fn test_surface_loss_cancels_take() {
    let mut h = Harness::ready();
    let path = h.recorder.start().unwrap();
    advance(5_000).await;

    h.recorder.surface_unavailable();
    assert!(!path.exists());
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert!(!h.recorder.is_camera_open());
    assert!(h.drain().contains(&RecorderEvent::Cancelled {
        reason: CancelReason::SurfaceLost
    }));
    assert_eq!(h.journal.count("camera.release"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_surface_loss_with_failed_relock_keeps_camera_closed() {
    let journal = CallJournal::new();
    let camera = VirtualCameraBackend::new(journal.clone()).fail_lock(true);
    let mut h = Harness::with_camera(camera, journal, true, None);
    h.recorder
        .surface_available(SurfaceTarget::Headless)
        .unwrap();
    let path = h.recorder.start().unwrap();
    advance(1_000).await;

    h.recorder.surface_unavailable();
    assert!(!path.exists());
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert!(!h.recorder.is_camera_open());
    assert!(h.journal.count("camera.lock:failed") >= 1);
    // No reopen without a surface
    assert_eq!(h.journal.count("camera.open#0"), 1);
    assert_eq!(h.journal.count("camera.release"), 1);
    assert!(h.drain().contains(&RecorderEvent::Cancelled {
        reason: CancelReason::SurfaceLost
    }));
}

#[tokio::test(start_paused = true)]
async fn test_failed_relock_after_stop_reopens_camera() {
    let journal = CallJournal::new();
    let camera = VirtualCameraBackend::new(journal.clone()).fail_lock(true);
    let h = Harness::with_camera(camera, journal, true, None);
    h.recorder
        .surface_available(SurfaceTarget::Headless)
        .unwrap();
    h.recorder.start().unwrap();
    advance(5_000).await;

    h.recorder.stop().unwrap();
    assert_eq!(h.recorder.state(), RecorderState::Prepared);
    assert!(h.recorder.is_camera_open());
    assert_eq!(h.recorder.camera_lock_state(), LockState::Preview);
    assert_eq!(h.journal.count("camera.open#0"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reverse_camera() {
    let h = Harness::ready();
    assert_eq!(h.recorder.facing(), CameraFacing::Back);

    assert_eq!(h.recorder.reverse_camera().unwrap(), CameraFacing::Front);
    let handle = h.recorder.camera_handle().unwrap();
    assert_eq!(handle.facing(), CameraFacing::Front);
    assert_eq!(h.journal.count("camera.open#1"), 1);
    assert!(!h.recorder.torch_available());

    h.recorder.start().unwrap();
    assert!(matches!(
        h.recorder.reverse_camera(),
        Err(RecordingError::InvalidState { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_manual_camera_id() {
    let h = Harness::ready();
    h.recorder.set_manual_camera_id(Some(1)).unwrap();
    assert_eq!(h.recorder.camera_handle().unwrap().index(), 1);

    assert!(h.recorder.set_manual_camera_id(Some(7)).is_err());
    assert!(!h.recorder.is_camera_open());
}

#[tokio::test(start_paused = true)]
async fn test_torch_on_back_camera() {
    let h = Harness::ready();
    assert!(h.recorder.torch_available());
    assert!(!h.recorder.torch_state());

    h.recorder.set_torch(true).unwrap();
    assert!(h.recorder.torch_state());
    // Idempotent
    h.recorder.set_torch(true).unwrap();
    h.recorder.set_torch(false).unwrap();
    assert!(!h.recorder.torch_state());
}

#[tokio::test(start_paused = true)]
async fn test_torch_switches_during_take() {
    let h = Harness::ready();
    h.recorder.start().unwrap();
    assert_eq!(h.recorder.camera_lock_state(), LockState::Encoder);
    assert!(h.recorder.torch_available());

    h.recorder.set_torch(true).unwrap();
    assert!(h.recorder.torch_state());
    assert_eq!(h.journal.count("camera.torch:on"), 1);

    h.recorder.pause().unwrap();
    h.recorder.set_torch(false).unwrap();
    assert!(!h.recorder.torch_state());
    assert_eq!(h.journal.count("camera.torch:off"), 1);

    // The take itself is unaffected
    h.recorder.resume().unwrap();
    assert_eq!(h.recorder.state(), RecorderState::Recording);
    assert_eq!(h.recorder.camera_lock_state(), LockState::Encoder);
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_reports_camera_error() {
    let dir = tempfile::tempdir().unwrap();
    let journal = CallJournal::new();
    let camera = VirtualCameraBackend::new(journal.clone()).fail_open(true);
    let config = CaptureConfig {
        output_dir: dir.path().to_path_buf(),
        ..CaptureConfig::default()
    };
    let recorder = Recorder::new(
        Box::new(camera),
        Box::new(VirtualEncoderFactory::new(journal)),
        config,
    )
    .unwrap();
    let mut events = recorder.subscribe();

    assert!(recorder.surface_available(SurfaceTarget::Headless).is_err());
    assert!(!recorder.is_camera_open());
    assert!(matches!(
        events.try_recv(),
        Ok(RecorderEvent::CameraError(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_set_video_path() {
    let h = Harness::ready();
    let other = tempfile::tempdir().unwrap();
    h.recorder
        .set_video_path(other.path().join("clips"), "take")
        .unwrap();
    assert_eq!(
        h.recorder.video_path(),
        other.path().join("clips").join("take.mp4")
    );

    let path = h.recorder.start().unwrap();
    assert_eq!(path, other.path().join("clips").join("take.mp4"));
    assert!(
        h.recorder
            .set_video_path(other.path().to_path_buf(), "x")
            .is_err()
    );
    h.recorder.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_existing_file_is_replaced() {
    let h = Harness::ready();
    let path = h.recorder.video_path();
    std::fs::write(&path, b"stale").unwrap();

    h.recorder.start().unwrap();
    advance(3_000).await;
    h.recorder.stop().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(!contents.contains("stale"));
}

#[tokio::test]
async fn test_new_requires_runtime_handle() {
    // Inside a runtime the handle is found
    let journal = CallJournal::new();
    let recorder = Recorder::new(
        Box::new(VirtualCameraBackend::new(journal.clone())),
        Box::new(VirtualEncoderFactory::new(journal)),
        CaptureConfig::default(),
    );
    assert!(recorder.is_ok());
}

#[test]
fn test_new_outside_runtime() {
    let journal = CallJournal::new();
    let recorder = Recorder::new(
        Box::new(VirtualCameraBackend::new(journal.clone())),
        Box::new(VirtualEncoderFactory::new(journal)),
        CaptureConfig::default(),
    );
    assert!(matches!(recorder, Err(RecordingError::NoRuntime)));
}
