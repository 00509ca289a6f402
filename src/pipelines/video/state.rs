// SPDX-License-Identifier: GPL-3.0-only

//! Recorder state, duration policy and the per-take session

use crate::errors::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::time::{Duration, Instant};
use tracing::warn;

/// Recording state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    /// Ready for a new take; no encoder exists
    #[default]
    Prepared,
    /// Encoder running, timer ticking
    Recording,
    /// Take in progress but paused
    Pausing,
}

impl RecorderState {
    /// Whether a take is in progress
    pub fn is_active(&self) -> bool {
        !matches!(self, RecorderState::Prepared)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderState::Prepared => write!(f, "prepared"),
            RecorderState::Recording => write!(f, "recording"),
            RecorderState::Pausing => write!(f, "paused"),
        }
    }
}

/// Minimum and maximum take length in milliseconds; 0 disables a bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationPolicy {
    min_ms: u64,
    max_ms: u64,
}

impl DurationPolicy {
    /// Unbounded policy
    pub const UNCONSTRAINED: DurationPolicy = DurationPolicy { min_ms: 0, max_ms: 0 };

    pub fn new(min_ms: u64, max_ms: u64) -> RecordingResult<Self> {
        // A zero max means no maximum, so any min is acceptable against it
        if max_ms > 0 && min_ms > max_ms {
            return Err(RecordingError::InvalidDurationPolicy { min_ms, max_ms });
        }
        Ok(Self { min_ms, max_ms })
    }

    pub fn min_ms(&self) -> u64 {
        self.min_ms
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    /// Stop at `elapsed_ms` would be rejected
    pub fn is_too_short(&self, elapsed_ms: u64) -> bool {
        self.min_ms > 0 && elapsed_ms < self.min_ms
    }

    /// The take has reached its maximum length
    pub fn reached_max(&self, elapsed_ms: u64) -> bool {
        self.max_ms > 0 && elapsed_ms >= self.max_ms
    }

    /// Progress towards the maximum, 0-100; always 0 without a maximum
    pub fn progress_percent(&self, elapsed_ms: u64) -> u8 {
        if self.max_ms == 0 {
            return 0;
        }
        (elapsed_ms.saturating_mul(100) / self.max_ms).min(100) as u8
    }
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            min_ms: crate::constants::DEFAULT_MIN_DURATION_MS,
            max_ms: crate::constants::DEFAULT_MAX_DURATION_MS,
        }
    }
}

/// How `pause` is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseStrategy {
    /// The encoder pauses and resumes the same file
    NativePause,
    /// Pause finalizes the current file, resume starts a new segment
    StopAndSegment,
    /// Pause is rejected
    Unsupported,
}

impl PauseStrategy {
    /// Resolve the strategy from the encoder capability and an optional override
    ///
    /// Asking for native pause on an encoder that cannot do it degrades to
    /// segmenting.
    pub fn resolve(native_supported: bool, preferred: Option<PauseStrategy>) -> Self {
        match preferred {
            Some(PauseStrategy::NativePause) if !native_supported => {
                warn!("Encoder cannot pause natively; recording paused takes as segments");
                PauseStrategy::StopAndSegment
            }
            Some(strategy) => strategy,
            None if native_supported => PauseStrategy::NativePause,
            None => PauseStrategy::StopAndSegment,
        }
    }
}

impl fmt::Display for PauseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseStrategy::NativePause => write!(f, "native pause"),
            PauseStrategy::StopAndSegment => write!(f, "stop and segment"),
            PauseStrategy::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Encoder target for a take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTarget {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Bits per second
    pub bit_rate: u32,
}

/// One take
///
/// Elapsed time is `now - started_at - paused_duration` and freezes while
/// paused.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    path: PathBuf,
    segments: Vec<PathBuf>,
    target: VideoTarget,
    started_at: Instant,
    paused_duration: Duration,
    paused_at: Option<Instant>,
    state: RecorderState,
}

impl RecordingSession {
    /// Start a take at `now`
    pub fn begin(path: PathBuf, target: VideoTarget, now: Instant) -> Self {
        Self {
            segments: vec![path.clone()],
            path,
            target,
            started_at: now,
            paused_duration: Duration::ZERO,
            paused_at: None,
            state: RecorderState::Recording,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Files written by this take, in order; the primary file first
    pub fn segments(&self) -> &[PathBuf] {
        &self.segments
    }

    pub fn push_segment(&mut self, path: PathBuf) {
        self.segments.push(path);
    }

    /// File currently being written
    pub fn current_segment(&self) -> &PathBuf {
        self.segments.last().unwrap_or(&self.path)
    }

    pub fn target(&self) -> VideoTarget {
        self.target
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn paused_duration(&self) -> Duration {
        self.paused_duration
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
        self.state = RecorderState::Pausing;
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_duration += now.saturating_duration_since(paused_at);
        }
        self.state = RecorderState::Recording;
    }

    /// Adjusted elapsed time
    pub fn elapsed(&self, now: Instant) -> Duration {
        let end = self.paused_at.unwrap_or(now);
        end.saturating_duration_since(self.started_at)
            .saturating_sub(self.paused_duration)
    }

    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        self.elapsed(now).as_millis() as u64
    }
}

/// Counter label for an elapsed time, `MM:SS`
pub fn format_duration(elapsed_ms: u64) -> String {
    let total_secs = elapsed_ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> VideoTarget {
        VideoTarget {
            width: 1920,
            height: 1080,
            frame_rate: 30,
            bit_rate: 8_000_000,
        }
    }

    #[test]
    fn test_policy_rejects_min_above_max() {
        assert!(matches!(
            DurationPolicy::new(5000, 1000),
            Err(RecordingError::InvalidDurationPolicy {
                min_ms: 5000,
                max_ms: 1000
            })
        ));
        assert!(DurationPolicy::new(5000, 0).is_ok());
        assert!(DurationPolicy::new(1000, 1000).is_ok());
    }

    #[test]
    fn test_zero_bounds_are_unconstrained() {
        let policy = DurationPolicy::UNCONSTRAINED;
        assert!(!policy.is_too_short(0));
        assert!(!policy.reached_max(u64::MAX));
        assert_eq!(policy.progress_percent(123_456), 0);
    }

    #[test]
    fn test_progress_is_clamped() {
        let policy = DurationPolicy::new(0, 15_000).unwrap();
        assert_eq!(policy.progress_percent(0), 0);
        assert_eq!(policy.progress_percent(7_500), 50);
        assert_eq!(policy.progress_percent(15_000), 100);
        assert_eq!(policy.progress_percent(30_000), 100);
    }

    #[test]
    fn test_elapsed_excludes_pauses() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut session = RecordingSession::begin(PathBuf::from("a.mp4"), target(), t0);

        session.pause(t0 + ms(2000));
        // Frozen while paused
        assert_eq!(session.elapsed_ms(t0 + ms(4000)), 2000);
        session.resume(t0 + ms(5000));
        session.pause(t0 + ms(6000));
        session.resume(t0 + ms(6500));

        assert_eq!(session.elapsed_ms(t0 + ms(9000)), 9000 - 3000 - 500);
        assert_eq!(session.state(), RecorderState::Recording);
    }

    #[test]
    fn test_pause_strategy_resolution() {
        assert_eq!(PauseStrategy::resolve(true, None), PauseStrategy::NativePause);
        assert_eq!(PauseStrategy::resolve(false, None), PauseStrategy::StopAndSegment);
        assert_eq!(
            PauseStrategy::resolve(false, Some(PauseStrategy::NativePause)),
            PauseStrategy::StopAndSegment
        );
        assert_eq!(
            PauseStrategy::resolve(true, Some(PauseStrategy::Unsupported)),
            PauseStrategy::Unsupported
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(7_999), "00:07");
        assert_eq!(format_duration(65_000), "01:05");
    }
}
