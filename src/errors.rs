// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the recorder
//!
//! Each layer has its own enum so callers can match on what actually went
//! wrong: [`CameraError`] for device handling, [`EncoderError`] for the media
//! encoder lifecycle and [`RecordingError`] for the recording state machine.
//! [`AppError`] wraps all of them for the binary and for configuration code.

use crate::backends::camera::types::LockState;
use crate::pipelines::video::state::RecorderState;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for camera operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Result type alias for encoder operations
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Result type alias for recording commands
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera-related errors
    Camera(CameraError),
    /// Recording-related errors
    Recording(RecordingError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Camera-specific errors
#[derive(Debug, Clone)]
pub enum CameraError {
    /// The platform reports zero camera devices
    NoCameraAvailable,
    /// A manual camera index beyond the enumerated devices
    IndexOutOfRange { requested: usize, available: usize },
    /// The driver refused to open the device
    CameraOpenFailed(String),
    /// The device rejected a parameter set (recovered inside the session)
    ParameterRejected(String),
    /// Operation requires an open camera
    NotOpen,
    /// Operation not allowed while the camera is handed to the encoder
    Busy,
    /// Lock hand-off requested from the wrong state
    InvalidLockTransition { from: LockState, to: LockState },
    /// Any other backend failure
    Backend(String),
}

/// Media encoder errors
#[derive(Debug, Clone)]
pub enum EncoderError {
    /// Output or source configuration could not be applied
    ConfigureFailed(String),
    /// `prepare()` rejected the configuration
    PrepareFailed(String),
    /// `start()` failed after a successful prepare
    StartFailed(String),
    /// The backend has no mid-recording pause
    PauseUnsupported,
    /// stop/reset/release (or pause/resume) failed at runtime
    RuntimeFailure(String),
    /// A lifecycle call arrived out of order
    InvalidState(String),
}

/// Recording state machine errors
#[derive(Debug, Clone)]
pub enum RecordingError {
    /// Start requested while the camera is not open and previewing
    CameraNotReady,
    /// Command not valid in the current recorder state
    InvalidState {
        state: RecorderState,
        command: &'static str,
    },
    /// Stop rejected by the minimum-duration policy; the take was discarded
    DurationTooShort { elapsed_ms: u64, min_ms: u64 },
    /// `min > max` passed to set_duration
    InvalidDurationPolicy { min_ms: u64, max_ms: u64 },
    /// Encoder could not be configured, prepared or started
    EncoderPrepareFailed(String),
    /// Pause requested but the active pause strategy cannot pause
    PauseUnsupported,
    /// Camera failure surfaced to the caller
    Camera(CameraError),
    /// Output directory or file problem
    Storage(String),
    /// No tokio runtime available to drive the duration timer
    NoRuntime,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NoCameraAvailable => write!(f, "No camera devices found"),
            CameraError::IndexOutOfRange {
                requested,
                available,
            } => write!(
                f,
                "Requested camera #{} does not exist ({} available)",
                requested, available
            ),
            CameraError::CameraOpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CameraError::ParameterRejected(msg) => write!(f, "Camera rejected parameters: {}", msg),
            CameraError::NotOpen => write!(f, "Camera is not open"),
            CameraError::Busy => write!(f, "Camera is in use by the encoder"),
            CameraError::InvalidLockTransition { from, to } => {
                write!(f, "Cannot hand camera from {} to {}", from, to)
            }
            CameraError::Backend(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl fmt::Display for EncoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderError::ConfigureFailed(msg) => write!(f, "Encoder configuration failed: {}", msg),
            EncoderError::PrepareFailed(msg) => write!(f, "Encoder prepare failed: {}", msg),
            EncoderError::StartFailed(msg) => write!(f, "Encoder start failed: {}", msg),
            EncoderError::PauseUnsupported => write!(f, "Encoder does not support pause"),
            EncoderError::RuntimeFailure(msg) => write!(f, "Encoder runtime failure: {}", msg),
            EncoderError::InvalidState(msg) => write!(f, "Encoder call out of order: {}", msg),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::CameraNotReady => write!(f, "Camera is not open and previewing"),
            RecordingError::InvalidState { state, command } => {
                write!(f, "Cannot {} while {}", command, state)
            }
            RecordingError::DurationTooShort { elapsed_ms, min_ms } => write!(
                f,
                "Recording too short: {} ms recorded, at least {} ms required",
                elapsed_ms, min_ms
            ),
            RecordingError::InvalidDurationPolicy { min_ms, max_ms } => write!(
                f,
                "Minimum duration {} ms is greater than maximum {} ms",
                min_ms, max_ms
            ),
            RecordingError::EncoderPrepareFailed(msg) => {
                write!(f, "Failed to start recording: {}", msg)
            }
            RecordingError::PauseUnsupported => write!(f, "Pause is not supported"),
            RecordingError::Camera(e) => write!(f, "{}", e),
            RecordingError::Storage(msg) => write!(f, "Storage error: {}", msg),
            RecordingError::NoRuntime => write!(f, "No tokio runtime available for the timer"),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for EncoderError {}
impl std::error::Error for RecordingError {}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<RecordingError> for AppError {
    fn from(err: RecordingError) -> Self {
        AppError::Recording(err)
    }
}

impl From<CameraError> for RecordingError {
    fn from(err: CameraError) -> Self {
        RecordingError::Camera(err)
    }
}

impl From<EncoderError> for RecordingError {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::PauseUnsupported => RecordingError::PauseUnsupported,
            other => RecordingError::EncoderPrepareFailed(other.to_string()),
        }
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(err: std::io::Error) -> Self {
        RecordingError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_unsupported_keeps_its_meaning() {
        let err: RecordingError = EncoderError::PauseUnsupported.into();
        assert!(matches!(err, RecordingError::PauseUnsupported));

        let err: RecordingError = EncoderError::PrepareFailed("bad size".into()).into();
        match err {
            RecordingError::EncoderPrepareFailed(msg) => assert!(msg.contains("bad size")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_too_short_message_mentions_both_values() {
        let msg = RecordingError::DurationTooShort {
            elapsed_ms: 1200,
            min_ms: 3000,
        }
        .to_string();
        assert!(msg.contains("1200"));
        assert!(msg.contains("3000"));
    }
}
