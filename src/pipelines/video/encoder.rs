// SPDX-License-Identifier: GPL-3.0-only

//! Media encoder abstraction and the per-take encoder session
//!
//! The encoder lifecycle is strict:
//!
//! ```text
//! configure → prepare → start ⇄ pause/resume → stop → reset → release
//! ```
//!
//! `release` must never run on an encoder that was started but not stopped;
//! [`EncoderSession`] enforces that and performs best-effort teardown.

use super::state::VideoTarget;
use crate::backends::camera::types::{DeviceBinding, SensorRotation};
use crate::errors::{EncoderError, EncoderResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything an encoder needs for one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub source: DeviceBinding,
    pub target: VideoTarget,
    pub output_path: PathBuf,
    /// Rotation players should apply to the stream
    pub orientation_hint: SensorRotation,
}

/// Platform media encoder
pub trait EncoderBackend: Send {
    fn configure(&mut self, settings: &EncoderSettings) -> EncoderResult<()>;
    fn prepare(&mut self) -> EncoderResult<()>;
    fn start(&mut self) -> EncoderResult<()>;
    fn pause(&mut self) -> EncoderResult<()>;
    fn resume(&mut self) -> EncoderResult<()>;
    /// Finalize the output container
    fn stop(&mut self) -> EncoderResult<()>;
    fn reset(&mut self) -> EncoderResult<()>;
    fn release(&mut self);
}

/// Creates one encoder per take
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> EncoderResult<Box<dyn EncoderBackend>>;

    /// Whether encoders from this factory can pause mid-recording
    fn supports_native_pause(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Configured,
    Prepared,
    Started,
    Paused,
    Stopped,
    Released,
}

/// One encoder bound to one output file
pub struct EncoderSession {
    encoder: Box<dyn EncoderBackend>,
    settings: EncoderSettings,
    phase: Phase,
}

impl EncoderSession {
    /// Create and configure an encoder for `output_path`
    ///
    /// The camera must already be unlocked for the encoder. Any file at
    /// `output_path` is deleted first.
    pub fn configure(
        factory: &dyn EncoderFactory,
        source: DeviceBinding,
        target: VideoTarget,
        output_path: &Path,
    ) -> EncoderResult<Self> {
        if let Err(e) = crate::storage::remove_file_if_exists(output_path) {
            return Err(EncoderError::ConfigureFailed(format!(
                "cannot remove existing {}: {}",
                output_path.display(),
                e
            )));
        }

        let settings = EncoderSettings {
            orientation_hint: source.orientation,
            source,
            target,
            output_path: output_path.to_path_buf(),
        };

        info!(
            width = target.width,
            height = target.height,
            fps = target.frame_rate,
            bitrate = target.bit_rate,
            orientation = %settings.orientation_hint,
            output = %output_path.display(),
            "Configuring encoder"
        );

        let mut encoder = factory.create()?;
        if let Err(e) = encoder.configure(&settings) {
            encoder.release();
            return Err(e);
        }

        Ok(Self {
            encoder,
            settings,
            phase: Phase::Configured,
        })
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    pub fn output_path(&self) -> &Path {
        &self.settings.output_path
    }

    pub fn prepare(&mut self) -> EncoderResult<()> {
        self.expect_phase(&[Phase::Configured], "prepare")?;
        self.encoder.prepare()?;
        self.phase = Phase::Prepared;
        Ok(())
    }

    pub fn start(&mut self) -> EncoderResult<()> {
        self.expect_phase(&[Phase::Prepared], "start")?;
        self.encoder.start()?;
        self.phase = Phase::Started;
        debug!(output = %self.settings.output_path.display(), "Encoder started");
        Ok(())
    }

    pub fn pause(&mut self) -> EncoderResult<()> {
        self.expect_phase(&[Phase::Started], "pause")?;
        self.encoder.pause()?;
        self.phase = Phase::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> EncoderResult<()> {
        self.expect_phase(&[Phase::Paused], "resume")?;
        self.encoder.resume()?;
        self.phase = Phase::Started;
        Ok(())
    }

    /// Prepare and start, tearing everything down on failure
    pub fn prepare_and_start(&mut self) -> EncoderResult<()> {
        let result = self.prepare().and_then(|()| self.start());
        if result.is_err() {
            self.teardown();
        }
        result
    }

    /// Stop, reset and release in that order
    ///
    /// Every step runs even when an earlier one fails. The first error is
    /// returned after the encoder has been released.
    pub fn finish(mut self) -> EncoderResult<()> {
        self.run_teardown()
    }

    /// Best-effort stop/reset/release with errors logged
    pub fn teardown(&mut self) {
        if let Err(e) = self.run_teardown() {
            warn!(error = %e, "Encoder teardown failed");
        }
    }

    fn run_teardown(&mut self) -> EncoderResult<()> {
        if self.phase == Phase::Released {
            return Ok(());
        }

        let mut first_error = None;

        if matches!(self.phase, Phase::Started | Phase::Paused) {
            if let Err(e) = self.encoder.stop() {
                warn!(error = %e, "Encoder stop failed");
                first_error.get_or_insert(e);
            }
            self.phase = Phase::Stopped;
        }

        if let Err(e) = self.encoder.reset() {
            warn!(error = %e, "Encoder reset failed");
            first_error.get_or_insert(e);
        }

        self.encoder.release();
        self.phase = Phase::Released;
        debug!(output = %self.settings.output_path.display(), "Encoder released");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn expect_phase(&self, allowed: &[Phase], call: &str) -> EncoderResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(EncoderError::InvalidState(format!(
                "{} called in phase {:?}",
                call, self.phase
            )))
        }
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if self.phase != Phase::Released {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        calls: Vec<&'static str>,
        fail_stop: bool,
        fail_prepare: bool,
    }

    struct ScriptedEncoder(Arc<Mutex<Script>>);

    impl ScriptedEncoder {
        fn log(&self, call: &'static str) {
            self.0.lock().unwrap().calls.push(call);
        }
    }

    impl EncoderBackend for ScriptedEncoder {
        fn configure(&mut self, _: &EncoderSettings) -> EncoderResult<()> {
            self.log("configure");
            Ok(())
        }
        fn prepare(&mut self) -> EncoderResult<()> {
            self.log("prepare");
            if self.0.lock().unwrap().fail_prepare {
                return Err(EncoderError::PrepareFailed("unsupported size".into()));
            }
            Ok(())
        }
        fn start(&mut self) -> EncoderResult<()> {
            self.log("start");
            Ok(())
        }
        fn pause(&mut self) -> EncoderResult<()> {
            self.log("pause");
            Ok(())
        }
        fn resume(&mut self) -> EncoderResult<()> {
            self.log("resume");
            Ok(())
        }
        fn stop(&mut self) -> EncoderResult<()> {
            self.log("stop");
            if self.0.lock().unwrap().fail_stop {
                return Err(EncoderError::RuntimeFailure("no frames".into()));
            }
            Ok(())
        }
        fn reset(&mut self) -> EncoderResult<()> {
            self.log("reset");
            Ok(())
        }
        fn release(&mut self) {
            self.log("release");
        }
    }

    struct ScriptedFactory(Arc<Mutex<Script>>);

    impl EncoderFactory for ScriptedFactory {
        fn create(&self) -> EncoderResult<Box<dyn EncoderBackend>> {
            Ok(Box::new(ScriptedEncoder(Arc::clone(&self.0))))
        }
        fn supports_native_pause(&self) -> bool {
            true
        }
    }

    fn session(script: &Arc<Mutex<Script>>, dir: &Path) -> EncoderSession {
        let binding = DeviceBinding {
            index: 0,
            path: None,
            orientation: SensorRotation::Rotate90,
        };
        let target = VideoTarget {
            width: 1280,
            height: 720,
            frame_rate: 30,
            bit_rate: 5_000_000,
        };
        let factory = ScriptedFactory(Arc::clone(script));
        EncoderSession::configure(&factory, binding, target, &dir.join("take.mp4")).unwrap()
    }

    #[test]
    fn test_configure_deletes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("take.mp4"), b"old").unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let enc = session(&script, dir.path());
        assert!(!dir.path().join("take.mp4").exists());
        assert_eq!(enc.settings().orientation_hint, SensorRotation::Rotate90);
    }

    #[test]
    fn test_stop_failure_still_resets_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script {
            fail_stop: true,
            ..Default::default()
        }));
        let mut enc = session(&script, dir.path());
        enc.prepare_and_start().unwrap();
        assert!(matches!(enc.finish(), Err(EncoderError::RuntimeFailure(_))));
        assert_eq!(
            script.lock().unwrap().calls,
            ["configure", "prepare", "start", "stop", "reset", "release"]
        );
    }

    #[test]
    fn test_prepare_failure_never_stops() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script {
            fail_prepare: true,
            ..Default::default()
        }));
        let mut enc = session(&script, dir.path());
        assert!(enc.prepare_and_start().is_err());
        drop(enc);
        assert_eq!(
            script.lock().unwrap().calls,
            ["configure", "prepare", "reset", "release"]
        );
    }

    #[test]
    fn test_out_of_order_calls_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(Script::default()));
        let mut enc = session(&script, dir.path());
        assert!(matches!(enc.start(), Err(EncoderError::InvalidState(_))));
        assert!(matches!(enc.resume(), Err(EncoderError::InvalidState(_))));
    }
}
