// SPDX-License-Identifier: GPL-3.0-only

//! Software encoder writing placeholder MP4 files

use super::CallJournal;
use crate::errors::{EncoderError, EncoderResult};
use crate::pipelines::video::encoder::{EncoderBackend, EncoderFactory, EncoderSettings};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Failure switches shared between a factory and its encoders
#[derive(Debug, Default)]
pub struct VirtualEncoderControl {
    pub fail_prepare: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
}

impl VirtualEncoderControl {
    pub fn set_fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }
}

/// Factory for [`VirtualEncoder`]s
pub struct VirtualEncoderFactory {
    journal: CallJournal,
    native_pause: bool,
    control: Arc<VirtualEncoderControl>,
}

impl VirtualEncoderFactory {
    pub fn new(journal: CallJournal) -> Self {
        Self {
            journal,
            native_pause: true,
            control: Arc::new(VirtualEncoderControl::default()),
        }
    }

    /// Whether encoders pause natively
    pub fn native_pause(mut self, supported: bool) -> Self {
        self.native_pause = supported;
        self
    }

    pub fn control(&self) -> Arc<VirtualEncoderControl> {
        Arc::clone(&self.control)
    }
}

impl EncoderFactory for VirtualEncoderFactory {
    fn create(&self) -> EncoderResult<Box<dyn EncoderBackend>> {
        Ok(Box::new(VirtualEncoder {
            journal: self.journal.clone(),
            native_pause: self.native_pause,
            control: Arc::clone(&self.control),
            settings: None,
            file: None,
        }))
    }

    fn supports_native_pause(&self) -> bool {
        self.native_pause
    }
}

/// Encoder that writes a small marker file instead of real video
pub struct VirtualEncoder {
    journal: CallJournal,
    native_pause: bool,
    control: Arc<VirtualEncoderControl>,
    settings: Option<EncoderSettings>,
    file: Option<File>,
}

impl VirtualEncoder {
    fn write(&mut self, bytes: &[u8]) -> EncoderResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(EncoderError::InvalidState("no open output".into()));
        };
        file.write_all(bytes)
            .map_err(|e| EncoderError::RuntimeFailure(e.to_string()))
    }
}

impl EncoderBackend for VirtualEncoder {
    fn configure(&mut self, settings: &EncoderSettings) -> EncoderResult<()> {
        self.journal.record("encoder.configure");
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn prepare(&mut self) -> EncoderResult<()> {
        self.journal.record("encoder.prepare");
        if self.control.fail_prepare.load(Ordering::SeqCst) {
            return Err(EncoderError::PrepareFailed("virtual encoder refused".into()));
        }
        let Some(settings) = self.settings.as_ref() else {
            return Err(EncoderError::PrepareFailed("not configured".into()));
        };
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&settings.output_path)
            .map_err(|e| EncoderError::PrepareFailed(e.to_string()))?;
        self.file = Some(file);
        Ok(())
    }

    fn start(&mut self) -> EncoderResult<()> {
        self.journal.record("encoder.start");
        if self.control.fail_start.load(Ordering::SeqCst) {
            return Err(EncoderError::StartFailed("virtual encoder refused".into()));
        }
        let header = match self.settings.as_ref() {
            Some(s) => format!(
                "ftypisom {}x{}@{} {}bps rot={}\n",
                s.target.width,
                s.target.height,
                s.target.frame_rate,
                s.target.bit_rate,
                s.orientation_hint.degrees()
            ),
            None => "ftypisom\n".to_string(),
        };
        self.write(header.as_bytes())
    }

    fn pause(&mut self) -> EncoderResult<()> {
        if !self.native_pause {
            return Err(EncoderError::PauseUnsupported);
        }
        self.journal.record("encoder.pause");
        Ok(())
    }

    fn resume(&mut self) -> EncoderResult<()> {
        if !self.native_pause {
            return Err(EncoderError::PauseUnsupported);
        }
        self.journal.record("encoder.resume");
        Ok(())
    }

    fn stop(&mut self) -> EncoderResult<()> {
        self.journal.record("encoder.stop");
        if self.control.fail_stop.load(Ordering::SeqCst) {
            return Err(EncoderError::RuntimeFailure("stop failed".into()));
        }
        self.write(b"moov\n")?;
        if let Some(file) = self.file.as_mut() {
            file.flush()
                .map_err(|e| EncoderError::RuntimeFailure(e.to_string()))?;
        }
        Ok(())
    }

    fn reset(&mut self) -> EncoderResult<()> {
        self.journal.record("encoder.reset");
        self.file = None;
        Ok(())
    }

    fn release(&mut self) {
        self.journal.record("encoder.release");
        self.file = None;
        self.settings = None;
        debug!("Virtual encoder released");
    }
}
