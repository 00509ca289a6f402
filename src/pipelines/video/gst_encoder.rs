// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer encoder backend
//!
//! Records the V4L2 node handed over by the camera into an H.264 MP4:
//!
//! ```text
//! v4l2src → videoconvert → videoscale → capsfilter → taginject → encoder → h264parse → mp4mux → filesink
//! ```
//!
//! The orientation hint is written as an `image-orientation` tag so players
//! rotate the stream; the pixels are never rotated.

use super::encoder::{EncoderBackend, EncoderFactory, EncoderSettings};
use super::encoder_selection::select_h264_encoder;
use crate::backends::camera::types::SensorRotation;
use crate::constants::timing::{START_CHECK_MS, STOP_TIMEOUT_SECS};
use crate::errors::{EncoderError, EncoderResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, error, info, warn};

/// Factory for [`GstEncoder`]s
pub struct GstEncoderFactory {
    native_pause: bool,
}

impl GstEncoderFactory {
    /// Initialize GStreamer
    pub fn new() -> EncoderResult<Self> {
        gst::init()
            .map_err(|e| EncoderError::ConfigureFailed(format!("GStreamer init failed: {}", e)))?;
        Ok(Self { native_pause: true })
    }

    /// Pause by holding the pipeline in PAUSED
    ///
    /// Disable to record each resumed stretch into its own segment file.
    pub fn native_pause(mut self, enabled: bool) -> Self {
        self.native_pause = enabled;
        self
    }
}

impl EncoderFactory for GstEncoderFactory {
    fn create(&self) -> EncoderResult<Box<dyn EncoderBackend>> {
        Ok(Box::new(GstEncoder {
            pipeline: None,
            native_pause: self.native_pause,
        }))
    }

    fn supports_native_pause(&self) -> bool {
        self.native_pause
    }
}

/// One recording pipeline writing one file
pub struct GstEncoder {
    pipeline: Option<gst::Pipeline>,
    native_pause: bool,
}

fn orientation_tag(rotation: SensorRotation) -> &'static str {
    match rotation {
        SensorRotation::None => "rotate-0",
        SensorRotation::Rotate90 => "rotate-90",
        SensorRotation::Rotate180 => "rotate-180",
        SensorRotation::Rotate270 => "rotate-270",
    }
}

fn make(factory: &str) -> EncoderResult<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| EncoderError::ConfigureFailed(format!("Failed to create {}: {}", factory, e)))
}

impl GstEncoder {
    fn pipeline(&self) -> EncoderResult<&gst::Pipeline> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| EncoderError::InvalidState("pipeline not configured".into()))
    }

    fn build(settings: &EncoderSettings) -> EncoderResult<gst::Pipeline> {
        let device = settings.source.path.as_deref().ok_or_else(|| {
            EncoderError::ConfigureFailed("camera has no device node to record from".into())
        })?;
        let target = settings.target;

        let pipeline = gst::Pipeline::new();
        let source = gst::ElementFactory::make("v4l2src")
            .property("device", device)
            .build()
            .map_err(|e| EncoderError::ConfigureFailed(format!("Failed to create v4l2src: {}", e)))?;
        let videoconvert = make("videoconvert")?;
        let videoscale = make("videoscale")?;

        let caps = gst::Caps::builder("video/x-raw")
            .field("width", target.width as i32)
            .field("height", target.height as i32)
            .field("framerate", gst::Fraction::new(target.frame_rate as i32, 1))
            .build();
        let capsfilter = gst::ElementFactory::make("capsfilter")
            .property("caps", &caps)
            .build()
            .map_err(|e| {
                EncoderError::ConfigureFailed(format!("Failed to create capsfilter: {}", e))
            })?;

        let taginject = make("taginject")?;
        taginject.set_property(
            "tags",
            format!(
                "image-orientation={}",
                orientation_tag(settings.orientation_hint)
            ),
        );

        let encoder = select_h264_encoder(target.bit_rate)?.element;
        let parser = make("h264parse")?;
        let muxer = make("mp4mux")?;
        let sink = gst::ElementFactory::make("filesink")
            .property("location", settings.output_path.to_string_lossy().to_string())
            .build()
            .map_err(|e| EncoderError::ConfigureFailed(format!("Failed to create filesink: {}", e)))?;

        let elements = [
            &source,
            &videoconvert,
            &videoscale,
            &capsfilter,
            &taginject,
            &encoder,
            &parser,
            &muxer,
            &sink,
        ];
        pipeline
            .add_many(elements)
            .map_err(|e| EncoderError::ConfigureFailed(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many(elements)
            .map_err(|e| EncoderError::ConfigureFailed(format!("Failed to link elements: {}", e)))?;

        debug!(device, output = %settings.output_path.display(), "Recording pipeline built");
        Ok(pipeline)
    }

    /// Surface the first error posted shortly after a state change
    fn check_bus(&self, within_ms: u64) -> EncoderResult<()> {
        let bus = self
            .pipeline()?
            .bus()
            .ok_or_else(|| EncoderError::RuntimeFailure("No bus available".into()))?;
        if let Some(msg) = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(within_ms),
            &[gst::MessageType::Error, gst::MessageType::Warning],
        ) {
            match msg.view() {
                gst::MessageView::Error(err) => {
                    error!(
                        error = %err.error(),
                        debug = ?err.debug(),
                        source = ?err.src().map(|s| s.name()),
                        "GStreamer error during start"
                    );
                    return Err(EncoderError::StartFailed(err.error().to_string()));
                }
                gst::MessageView::Warning(w) => {
                    warn!(
                        warning = %w.error(),
                        debug = ?w.debug(),
                        source = ?w.src().map(|s| s.name()),
                        "GStreamer warning during start"
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn set_state(&self, state: gst::State) -> EncoderResult<()> {
        self.pipeline()?
            .set_state(state)
            .map(|_| ())
            .map_err(|e| EncoderError::RuntimeFailure(format!("{:?}: {}", state, e)))
    }
}

impl EncoderBackend for GstEncoder {
    fn configure(&mut self, settings: &EncoderSettings) -> EncoderResult<()> {
        self.pipeline = Some(Self::build(settings)?);
        Ok(())
    }

    fn prepare(&mut self) -> EncoderResult<()> {
        self.pipeline()?
            .set_state(gst::State::Ready)
            .map_err(|e| EncoderError::PrepareFailed(e.to_string()))?;
        Ok(())
    }

    fn start(&mut self) -> EncoderResult<()> {
        info!("Starting video recording");
        self.pipeline()?
            .set_state(gst::State::Playing)
            .map_err(|e| EncoderError::StartFailed(e.to_string()))?;
        self.check_bus(START_CHECK_MS)
    }

    fn pause(&mut self) -> EncoderResult<()> {
        if !self.native_pause {
            return Err(EncoderError::PauseUnsupported);
        }
        self.set_state(gst::State::Paused)
    }

    fn resume(&mut self) -> EncoderResult<()> {
        if !self.native_pause {
            return Err(EncoderError::PauseUnsupported);
        }
        self.set_state(gst::State::Playing)
    }

    fn stop(&mut self) -> EncoderResult<()> {
        let pipeline = self.pipeline()?;
        info!("Sending EOS to pipeline");
        if !pipeline.send_event(gst::event::Eos::new()) {
            warn!("Failed to send EOS event to pipeline");
        }

        // The muxer writes the moov atom on EOS
        let eos_seen = pipeline.bus().and_then(|bus| {
            bus.timed_pop_filtered(
                gst::ClockTime::from_seconds(STOP_TIMEOUT_SECS),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            )
        });
        let result = match eos_seen.as_ref().map(|m| m.view()) {
            Some(gst::MessageView::Eos(_)) => Ok(()),
            Some(gst::MessageView::Error(err)) => {
                Err(EncoderError::RuntimeFailure(err.error().to_string()))
            }
            _ => {
                warn!(timeout_secs = STOP_TIMEOUT_SECS, "EOS not reached, output may be truncated");
                Ok(())
            }
        };

        self.set_state(gst::State::Null)?;
        result
    }

    fn reset(&mut self) -> EncoderResult<()> {
        if self.pipeline.is_some() {
            self.set_state(gst::State::Null)?;
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gst::State::Null);
        }
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_tags() {
        assert_eq!(orientation_tag(SensorRotation::None), "rotate-0");
        assert_eq!(orientation_tag(SensorRotation::Rotate270), "rotate-270");
    }
}
