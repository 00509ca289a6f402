// SPDX-License-Identifier: GPL-3.0-only

//! H.264 encoder selection for the GStreamer encoder
//!
//! Candidates are tried in priority order, hardware first. Each element takes
//! its `bitrate` property in its own unit, so the recorder's bits-per-second
//! value is converted per candidate.

use crate::constants::BITS_PER_KILOBIT;
use crate::errors::{EncoderError, EncoderResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// Unit an encoder's `bitrate` property is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateUnit {
    KilobitsPerSecond,
    BitsPerSecond,
}

impl BitrateUnit {
    /// Convert a bits-per-second value into this unit
    pub fn convert_bps(self, bit_rate: u32) -> u32 {
        match self {
            BitrateUnit::KilobitsPerSecond => (bit_rate / BITS_PER_KILOBIT).max(1),
            BitrateUnit::BitsPerSecond => bit_rate,
        }
    }
}

/// One encoder element the recorder knows how to configure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderCandidate {
    pub element: &'static str,
    pub hardware: bool,
    pub unit: BitrateUnit,
}

/// H.264 encoders in priority order
pub const H264_CANDIDATES: &[EncoderCandidate] = &[
    EncoderCandidate {
        element: "vah264enc",
        hardware: true,
        unit: BitrateUnit::KilobitsPerSecond,
    },
    EncoderCandidate {
        element: "vaapih264enc",
        hardware: true,
        unit: BitrateUnit::KilobitsPerSecond,
    },
    EncoderCandidate {
        element: "v4l2h264enc",
        hardware: true,
        unit: BitrateUnit::BitsPerSecond,
    },
    EncoderCandidate {
        element: "x264enc",
        hardware: false,
        unit: BitrateUnit::KilobitsPerSecond,
    },
    EncoderCandidate {
        element: "openh264enc",
        hardware: false,
        unit: BitrateUnit::BitsPerSecond,
    },
];

/// Encoder element ready to be linked into a pipeline
pub struct SelectedEncoder {
    pub element: gst::Element,
    pub candidate: EncoderCandidate,
}

/// Create and configure the best available H.264 encoder
pub fn select_h264_encoder(bit_rate: u32) -> EncoderResult<SelectedEncoder> {
    for candidate in H264_CANDIDATES {
        let Ok(element) = gst::ElementFactory::make(candidate.element).build() else {
            debug!(encoder = candidate.element, "Encoder not available");
            continue;
        };
        configure_encoder(&element, candidate, bit_rate);
        info!(
            encoder = candidate.element,
            hardware = candidate.hardware,
            bit_rate,
            "Selected video encoder"
        );
        return Ok(SelectedEncoder {
            element,
            candidate: *candidate,
        });
    }
    Err(EncoderError::ConfigureFailed(
        "No H.264 encoder available. Please install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264".into(),
    ))
}

fn configure_encoder(element: &gst::Element, candidate: &EncoderCandidate, bit_rate: u32) {
    let value = candidate.unit.convert_bps(bit_rate);
    match candidate.element {
        "vah264enc" | "vaapih264enc" => {
            element.set_property_from_str("rate-control", "cbr");
            element.set_property("bitrate", value);
        }
        "v4l2h264enc" => {
            let controls = gst::Structure::builder("controls")
                .field("video_bitrate", value as i32)
                .build();
            element.set_property("extra-controls", controls);
        }
        "x264enc" => {
            element.set_property_from_str("tune", "zerolatency");
            element.set_property_from_str("speed-preset", "veryfast");
            element.set_property("bitrate", value);
        }
        "openh264enc" => {
            element.set_property_from_str("rate-control", "bitrate");
            element.set_property("bitrate", value);
        }
        _ => {}
    }
    debug!(encoder = candidate.element, value, unit = ?candidate.unit, "Configured encoder bitrate");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_units() {
        assert_eq!(BitrateUnit::KilobitsPerSecond.convert_bps(8_000_000), 8000);
        assert_eq!(BitrateUnit::BitsPerSecond.convert_bps(8_000_000), 8_000_000);
        assert_eq!(BitrateUnit::KilobitsPerSecond.convert_bps(10), 1);
    }

    #[test]
    fn test_hardware_candidates_first() {
        let first_software = H264_CANDIDATES.iter().position(|c| !c.hardware).unwrap();
        assert!(H264_CANDIDATES[first_software..].iter().all(|c| !c.hardware));
    }
}
