// SPDX-License-Identifier: GPL-3.0-only

//! Depth-to-intensity conversion
//!
//! Each sample inside the frame's reliable range is mapped linearly into an
//! 8-bit gray level; samples outside it (unknown, too near, too far) render
//! black.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::pixel_buffer::{PixelBuffer, PixelBufferWriter, Rgb};
use super::settings::DepthSettings;
use crate::backends::sensor::{DepthRange, RawDepthFrame};
use crate::constants::{MAX_INTENSITY, timing};
use crate::errors::{FrameError, FrameResult};

/// How an in-range depth value becomes an intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IntensityMapping {
    /// `depth * 255 / (max - min)`, saturated at 255
    #[default]
    Absolute,
    /// `(depth - min) * 255 / (max - min)`, spans the full 0-255 range
    Normalized,
}

impl IntensityMapping {
    pub fn toggled(&self) -> Self {
        match self {
            IntensityMapping::Absolute => IntensityMapping::Normalized,
            IntensityMapping::Normalized => IntensityMapping::Absolute,
        }
    }
}

impl std::fmt::Display for IntensityMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntensityMapping::Absolute => write!(f, "absolute"),
            IntensityMapping::Normalized => write!(f, "normalized"),
        }
    }
}

/// Gray level for one depth sample
///
/// Out-of-range samples and degenerate ranges (`min == max`) give 0.
/// Absolute values past one byte saturate at 255 rather than truncating,
/// so the far end of the range stays bright instead of wrapping to dark.
#[inline]
pub fn intensity(depth: i16, range: DepthRange, mapping: IntensityMapping) -> u8 {
    let span = range.span();
    if span <= 0 || !range.contains(depth) {
        return 0;
    }

    let offset = match mapping {
        IntensityMapping::Absolute => i32::from(depth),
        IntensityMapping::Normalized => i32::from(depth) - i32::from(range.min),
    };

    // i16 * 255 fits comfortably in i32; div_euclid floors negative depths
    (offset * MAX_INTENSITY).div_euclid(span).clamp(0, MAX_INTENSITY) as u8
}

/// Converts raw depth frames into the grayscale pixel buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFrameProcessor {
    mapping: IntensityMapping,
}

impl DepthFrameProcessor {
    pub fn new(mapping: IntensityMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> IntensityMapping {
        self.mapping
    }

    pub fn set_mapping(&mut self, mapping: IntensityMapping) {
        self.mapping = mapping;
    }

    /// Overwrite every pixel of `buffer` with the gray level of the matching sample
    ///
    /// Fails without touching `buffer` when the frame and buffer pixel counts differ.
    pub fn process(&self, frame: &RawDepthFrame<'_>, buffer: &mut PixelBuffer) -> FrameResult<()> {
        if frame.pixel_count() != buffer.len() {
            return Err(FrameError::SizeMismatch {
                expected: buffer.len(),
                actual: frame.pixel_count(),
            });
        }

        if frame.range.is_degenerate() {
            debug!(
                sequence = frame.sequence,
                range = %frame.range,
                "Degenerate reliable range, rendering black frame"
            );
            buffer.fill(Rgb::BLACK);
            return Ok(());
        }

        for (pixel, &depth) in buffer.pixels_mut().iter_mut().zip(frame.samples) {
            *pixel = Rgb::gray(intensity(depth, frame.range, self.mapping));
        }
        Ok(())
    }
}

/// Frame-ready handler state: converts each frame and publishes it
///
/// Lives on the sensor's frame thread; the render loop only ever sees the
/// published snapshots.
#[derive(Debug)]
pub struct FramePublisher {
    processor: DepthFrameProcessor,
    writer: PixelBufferWriter,
    settings: DepthSettings,
    published: u64,
    skipped: u64,
}

impl FramePublisher {
    pub fn new(writer: PixelBufferWriter, settings: DepthSettings) -> Self {
        Self {
            processor: DepthFrameProcessor::new(settings.mapping()),
            writer,
            settings,
            published: 0,
            skipped: 0,
        }
    }

    /// Convert and publish one frame; mismatched frames are skipped and logged
    pub fn handle_frame(&mut self, frame: &RawDepthFrame<'_>) {
        self.processor.set_mapping(self.settings.mapping());

        let processor = self.processor;
        match self.writer.publish_with(|buffer| processor.process(frame, buffer)) {
            Ok(()) => {
                self.published += 1;
                trace!(sequence = frame.sequence, "Published depth frame");
                if self.published % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        published = self.published,
                        skipped = self.skipped,
                        "Depth frame statistics"
                    );
                }
            }
            Err(e) => {
                self.skipped += 1;
                warn!(sequence = frame.sequence, error = %e, "Skipping depth frame");
            }
        }
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
