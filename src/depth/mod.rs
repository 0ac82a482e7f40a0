// SPDX-License-Identifier: GPL-3.0-only

//! Depth frame processing
//!
//! Turns raw depth frames into the grayscale image the render loop draws:
//!
//! ```text
//! RawDepthFrame ──► DepthFrameProcessor ──► PixelBufferWriter ──► SharedPixelBuffer
//!   (frame thread)                              (back buffer)        (render snapshot)
//! ```

mod pixel_buffer;
mod processor;
mod settings;

pub use pixel_buffer::{PixelBuffer, PixelBufferWriter, Rgb, SharedPixelBuffer};
pub use processor::{DepthFrameProcessor, FramePublisher, IntensityMapping, intensity};
pub use settings::DepthSettings;
