// SPDX-License-Identifier: GPL-3.0-only

//! Depth Viewer - real-time grayscale rendering of depth sensor streams
//!
//! # Architecture
//!
//! ```text
//! sensor driver ──► SensorLifecycle ──► DepthFrameProcessor ──► SharedPixelBuffer
//!                    (frame thread)                                    │
//!                                                                      ▼
//!                                               RenderTarget ◄── RenderLoop
//! ```
//!
//! - [`backends`]: depth sensor drivers and the sensor lifecycle
//! - [`depth`]: depth-to-intensity conversion and the shared pixel buffer
//! - [`render`]: render boundary, render loop, terminal and headless targets
//! - [`app`]: viewer state tying sensor, buffer and settings together
//! - [`config`]: user configuration

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod depth;
pub mod errors;
pub mod render;

// Re-export commonly used types
pub use app::DepthViewer;
pub use config::Config;
pub use errors::{AppError, AppResult};
