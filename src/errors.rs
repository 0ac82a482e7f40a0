// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the depth viewer
//!
//! Every sensor and frame condition is recoverable: the render loop always has
//! a buffer to draw, so these errors are logged and absorbed at the sensor and
//! processor boundary rather than propagated to presentation.

use crate::backends::sensor::SensorState;
use crate::render::SurfaceId;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for sensor lifecycle operations
pub type SensorResult<T> = Result<T, SensorError>;

/// Result type for per-frame operations
pub type FrameResult<T> = Result<T, FrameError>;

/// Result type for render boundary operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Sensor lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    /// No connected sensor at discovery time
    #[error("No connected depth sensor found")]
    NoDeviceFound,
    /// The hardware failed to start (I/O fault, e.g. unplugged after discovery)
    #[error("Depth sensor unavailable: {0}")]
    DeviceUnavailable(String),
    /// Operation not permitted in the handle's current state
    #[error("Cannot {operation} a sensor in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SensorState,
    },
    /// The requested stream format is not supported by the device
    #[error("Format not supported: {0}")]
    FormatNotSupported(String),
    /// Driver-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Per-frame conditions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The driver delivered an event with no frame data
    #[error("Frame event carried no depth data")]
    StaleOrMissing,
    /// The frame does not match the enabled stream's pixel count
    #[error("Frame has {actual} samples, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Render boundary errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown image surface {0:?}")]
    UnknownSurface(SurfaceId),
    #[error("Pixels are {actual_width}x{actual_height}, surface expects {width}x{height}")]
    SurfaceSizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
