// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Depth stream format constants
///
/// The only format the depth pipeline enables: 640x480 at 30 frames per second.
pub mod stream {
    /// Depth image width in pixels
    pub const DEPTH_WIDTH: u32 = 640;

    /// Depth image height in pixels
    pub const DEPTH_HEIGHT: u32 = 480;

    /// Depth stream frame rate
    pub const DEPTH_FPS: u32 = 30;

    /// Number of depth samples in one frame
    pub const DEPTH_PIXEL_COUNT: usize = (DEPTH_WIDTH * DEPTH_HEIGHT) as usize;
}

/// Reliable depth range limits (millimeters)
///
/// Based on Xbox Kinect v1 sensor specifications.
pub mod range {
    /// Closest reliable depth in default range mode
    pub const DEFAULT_MIN_MM: i16 = 800;
    /// Farthest reliable depth in default range mode
    pub const DEFAULT_MAX_MM: i16 = 4000;

    /// Closest reliable depth in near range mode
    pub const NEAR_MIN_MM: i16 = 400;
    /// Farthest reliable depth in near range mode
    pub const NEAR_MAX_MM: i16 = 3000;

    /// Sample value the sensor reports when depth is unknown
    pub const UNKNOWN_DEPTH: i16 = 0;
}

/// Largest value an 8-bit intensity can take
pub const MAX_INTENSITY: i32 = u8::MAX as i32;

/// Render loop constants
pub mod render {
    /// Default render cadence (ticks per second)
    pub const DEFAULT_RENDER_FPS: u32 = 60;

    /// Slowest accepted render cadence
    pub const MIN_RENDER_FPS: u32 = 1;

    /// Fastest accepted render cadence
    pub const MAX_RENDER_FPS: u32 = 240;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// How long the frame thread waits for a frame event before re-checking
    /// its stop signal
    pub const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// Interval between headless statistics reports
    pub const STATS_INTERVAL: Duration = Duration::from_secs(1);
}

/// Maximum number of undelivered frame events queued by a driver
///
/// Drivers drop frames rather than queue them when the consumer falls behind.
pub const FRAME_QUEUE_DEPTH: usize = 2;
