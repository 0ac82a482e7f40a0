// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for depth sensor backends

use serde::{Deserialize, Serialize};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use crate::constants::{range, stream};
use crate::errors::{FrameError, FrameResult};

/// Depth sensor backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorBackendType {
    /// Kinect v1 via freedepth (native USB streaming)
    Kinect,
    /// Synthetic depth scene, no hardware required
    Simulated,
}

impl Default for SensorBackendType {
    fn default() -> Self {
        if cfg!(all(target_arch = "x86_64", feature = "freedepth")) {
            SensorBackendType::Kinect
        } else {
            SensorBackendType::Simulated
        }
    }
}

impl std::fmt::Display for SensorBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorBackendType::Kinect => write!(f, "Kinect"),
            SensorBackendType::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Connection status reported by the driver for an attached sensor
///
/// Only `Connected` sensors are picked at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorStatus {
    Connected,
    Initializing,
    NotPowered,
    InUse,
    Disconnected,
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorStatus::Connected => write!(f, "connected"),
            SensorStatus::Initializing => write!(f, "initializing"),
            SensorStatus::NotPowered => write!(f, "not powered"),
            SensorStatus::InUse => write!(f, "in use"),
            SensorStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Represents an attached depth sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDevice {
    pub name: String,
    pub path: String,           // Backend-specific device path (e.g. "kinect:0")
    pub serial: Option<String>, // Serial number, when the driver exposes one
    pub status: SensorStatus,
}

/// Lifecycle state of a sensor handle
///
/// ```text
/// Uninitialized → Discovered → StreamEnabled → Running → Stopped
/// ```
///
/// Only `Running` delivers frames. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SensorState {
    #[default]
    Uninitialized,
    Discovered,
    StreamEnabled,
    Running,
    Stopped,
}

impl std::fmt::Display for SensorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorState::Uninitialized => "Uninitialized",
            SensorState::Discovered => "Discovered",
            SensorState::StreamEnabled => "StreamEnabled",
            SensorState::Running => "Running",
            SensorState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Depth stream format specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthStreamFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl DepthStreamFormat {
    /// Number of depth samples in one frame of this format
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for DepthStreamFormat {
    fn default() -> Self {
        Self {
            width: stream::DEPTH_WIDTH,
            height: stream::DEPTH_HEIGHT,
            fps: stream::DEPTH_FPS,
        }
    }
}

impl std::fmt::Display for DepthStreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.fps)
    }
}

/// Inclusive reliable depth bounds of a frame, in sensor units (millimeters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthRange {
    pub min: i16,
    pub max: i16,
}

impl DepthRange {
    pub const DEFAULT: DepthRange = DepthRange {
        min: range::DEFAULT_MIN_MM,
        max: range::DEFAULT_MAX_MM,
    };

    pub const NEAR: DepthRange = DepthRange {
        min: range::NEAR_MIN_MM,
        max: range::NEAR_MAX_MM,
    };

    pub const fn new(min: i16, max: i16) -> Self {
        Self { min, max }
    }

    /// `max - min`, widened so extreme bounds cannot overflow
    pub fn span(&self) -> i32 {
        i32::from(self.max) - i32::from(self.min)
    }

    /// True when `min == max` and no intensity can be derived
    pub fn is_degenerate(&self) -> bool {
        self.span() == 0
    }

    pub fn contains(&self, depth: i16) -> bool {
        depth >= self.min && depth <= self.max
    }
}

impl std::fmt::Display for DepthRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}mm", self.min, self.max)
    }
}

/// Reliable range preset reported on frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RangeMode {
    /// 800-4000mm
    #[default]
    Default,
    /// 400-3000mm
    Near,
}

impl RangeMode {
    pub fn range(&self) -> DepthRange {
        match self {
            RangeMode::Default => DepthRange::DEFAULT,
            RangeMode::Near => DepthRange::NEAR,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            RangeMode::Default => RangeMode::Near,
            RangeMode::Near => RangeMode::Default,
        }
    }
}

impl std::fmt::Display for RangeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeMode::Default => write!(f, "default"),
            RangeMode::Near => write!(f, "near"),
        }
    }
}

/// One depth frame, borrowed from the frame thread's sample buffer
///
/// The lifetime ties the frame to the handler invocation that received it;
/// handlers copy what they need and cannot retain the frame itself.
#[derive(Debug, Clone, Copy)]
pub struct RawDepthFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// Row-major depth samples
    pub samples: &'a [i16],
    /// Reliable depth bounds for this frame
    pub range: DepthRange,
    /// Driver frame number
    pub sequence: u64,
}

impl<'a> RawDepthFrame<'a> {
    pub fn pixel_count(&self) -> usize {
        self.samples.len()
    }
}

/// Depth data carried by a frame-ready event
#[derive(Debug, Clone)]
struct DepthPayload {
    width: u32,
    height: u32,
    samples: Vec<i16>,
    range: DepthRange,
}

/// Frame-ready notification delivered by a driver
///
/// An event may arrive without data (the driver already recycled the frame);
/// reading it then yields [`FrameError::StaleOrMissing`].
#[derive(Debug, Clone)]
pub struct FrameEvent {
    payload: Option<DepthPayload>,
    sequence: u64,
    captured_at: Instant,
}

impl FrameEvent {
    /// Create an event carrying one frame of depth samples
    pub fn new(width: u32, height: u32, samples: Vec<i16>, range: DepthRange, sequence: u64) -> Self {
        Self {
            payload: Some(DepthPayload {
                width,
                height,
                samples,
                range,
            }),
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Create an event whose frame is no longer available
    pub fn empty(sequence: u64) -> Self {
        Self {
            payload: None,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time since the driver signalled this frame
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn has_frame(&self) -> bool {
        self.payload.is_some()
    }

    /// Copy the event's depth samples into `samples` and return a frame view of it
    ///
    /// `samples` must be sized to the enabled stream's pixel count.
    pub fn read_frame<'a>(&self, samples: &'a mut [i16]) -> FrameResult<RawDepthFrame<'a>> {
        let payload = self.payload.as_ref().ok_or(FrameError::StaleOrMissing)?;
        let expected = payload.width as usize * payload.height as usize;
        if payload.samples.len() != expected || samples.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected: samples.len(),
                actual: payload.samples.len(),
            });
        }

        samples.copy_from_slice(&payload.samples);
        Ok(RawDepthFrame {
            width: payload.width,
            height: payload.height,
            samples,
            range: payload.range,
            sequence: self.sequence,
        })
    }
}

/// Frame-ready event receiver returned by a started driver
pub type FrameEventReceiver = Receiver<FrameEvent>;
