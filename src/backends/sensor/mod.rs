// SPDX-License-Identifier: GPL-3.0-only

//! Depth sensor backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   SensorLifecycle   │  ← discover / start / stop, degraded mode
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    SensorHandle     │  ← state machine, frame-ready dispatch thread
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ DepthBackend Trait  │  ← driver boundary
//! └──────────┬──────────┘
//!            │
//!       ┌────┴──────┐
//!       ▼           ▼
//!   ┌──────┐  ┌───────────┐
//!   │Kinect│  │ Simulated │
//!   └──────┘  └───────────┘
//! ```

pub mod frame_loop;
#[cfg(all(target_arch = "x86_64", feature = "freedepth"))]
pub mod kinect;
pub mod lifecycle;
pub mod simulated;
pub mod types;

pub use frame_loop::{FrameLoopController, LoopAction};
pub use lifecycle::{FrameHandler, SensorHandle, SensorLifecycle, SensorSlot};
pub use simulated::{SceneKind, SimulatedSensor, SimulationOptions};
pub use types::*;

use crate::depth::DepthSettings;
use crate::errors::SensorResult;

/// Depth sensor driver boundary
///
/// A backend owns the driver-side state of at most one device at a time.
/// [`SensorHandle`] drives it through enable → start → stop.
pub trait DepthBackend: Send {
    /// Enumerate attached sensors, whatever their connection status
    fn enumerate_sensors(&self) -> Vec<SensorDevice>;

    /// Enable the depth stream of `device` with `format`
    fn enable_depth_stream(
        &mut self,
        device: &SensorDevice,
        format: &DepthStreamFormat,
    ) -> SensorResult<()>;

    /// Start the hardware stream
    ///
    /// Returns the queue frame-ready events are delivered on. The queue
    /// disconnects when the stream stops. An `Err` is an I/O-level fault such
    /// as the device disappearing between discovery and start.
    fn start(&mut self) -> std::io::Result<FrameEventReceiver>;

    /// Stop the hardware stream; no-op when not streaming
    fn stop(&mut self);

    /// Get the backend type identifier
    fn backend_type(&self) -> SensorBackendType;
}

/// Create the backend for `backend_type`
///
/// Falls back to the simulated sensor when Kinect support is not compiled in.
pub fn get_backend(
    backend_type: SensorBackendType,
    settings: &DepthSettings,
    simulation: &SimulationOptions,
) -> Box<dyn DepthBackend> {
    match backend_type {
        #[cfg(all(target_arch = "x86_64", feature = "freedepth"))]
        SensorBackendType::Kinect => Box::new(kinect::KinectSensor::new(settings.clone())),
        #[cfg(not(all(target_arch = "x86_64", feature = "freedepth")))]
        SensorBackendType::Kinect => {
            tracing::warn!("Kinect support not compiled in (enable the `freedepth` feature), using simulated sensor");
            Box::new(SimulatedSensor::new(settings.clone(), simulation.clone()))
        }
        SensorBackendType::Simulated => {
            Box::new(SimulatedSensor::new(settings.clone(), simulation.clone()))
        }
    }
}
