// SPDX-License-Identifier: GPL-3.0-only

//! Sensor discovery, stream enablement and start/stop
//!
//! [`SensorHandle`] wraps one discovered device and enforces the
//! `Discovered → StreamEnabled → Running → Stopped` state machine. While
//! running, a dedicated frame thread blocks on the driver's event queue,
//! copies each frame into a sample buffer allocated once for the stream, and
//! calls the registered frame-ready handler with a borrowed
//! [`RawDepthFrame`]. The frame is released before the next event is read.
//!
//! [`SensorLifecycle`] owns the optional handle and absorbs every failure:
//! a missing or broken sensor leaves the application running with no active
//! sensor.

use std::sync::mpsc::RecvTimeoutError;

use tracing::{debug, info, trace, warn};

use super::frame_loop::{FrameLoopController, LoopAction};
use super::types::{DepthStreamFormat, RawDepthFrame, SensorDevice, SensorState, SensorStatus};
use super::DepthBackend;
use crate::constants::timing;
use crate::errors::{FrameError, SensorError, SensorResult};

/// Frame-ready handler, called on the frame thread once per delivered frame
pub type FrameHandler = Box<dyn for<'a> FnMut(&RawDepthFrame<'a>) + Send + 'static>;

/// A discovered depth sensor and its driver
pub struct SensorHandle {
    backend: Box<dyn DepthBackend>,
    device: SensorDevice,
    format: Option<DepthStreamFormat>,
    handler: Option<FrameHandler>,
    frame_loop: Option<FrameLoopController>,
    state: SensorState,
}

impl SensorHandle {
    /// Scan `backend` for the first connected sensor
    ///
    /// Returns [`SensorError::NoDeviceFound`] when none is connected.
    pub fn discover(backend: Box<dyn DepthBackend>) -> SensorResult<Self> {
        let sensors = backend.enumerate_sensors();
        debug!(
            backend = %backend.backend_type(),
            count = sensors.len(),
            "Enumerated depth sensors"
        );

        let device = sensors
            .into_iter()
            .find(|s| s.status == SensorStatus::Connected)
            .ok_or(SensorError::NoDeviceFound)?;

        info!(name = %device.name, path = %device.path, "Discovered depth sensor");

        Ok(Self {
            backend,
            device,
            format: None,
            handler: None,
            frame_loop: None,
            state: SensorState::Discovered,
        })
    }

    pub fn device(&self) -> &SensorDevice {
        &self.device
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    /// Enabled stream format, once the stream is enabled
    pub fn format(&self) -> Option<&DepthStreamFormat> {
        self.format.as_ref()
    }

    /// True while the frame thread is alive
    pub fn is_delivering(&self) -> bool {
        self.frame_loop
            .as_ref()
            .map(FrameLoopController::is_running)
            .unwrap_or(false)
    }

    /// Enable the depth stream at `format`
    pub fn enable_depth_stream(&mut self, format: DepthStreamFormat) -> SensorResult<()> {
        if !matches!(
            self.state,
            SensorState::Discovered | SensorState::StreamEnabled
        ) {
            return Err(SensorError::InvalidState {
                operation: "enable the depth stream of",
                state: self.state,
            });
        }

        self.backend.enable_depth_stream(&self.device, &format)?;
        info!(device = %self.device.name, format = %format, "Depth stream enabled");

        self.format = Some(format);
        self.state = SensorState::StreamEnabled;
        Ok(())
    }

    /// Register the frame-ready handler, replacing any previous one
    ///
    /// Takes effect at the next `start`.
    pub fn on_frame_ready<F>(&mut self, handler: F)
    where
        F: for<'a> FnMut(&RawDepthFrame<'a>) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Start the hardware stream and the frame thread
    ///
    /// An I/O fault from the driver is reported as
    /// [`SensorError::DeviceUnavailable`].
    pub fn start(&mut self) -> SensorResult<()> {
        if self.state != SensorState::StreamEnabled {
            return Err(SensorError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        let format = self.format.ok_or(SensorError::InvalidState {
            operation: "start",
            state: self.state,
        })?;

        let events = self.backend.start().map_err(|e| {
            warn!(device = %self.device.name, error = %e, "Depth sensor failed to start");
            SensorError::DeviceUnavailable(e.to_string())
        })?;

        let mut handler = self.handler.take().unwrap_or_else(|| {
            debug!("No frame-ready handler registered, frames will be dropped");
            Box::new(|_: &RawDepthFrame<'_>| {})
        });
        let pixel_count = format.pixel_count();
        let name = format!("depth-frames:{}", self.device.path);

        self.frame_loop = Some(FrameLoopController::start_with_init(
            &name,
            move || Ok(vec![0i16; pixel_count]),
            move |samples: &mut Vec<i16>| {
                match events.recv_timeout(timing::FRAME_POLL_INTERVAL) {
                    Ok(event) => {
                        match event.read_frame(samples) {
                            Ok(frame) => {
                                handler(&frame);
                                trace!(
                                    sequence = frame.sequence,
                                    latency_us = event.age().as_micros() as u64,
                                    "Depth frame handled"
                                );
                            }
                            Err(FrameError::StaleOrMissing) => {
                                debug!(sequence = event.sequence(), "Frame event without data, skipping");
                            }
                            Err(e) => {
                                warn!(sequence = event.sequence(), error = %e, "Dropping depth frame");
                            }
                        }
                        LoopAction::Continue
                    }
                    Err(RecvTimeoutError::Timeout) => LoopAction::Continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("Frame event queue disconnected");
                        LoopAction::Stop
                    }
                }
            },
        ));

        self.state = SensorState::Running;
        info!(device = %self.device.name, "Depth sensor running");
        Ok(())
    }

    /// Stop the hardware stream and join the frame thread
    ///
    /// Idempotent. The handle cannot be restarted afterwards.
    pub fn stop(&mut self) {
        if self.state == SensorState::Stopped {
            return;
        }

        // Stop the driver first so no further events are queued
        self.backend.stop();
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop();
        }

        info!(device = %self.device.name, previous = %self.state, "Depth sensor stopped");
        self.state = SensorState::Stopped;
    }
}

impl Drop for SensorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SensorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorHandle")
            .field("backend", &self.backend.backend_type())
            .field("device", &self.device)
            .field("format", &self.format)
            .field("state", &self.state)
            .finish()
    }
}

/// Availability of the application's single sensor
#[derive(Debug, Default)]
pub enum SensorSlot {
    /// No sensor: none discovered, failed to start, or stopped
    #[default]
    Absent,
    /// Discovered but not streaming
    Available(SensorHandle),
    /// Streaming frames
    Running(SensorHandle),
}

impl SensorSlot {
    pub fn handle(&self) -> Option<&SensorHandle> {
        match self {
            SensorSlot::Absent => None,
            SensorSlot::Available(handle) | SensorSlot::Running(handle) => Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SensorSlot::Running(_))
    }
}

/// Owns the optional sensor and runs it through its lifecycle
#[derive(Debug)]
pub struct SensorLifecycle {
    slot: SensorSlot,
    format: DepthStreamFormat,
    last_state: SensorState,
}

impl SensorLifecycle {
    pub fn new(format: DepthStreamFormat) -> Self {
        Self {
            slot: SensorSlot::Absent,
            format,
            last_state: SensorState::Uninitialized,
        }
    }

    pub fn slot(&self) -> &SensorSlot {
        &self.slot
    }

    /// Current state, or the last state reached when no handle is held
    pub fn state(&self) -> SensorState {
        self.slot
            .handle()
            .map(SensorHandle::state)
            .unwrap_or(self.last_state)
    }

    pub fn device(&self) -> Option<&SensorDevice> {
        self.slot.handle().map(SensorHandle::device)
    }

    /// Find the first connected sensor on `backend`
    ///
    /// Any current sensor is stopped first. Finding nothing is not fatal: the
    /// slot stays absent and [`SensorError::NoDeviceFound`] is returned for
    /// reporting.
    pub fn discover(&mut self, backend: Box<dyn DepthBackend>) -> SensorResult<&SensorDevice> {
        self.stop();

        match SensorHandle::discover(backend) {
            Ok(handle) => {
                self.last_state = SensorState::Discovered;
                self.slot = SensorSlot::Available(handle);
                self.device().ok_or(SensorError::NoDeviceFound)
            }
            Err(e) => {
                warn!(error = %e, "No depth sensor available, continuing without one");
                self.last_state = SensorState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Enable the depth stream, register `handler` and start the discovered sensor
    ///
    /// On failure the handle is discarded and the slot becomes absent.
    pub fn start<F>(&mut self, handler: F) -> SensorResult<()>
    where
        F: for<'a> FnMut(&RawDepthFrame<'a>) + Send + 'static,
    {
        let mut handle = match std::mem::take(&mut self.slot) {
            SensorSlot::Available(handle) => handle,
            SensorSlot::Running(handle) => {
                self.slot = SensorSlot::Running(handle);
                return Err(SensorError::InvalidState {
                    operation: "start",
                    state: SensorState::Running,
                });
            }
            SensorSlot::Absent => return Err(SensorError::NoDeviceFound),
        };

        let result = handle
            .enable_depth_stream(self.format)
            .and_then(|()| {
                handle.on_frame_ready(handler);
                handle.start()
            });

        match result {
            Ok(()) => {
                self.last_state = SensorState::Running;
                self.slot = SensorSlot::Running(handle);
                Ok(())
            }
            Err(e) => {
                warn!(
                    device = %handle.device().name,
                    error = %e,
                    "Discarding depth sensor, continuing without one"
                );
                self.last_state = SensorState::Uninitialized;
                drop(handle);
                Err(e)
            }
        }
    }

    /// Stop and release the current sensor; no-op when there is none
    pub fn stop(&mut self) {
        match std::mem::take(&mut self.slot) {
            SensorSlot::Absent => {}
            SensorSlot::Available(mut handle) | SensorSlot::Running(mut handle) => {
                handle.stop();
                self.last_state = SensorState::Stopped;
            }
        }
    }
}

impl Drop for SensorLifecycle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sensor::{DepthRange, FrameEvent, FrameEventReceiver, SensorBackendType};
    use std::sync::mpsc::{self, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Backend whose event queue is fed by the test
    struct ScriptedBackend {
        devices: Vec<SensorDevice>,
        fail_start: bool,
        sender: Arc<Mutex<Option<Sender<FrameEvent>>>>,
    }

    impl ScriptedBackend {
        fn new(statuses: &[SensorStatus]) -> (Self, Arc<Mutex<Option<Sender<FrameEvent>>>>) {
            let sender = Arc::new(Mutex::new(None));
            let devices = statuses
                .iter()
                .enumerate()
                .map(|(i, status)| SensorDevice {
                    name: format!("Scripted {i}"),
                    path: format!("scripted:{i}"),
                    serial: None,
                    status: *status,
                })
                .collect();
            (
                Self {
                    devices,
                    fail_start: false,
                    sender: Arc::clone(&sender),
                },
                sender,
            )
        }
    }

    impl DepthBackend for ScriptedBackend {
        fn enumerate_sensors(&self) -> Vec<SensorDevice> {
            self.devices.clone()
        }

        fn enable_depth_stream(
            &mut self,
            _device: &SensorDevice,
            _format: &DepthStreamFormat,
        ) -> SensorResult<()> {
            Ok(())
        }

        fn start(&mut self) -> std::io::Result<FrameEventReceiver> {
            if self.fail_start {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "device unplugged",
                ));
            }
            let (tx, rx) = mpsc::channel();
            *self.sender.lock().unwrap() = Some(tx);
            Ok(rx)
        }

        fn stop(&mut self) {
            self.sender.lock().unwrap().take();
        }

        fn backend_type(&self) -> SensorBackendType {
            SensorBackendType::Simulated
        }
    }

    fn tiny_format() -> DepthStreamFormat {
        DepthStreamFormat {
            width: 2,
            height: 2,
            fps: 30,
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_discover_picks_first_connected() {
        let (backend, _) = ScriptedBackend::new(&[
            SensorStatus::NotPowered,
            SensorStatus::Connected,
            SensorStatus::Connected,
        ]);
        let handle = SensorHandle::discover(Box::new(backend)).unwrap();
        assert_eq!(handle.device().path, "scripted:1");
        assert_eq!(handle.state(), SensorState::Discovered);
    }

    #[test]
    fn test_discover_without_connected_sensor() {
        let (backend, _) = ScriptedBackend::new(&[SensorStatus::InUse]);
        assert_eq!(
            SensorHandle::discover(Box::new(backend)).unwrap_err(),
            SensorError::NoDeviceFound
        );
    }

    #[test]
    fn test_start_requires_enabled_stream() {
        let (backend, _) = ScriptedBackend::new(&[SensorStatus::Connected]);
        let mut handle = SensorHandle::discover(Box::new(backend)).unwrap();
        assert!(matches!(
            handle.start(),
            Err(SensorError::InvalidState {
                state: SensorState::Discovered,
                ..
            })
        ));
    }

    #[test]
    fn test_handler_receives_frames_in_order() {
        let (backend, sender) = ScriptedBackend::new(&[SensorStatus::Connected]);
        let mut handle = SensorHandle::discover(Box::new(backend)).unwrap();
        handle.enable_depth_stream(tiny_format()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        handle.on_frame_ready(move |frame| {
            seen_clone
                .lock()
                .unwrap()
                .push((frame.sequence, frame.samples.to_vec()));
        });
        handle.start().unwrap();
        assert_eq!(handle.state(), SensorState::Running);

        {
            let guard = sender.lock().unwrap();
            let tx = guard.as_ref().unwrap();
            tx.send(FrameEvent::new(2, 2, vec![1, 2, 3, 4], DepthRange::DEFAULT, 1))
                .unwrap();
            tx.send(FrameEvent::empty(2)).unwrap();
            tx.send(FrameEvent::new(2, 2, vec![5, 6, 7, 8], DepthRange::DEFAULT, 3))
                .unwrap();
        }

        assert!(wait_for(|| seen.lock().unwrap().len() == 2));
        handle.stop();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (1, vec![1, 2, 3, 4]));
        assert_eq!(seen[1], (3, vec![5, 6, 7, 8]));
    }

    #[test]
    fn test_stop_is_idempotent_and_terminal() {
        let (backend, sender) = ScriptedBackend::new(&[SensorStatus::Connected]);
        let mut handle = SensorHandle::discover(Box::new(backend)).unwrap();
        handle.enable_depth_stream(tiny_format()).unwrap();
        handle.start().unwrap();

        handle.stop();
        handle.stop();
        assert_eq!(handle.state(), SensorState::Stopped);
        assert!(!handle.is_delivering());
        assert!(sender.lock().unwrap().is_none());
        assert!(handle.start().is_err());
    }

    #[test]
    fn test_lifecycle_start_failure_discards_sensor() {
        let (mut backend, _) = ScriptedBackend::new(&[SensorStatus::Connected]);
        backend.fail_start = true;

        let mut lifecycle = SensorLifecycle::new(tiny_format());
        lifecycle.discover(Box::new(backend)).unwrap();
        let err = lifecycle.start(|_| {}).unwrap_err();

        assert!(matches!(err, SensorError::DeviceUnavailable(_)));
        assert!(matches!(lifecycle.slot(), SensorSlot::Absent));
        assert!(lifecycle.device().is_none());
    }

    #[test]
    fn test_lifecycle_start_without_sensor() {
        let mut lifecycle = SensorLifecycle::new(tiny_format());
        assert_eq!(
            lifecycle.start(|_| {}).unwrap_err(),
            SensorError::NoDeviceFound
        );
        lifecycle.stop();
        assert_eq!(lifecycle.state(), SensorState::Uninitialized);
    }

    #[test]
    fn test_lifecycle_stop_reports_stopped() {
        let (backend, _) = ScriptedBackend::new(&[SensorStatus::Connected]);
        let mut lifecycle = SensorLifecycle::new(tiny_format());
        lifecycle.discover(Box::new(backend)).unwrap();
        lifecycle.start(|_| {}).unwrap();
        assert!(lifecycle.slot().is_running());

        lifecycle.stop();
        lifecycle.stop();
        assert_eq!(lifecycle.state(), SensorState::Stopped);
        assert!(matches!(lifecycle.slot(), SensorSlot::Absent));
    }
}
