// SPDX-License-Identifier: GPL-3.0-only

//! Simulated depth sensor
//!
//! Produces a synthetic scene (a sphere orbiting above a sloped floor, framed
//! by a border of unknown depth) at the enabled frame rate, through the same
//! bounded event queue a hardware driver uses. Start failures, empty events
//! and non-connected devices can be injected to exercise degraded operation.

use std::io;
use std::sync::mpsc::{SyncSender, TrySendError, sync_channel};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::frame_loop::{FrameLoopController, LoopAction};
use super::types::{
    DepthStreamFormat, FrameEvent, FrameEventReceiver, SensorBackendType, SensorDevice,
    SensorStatus,
};
use super::DepthBackend;
use crate::constants::{FRAME_QUEUE_DEPTH, range, timing};
use crate::depth::DepthSettings;
use crate::errors::{SensorError, SensorResult};

const PATH_PREFIX: &str = "simulated:";

/// Synthetic scene content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneKind {
    /// Sphere orbiting above a sloped floor
    #[default]
    Orbit,
    /// Every sample has the same depth
    Constant(i16),
}

/// Behaviour of the simulated sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOptions {
    /// One simulated device per entry, enumerated in order
    pub statuses: Vec<SensorStatus>,
    /// Fail `start` with an I/O error
    pub fail_start: bool,
    /// Deliver every Nth event without frame data
    pub empty_every: Option<u64>,
    /// Stop producing (and disconnect the queue) after this many events
    pub frame_limit: Option<u64>,
    pub scene: SceneKind,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            statuses: vec![SensorStatus::Connected],
            fail_start: false,
            empty_every: None,
            frame_limit: None,
            scene: SceneKind::default(),
        }
    }
}

/// Depth backend backed by a synthetic scene generator
pub struct SimulatedSensor {
    settings: DepthSettings,
    options: SimulationOptions,
    format: Option<DepthStreamFormat>,
    producer: Option<FrameLoopController>,
}

impl SimulatedSensor {
    pub fn new(settings: DepthSettings, options: SimulationOptions) -> Self {
        Self {
            settings,
            options,
            format: None,
            producer: None,
        }
    }
}

impl DepthBackend for SimulatedSensor {
    fn enumerate_sensors(&self) -> Vec<SensorDevice> {
        self.options
            .statuses
            .iter()
            .enumerate()
            .map(|(index, status)| SensorDevice {
                name: format!("Simulated Depth Sensor {}", index),
                path: format!("{}{}", PATH_PREFIX, index),
                serial: Some(format!("SIM{:04}", index)),
                status: *status,
            })
            .collect()
    }

    fn enable_depth_stream(
        &mut self,
        device: &SensorDevice,
        format: &DepthStreamFormat,
    ) -> SensorResult<()> {
        if !device.path.starts_with(PATH_PREFIX) {
            return Err(SensorError::Backend(format!(
                "{} is not a simulated device",
                device.path
            )));
        }
        if device.status != SensorStatus::Connected {
            return Err(SensorError::DeviceUnavailable(format!(
                "{} is {}",
                device.name, device.status
            )));
        }
        if format.pixel_count() == 0 || format.fps == 0 {
            return Err(SensorError::FormatNotSupported(format.to_string()));
        }

        debug!(device = %device.path, format = %format, "Simulated depth stream configured");
        self.format = Some(*format);
        Ok(())
    }

    fn start(&mut self) -> io::Result<FrameEventReceiver> {
        if self.options.fail_start {
            warn!("Injected start failure");
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "simulated sensor disconnected during start",
            ));
        }
        let format = self
            .format
            .ok_or_else(|| io::Error::other("depth stream not enabled"))?;

        self.stop();

        let (sender, receiver) = sync_channel(FRAME_QUEUE_DEPTH);
        let settings = self.settings.clone();
        let options = self.options.clone();
        let interval = Duration::from_secs_f64(1.0 / f64::from(format.fps));

        self.producer = Some(FrameLoopController::start_with_init(
            "simulated-depth",
            move || {
                Ok(Producer {
                    sender,
                    format,
                    settings,
                    options,
                    interval,
                    next_frame: Instant::now(),
                    sequence: 0,
                    dropped: 0,
                })
            },
            Producer::step,
        ));

        info!(format = %format, "Simulated depth stream started");
        Ok(receiver)
    }

    fn stop(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
            info!("Simulated depth stream stopped");
        }
    }

    fn backend_type(&self) -> SensorBackendType {
        SensorBackendType::Simulated
    }
}

impl Drop for SimulatedSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Producer thread state
struct Producer {
    sender: SyncSender<FrameEvent>,
    format: DepthStreamFormat,
    settings: DepthSettings,
    options: SimulationOptions,
    interval: Duration,
    next_frame: Instant,
    sequence: u64,
    dropped: u64,
}

impl Producer {
    fn step(&mut self) -> LoopAction {
        if self
            .options
            .frame_limit
            .is_some_and(|limit| self.sequence >= limit)
        {
            debug!(frames = self.sequence, "Simulated frame limit reached");
            return LoopAction::Stop;
        }

        // Sleep in short slices so a stop request is seen promptly at low frame rates
        let now = Instant::now();
        if now < self.next_frame {
            std::thread::sleep((self.next_frame - now).min(timing::FRAME_POLL_INTERVAL));
            return LoopAction::Continue;
        }
        self.next_frame += self.interval;
        if self.next_frame < now {
            self.next_frame = now + self.interval;
        }

        self.sequence += 1;
        let event = if self
            .options
            .empty_every
            .is_some_and(|n| n > 0 && self.sequence % n == 0)
        {
            FrameEvent::empty(self.sequence)
        } else {
            let mut samples = vec![range::UNKNOWN_DEPTH; self.format.pixel_count()];
            fill_scene(self.options.scene, &self.format, self.sequence, &mut samples);
            FrameEvent::new(
                self.format.width,
                self.format.height,
                samples,
                self.settings.reliable_range(),
                self.sequence,
            )
        };

        match self.sender.try_send(event) {
            Ok(()) => LoopAction::Continue,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % timing::FRAME_LOG_INTERVAL == 1 {
                    debug!(
                        sequence = self.sequence,
                        dropped = self.dropped,
                        "Simulated frame dropped (queue full)"
                    );
                }
                LoopAction::Continue
            }
            Err(TrySendError::Disconnected(_)) => LoopAction::Stop,
        }
    }
}

/// Render the synthetic scene for frame `sequence` into `samples`
///
/// `samples` must hold `format.pixel_count()` values.
pub fn fill_scene(scene: SceneKind, format: &DepthStreamFormat, sequence: u64, samples: &mut [i16]) {
    let depth = match scene {
        SceneKind::Constant(depth) => {
            samples.fill(depth);
            return;
        }
        SceneKind::Orbit => orbit_depth,
    };

    let width = format.width as usize;
    let height = format.height as usize;
    let border = width.min(height) / 40;
    let t = sequence as f32 / format.fps.max(1) as f32;

    for (y, row) in samples.chunks_exact_mut(width.max(1)).take(height).enumerate() {
        for (x, sample) in row.iter_mut().enumerate() {
            let on_border =
                x < border || y < border || x >= width - border || y >= height - border;
            *sample = if on_border {
                range::UNKNOWN_DEPTH
            } else {
                depth(x as f32 / width as f32, y as f32 / height as f32, t)
            };
        }
    }
}

/// Depth in millimeters at normalized image coordinates `(u, v)` at time `t`
fn orbit_depth(u: f32, v: f32, t: f32) -> i16 {
    // Floor recedes from 1200mm at the bottom edge to 4400mm at the top,
    // crossing the far end of the reliable range near the horizon
    let floor = 4400.0 - v * 3200.0;

    let cx = 0.5 + 0.25 * (t * 0.8).cos();
    let cy = 0.45 + 0.15 * (t * 0.8).sin();
    let radius = 0.18_f32;
    let du = (u - cx) * 1.333;
    let dv = v - cy;
    let dist_sq = du * du + dv * dv;

    let depth = if dist_sq < radius * radius {
        let bulge = (radius * radius - dist_sq).sqrt() / radius;
        (2000.0 - bulge * 500.0).min(floor)
    } else {
        floor
    };

    depth.round().clamp(0.0, f32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::RecvTimeoutError;

    fn format(width: u32, height: u32) -> DepthStreamFormat {
        DepthStreamFormat {
            width,
            height,
            fps: 200,
        }
    }

    fn started(options: SimulationOptions, format: DepthStreamFormat) -> (SimulatedSensor, FrameEventReceiver) {
        let mut sensor = SimulatedSensor::new(DepthSettings::default(), options);
        let device = sensor.enumerate_sensors().remove(0);
        sensor.enable_depth_stream(&device, &format).unwrap();
        let events = sensor.start().unwrap();
        (sensor, events)
    }

    #[test]
    fn test_enumerate_reports_statuses() {
        let sensor = SimulatedSensor::new(
            DepthSettings::default(),
            SimulationOptions {
                statuses: vec![SensorStatus::NotPowered, SensorStatus::Connected],
                ..Default::default()
            },
        );
        let devices = sensor.enumerate_sensors();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].status, SensorStatus::NotPowered);
        assert_eq!(devices[1].path, "simulated:1");
    }

    #[test]
    fn test_enable_rejects_unpowered_device() {
        let mut sensor = SimulatedSensor::new(
            DepthSettings::default(),
            SimulationOptions {
                statuses: vec![SensorStatus::NotPowered],
                ..Default::default()
            },
        );
        let device = sensor.enumerate_sensors().remove(0);
        assert!(matches!(
            sensor.enable_depth_stream(&device, &DepthStreamFormat::default()),
            Err(SensorError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_enable_rejects_empty_format() {
        let mut sensor = SimulatedSensor::new(DepthSettings::default(), SimulationOptions::default());
        let device = sensor.enumerate_sensors().remove(0);
        assert!(matches!(
            sensor.enable_depth_stream(&device, &format(0, 480)),
            Err(SensorError::FormatNotSupported(_))
        ));
    }

    #[test]
    fn test_start_before_enable_fails() {
        let mut sensor = SimulatedSensor::new(DepthSettings::default(), SimulationOptions::default());
        assert!(sensor.start().is_err());
    }

    #[test]
    fn test_injected_start_failure() {
        let mut sensor = SimulatedSensor::new(
            DepthSettings::default(),
            SimulationOptions {
                fail_start: true,
                ..Default::default()
            },
        );
        let device = sensor.enumerate_sensors().remove(0);
        sensor
            .enable_depth_stream(&device, &DepthStreamFormat::default())
            .unwrap();
        let err = sensor.start().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_frames_carry_settings_range() {
        let options = SimulationOptions {
            scene: SceneKind::Constant(1234),
            frame_limit: Some(1),
            ..Default::default()
        };
        let (_sensor, events) = started(options, format(4, 2));

        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        let mut samples = vec![0i16; 8];
        let frame = event.read_frame(&mut samples).unwrap();
        assert_eq!(frame.samples, &[1234; 8]);
        assert_eq!(frame.range, DepthSettings::default().reliable_range());
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn test_empty_events_and_frame_limit() {
        let options = SimulationOptions {
            scene: SceneKind::Constant(900),
            empty_every: Some(2),
            frame_limit: Some(4),
            ..Default::default()
        };
        let (_sensor, events) = started(options, format(2, 2));

        let mut with_data = Vec::new();
        loop {
            match events.recv_timeout(Duration::from_secs(2)) {
                Ok(event) => with_data.push((event.sequence(), event.has_frame())),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => panic!("producer stalled"),
            }
        }

        // Queue depth may drop frames, but no event past the limit is produced
        assert!(with_data.iter().all(|(seq, _)| *seq <= 4));
        assert!(
            with_data
                .iter()
                .all(|(seq, has_frame)| *has_frame == (seq % 2 != 0))
        );
    }

    #[test]
    fn test_stop_disconnects_queue() {
        let (mut sensor, events) = started(SimulationOptions::default(), format(8, 8));
        sensor.stop();
        sensor.stop();

        // Drain what was queued before the stop, then the queue reports disconnection
        while events.try_recv().is_ok() {}
        assert!(matches!(
            events.recv_timeout(Duration::from_millis(200)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_orbit_scene_has_unknown_border() {
        let format = DepthStreamFormat::default();
        let mut samples = vec![0i16; format.pixel_count()];
        fill_scene(SceneKind::Orbit, &format, 1, &mut samples);

        let width = format.width as usize;
        assert_eq!(samples[0], range::UNKNOWN_DEPTH);
        assert_eq!(samples[width - 1], range::UNKNOWN_DEPTH);
        assert_eq!(samples[samples.len() - 1], range::UNKNOWN_DEPTH);

        let center = samples[(format.height as usize / 2) * width + width / 2];
        assert!(center > range::DEFAULT_MIN_MM && center < range::DEFAULT_MAX_MM);
    }

    #[test]
    fn test_orbit_scene_moves() {
        let format = DepthStreamFormat::default();
        let mut first = vec![0i16; format.pixel_count()];
        let mut later = vec![0i16; format.pixel_count()];
        fill_scene(SceneKind::Orbit, &format, 1, &mut first);
        fill_scene(SceneKind::Orbit, &format, 45, &mut later);
        assert_ne!(first, later);
    }
}
