// SPDX-License-Identifier: GPL-3.0-only

#![cfg(all(target_arch = "x86_64", feature = "freedepth"))]

//! Kinect v1 depth backend
//!
//! Streams depth through freedepth's `KinectStreamer`, which talks to the
//! device over USB directly (the kernel driver is unbound while streaming and
//! rebound on stop). Raw 11-bit disparity is converted to millimeters with the
//! device-calibrated lookup table, then handed to the sensor handle through a
//! bounded frame event queue.

use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError, sync_channel};

use freedepth::{
    DepthFormat, DepthFrame, DepthRegistration, DepthToMm, KinectStreamer, Resolution,
    VideoFormat, VideoFrame,
};
use tracing::{debug, info, warn};

use super::frame_loop::{FrameLoopController, LoopAction};
use super::types::{
    DepthStreamFormat, FrameEvent, FrameEventReceiver, SensorBackendType, SensorDevice,
    SensorStatus,
};
use super::DepthBackend;
use crate::constants::{FRAME_QUEUE_DEPTH, stream, timing};
use crate::depth::DepthSettings;
use crate::errors::{SensorError, SensorResult};

/// Path prefix of Kinect devices
pub const KINECT_PATH_PREFIX: &str = "kinect:";

/// Extract the freedepth device index from a device path
pub fn kinect_device_index(path: &str) -> Option<usize> {
    path.strip_prefix(KINECT_PATH_PREFIX)?.parse().ok()
}

/// Kinect depth backend state
pub struct KinectSensor {
    settings: DepthSettings,
    device_index: Option<usize>,
    streamer: Option<KinectStreamer>,
    bridge: Option<FrameLoopController>,
}

impl KinectSensor {
    pub fn new(settings: DepthSettings) -> Self {
        Self {
            settings,
            device_index: None,
            streamer: None,
            bridge: None,
        }
    }
}

impl DepthBackend for KinectSensor {
    fn enumerate_sensors(&self) -> Vec<SensorDevice> {
        let devices = match freedepth::enumerate_devices() {
            Ok(d) => d,
            Err(e) => {
                debug!("Failed to enumerate Kinect devices: {}", e);
                return Vec::new();
            }
        };

        devices
            .iter()
            .map(|dev| {
                let path = format!("{}{}", KINECT_PATH_PREFIX, dev.index);
                debug!(name = %dev.name, path = %path, "Found Kinect via freedepth");
                SensorDevice {
                    name: dev.name.clone(),
                    path,
                    serial: dev.id.serial.clone(),
                    // freedepth only lists devices it can open
                    status: SensorStatus::Connected,
                }
            })
            .collect()
    }

    fn enable_depth_stream(
        &mut self,
        device: &SensorDevice,
        format: &DepthStreamFormat,
    ) -> SensorResult<()> {
        let index = kinect_device_index(&device.path).ok_or_else(|| {
            SensorError::Backend(format!("{} is not a Kinect device", device.path))
        })?;

        // Depth11Bit at Medium resolution is the only depth mode the stream offers
        if format.width != stream::DEPTH_WIDTH
            || format.height != stream::DEPTH_HEIGHT
            || format.fps != stream::DEPTH_FPS
        {
            return Err(SensorError::FormatNotSupported(format!(
                "Kinect depth is {}x{} @ {}fps, requested {}",
                stream::DEPTH_WIDTH,
                stream::DEPTH_HEIGHT,
                stream::DEPTH_FPS,
                format
            )));
        }

        self.device_index = Some(index);
        Ok(())
    }

    fn start(&mut self) -> io::Result<FrameEventReceiver> {
        let index = self
            .device_index
            .ok_or_else(|| io::Error::other("depth stream not enabled"))?;

        self.stop();
        info!(device = index, "Starting Kinect depth stream");

        // Unbinds the kernel driver
        let mut streamer = KinectStreamer::new(index).map_err(|e| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                format!("Failed to open Kinect {}: {}", index, e),
            )
        })?;

        let (video_rx, depth_rx) = streamer
            .start(VideoFormat::Bayer, Resolution::Medium, DepthFormat::Depth11Bit)
            .map_err(|e| io::Error::other(format!("Failed to start streaming: {}", e)))?;

        let registration = streamer.create_depth_registration();
        let converter = registration.depth_to_mm().clone();
        info!(
            target_offset = %registration.target_offset(),
            "Using device-calibrated depth conversion"
        );

        let (sender, receiver) = sync_channel(FRAME_QUEUE_DEPTH);
        let settings = self.settings.clone();

        self.bridge = Some(FrameLoopController::start_with_init(
            &format!("kinect-depth:{}", index),
            move || {
                Ok(Bridge {
                    video_rx,
                    depth_rx,
                    converter,
                    sender,
                    settings,
                    depth_mm: Vec::new(),
                    sequence: 0,
                })
            },
            Bridge::step,
        ));
        self.streamer = Some(streamer);

        Ok(receiver)
    }

    fn stop(&mut self) {
        if self.streamer.is_none() && self.bridge.is_none() {
            return;
        }

        // Stopping the streamer closes its channels, which ends the bridge
        if let Some(mut streamer) = self.streamer.take() {
            streamer.stop();
            if let Err(e) = streamer.rebind_driver() {
                warn!("Failed to rebind kernel driver: {}", e);
            }
        }
        if let Some(mut bridge) = self.bridge.take() {
            bridge.stop();
        }

        info!("Kinect depth stream stopped");
    }

    fn backend_type(&self) -> SensorBackendType {
        SensorBackendType::Kinect
    }
}

impl Drop for KinectSensor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forwards freedepth depth frames as frame events
struct Bridge {
    video_rx: Receiver<VideoFrame>,
    depth_rx: Receiver<DepthFrame>,
    converter: DepthToMm,
    sender: SyncSender<FrameEvent>,
    settings: DepthSettings,
    depth_mm: Vec<u16>,
    sequence: u64,
}

impl Bridge {
    fn step(&mut self) -> LoopAction {
        // The video stream runs alongside depth; discard it so it cannot back up
        loop {
            match self.video_rx.try_recv() {
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Video channel disconnected");
                    return LoopAction::Stop;
                }
            }
        }

        let frame = match self.depth_rx.recv_timeout(timing::FRAME_POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => return LoopAction::Continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Depth channel disconnected");
                return LoopAction::Stop;
            }
        };

        self.sequence += 1;
        let event = match frame.as_u16() {
            Some(raw) => {
                self.depth_mm.resize(raw.len(), 0);
                self.converter.convert_frame(raw, &mut self.depth_mm);
                let samples = self
                    .depth_mm
                    .iter()
                    .map(|&mm| i16::try_from(mm).unwrap_or(i16::MAX))
                    .collect();
                FrameEvent::new(
                    frame.width,
                    frame.height,
                    samples,
                    self.settings.reliable_range(),
                    self.sequence,
                )
            }
            None => FrameEvent::empty(self.sequence),
        };

        match self.sender.try_send(event) {
            Ok(()) => {
                if self.sequence % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(sequence = self.sequence, "Kinect depth frame forwarded");
                }
                LoopAction::Continue
            }
            Err(TrySendError::Full(_)) => {
                debug!(sequence = self.sequence, "Kinect depth frame dropped (queue full)");
                LoopAction::Continue
            }
            Err(TrySendError::Disconnected(_)) => LoopAction::Stop,
        }
    }
}
