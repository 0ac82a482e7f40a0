// SPDX-License-Identifier: GPL-3.0-only

//! Depth viewer application state
//!
//! Owns the sensor lifecycle, the live settings and the shared pixel buffer.
//! Sensor problems never stop the viewer: without a running sensor the
//! render loop keeps drawing the (black) buffer.

use tracing::{info, warn};

use crate::backends::sensor::{
    self, DepthBackend, SensorDevice, SensorLifecycle, SensorState,
};
use crate::config::Config;
use crate::depth::{DepthSettings, FramePublisher, SharedPixelBuffer};
use crate::errors::SensorResult;
use crate::render::RenderLoop;

pub struct DepthViewer {
    config: Config,
    settings: DepthSettings,
    pixels: SharedPixelBuffer,
    lifecycle: SensorLifecycle,
}

impl DepthViewer {
    pub fn new(config: Config) -> Self {
        let settings = DepthSettings::new(config.range_mode, config.mapping);
        let pixels = SharedPixelBuffer::new(config.stream.width, config.stream.height);
        let lifecycle = SensorLifecycle::new(config.stream);

        Self {
            config,
            settings,
            pixels,
            lifecycle,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect to the first sensor of the configured backend
    pub fn connect_configured(&mut self) -> SensorResult<()> {
        let backend = sensor::get_backend(
            self.config.backend,
            &self.settings,
            &self.config.simulation_options(),
        );
        self.connect(backend)
    }

    /// Discover and start the first connected sensor of `backend`
    ///
    /// Failure is reported but leaves the viewer usable without a sensor.
    pub fn connect(&mut self, backend: Box<dyn DepthBackend>) -> SensorResult<()> {
        self.lifecycle.discover(backend)?;

        let mut publisher = FramePublisher::new(self.pixels.writer(), self.settings.clone());
        self.lifecycle
            .start(move |frame| publisher.handle_frame(frame))?;

        if let Some(device) = self.lifecycle.device() {
            info!(device = %device.name, "Depth sensor connected");
        }
        Ok(())
    }

    pub fn settings(&self) -> &DepthSettings {
        &self.settings
    }

    pub fn pixels(&self) -> &SharedPixelBuffer {
        &self.pixels
    }

    pub fn sensor_state(&self) -> SensorState {
        self.lifecycle.state()
    }

    pub fn sensor_device(&self) -> Option<&SensorDevice> {
        self.lifecycle.device()
    }

    /// Render loop over this viewer's pixel buffer at the configured cadence
    pub fn render_loop(&self) -> RenderLoop {
        RenderLoop::new(self.pixels.clone(), self.config.render_fps)
    }

    /// Stop the sensor and join its frame thread
    pub fn shutdown(&mut self) {
        if self.lifecycle.slot().handle().is_some() {
            info!("Shutting down depth sensor");
        }
        self.lifecycle.stop();
    }
}

impl Drop for DepthViewer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Connect `viewer` to its configured sensor, logging instead of failing
pub fn connect_or_degrade(viewer: &mut DepthViewer) {
    if let Err(e) = viewer.connect_configured() {
        warn!(error = %e, "Running without a depth sensor");
    }
}
