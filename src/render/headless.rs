// SPDX-License-Identifier: GPL-3.0-only

//! Headless render target
//!
//! Keeps the last uploaded snapshot instead of drawing it and logs
//! throughput statistics once per reporting interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{Position, RenderTarget, SurfaceId};
use crate::constants::timing;
use crate::depth::PixelBuffer;
use crate::errors::{RenderError, RenderResult};

/// Statistics for one reporting interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlessReport {
    pub elapsed: Duration,
    /// Frames presented in the interval
    pub presents: u64,
    /// Presents that showed a newly published image
    pub fresh_frames: u64,
    /// Mean gray level of the last presented image
    pub mean_intensity: f64,
}

/// Render target that renders nowhere
#[derive(Debug)]
pub struct HeadlessTarget {
    surfaces: Vec<(u32, u32)>,
    last_frame: Option<Arc<PixelBuffer>>,
    pending_fresh: bool,
    presented: u64,
    fresh_total: u64,
    window_start: Instant,
    window_presents: u64,
    window_fresh: u64,
    report_interval: Duration,
    last_report: Option<HeadlessReport>,
}

impl Default for HeadlessTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessTarget {
    pub fn new() -> Self {
        Self::with_report_interval(timing::STATS_INTERVAL)
    }

    pub fn with_report_interval(report_interval: Duration) -> Self {
        Self {
            surfaces: Vec::new(),
            last_frame: None,
            pending_fresh: false,
            presented: 0,
            fresh_total: 0,
            window_start: Instant::now(),
            window_presents: 0,
            window_fresh: 0,
            report_interval,
            last_report: None,
        }
    }

    /// Last uploaded image
    pub fn last_frame(&self) -> Option<&Arc<PixelBuffer>> {
        self.last_frame.as_ref()
    }

    /// Total presents
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Total presents that showed a newly published image
    pub fn fresh_frames(&self) -> u64 {
        self.fresh_total
    }

    pub fn last_report(&self) -> Option<&HeadlessReport> {
        self.last_report.as_ref()
    }

    fn surface_size(&self, surface: SurfaceId) -> RenderResult<(u32, u32)> {
        self.surfaces
            .get(surface.0 as usize)
            .copied()
            .ok_or(RenderError::UnknownSurface(surface))
    }

    fn report(&mut self) {
        let mean_intensity = self
            .last_frame
            .as_ref()
            .map(|frame| frame.mean_intensity())
            .unwrap_or(0.0);

        let report = HeadlessReport {
            elapsed: self.window_start.elapsed(),
            presents: self.window_presents,
            fresh_frames: self.window_fresh,
            mean_intensity,
        };
        info!(
            presents = report.presents,
            fresh_frames = report.fresh_frames,
            mean_intensity = report.mean_intensity,
            "Render statistics"
        );

        self.last_report = Some(report);
        self.window_start = Instant::now();
        self.window_presents = 0;
        self.window_fresh = 0;
    }
}

impl RenderTarget for HeadlessTarget {
    fn create_image_surface(&mut self, width: u32, height: u32) -> RenderResult<SurfaceId> {
        let id = SurfaceId(self.surfaces.len() as u32);
        self.surfaces.push((width, height));
        debug!(?id, width, height, "Headless surface created");
        Ok(id)
    }

    fn upload_pixels(&mut self, surface: SurfaceId, pixels: Arc<PixelBuffer>) -> RenderResult<()> {
        let (width, height) = self.surface_size(surface)?;
        if pixels.width() != width || pixels.height() != height {
            return Err(RenderError::SurfaceSizeMismatch {
                width,
                height,
                actual_width: pixels.width(),
                actual_height: pixels.height(),
            });
        }

        self.pending_fresh = !self
            .last_frame
            .as_ref()
            .is_some_and(|last| Arc::ptr_eq(last, &pixels));
        self.last_frame = Some(pixels);
        Ok(())
    }

    fn draw_surface(&mut self, surface: SurfaceId, _position: Position) -> RenderResult<()> {
        self.surface_size(surface).map(|_| ())
    }

    fn present(&mut self) -> RenderResult<()> {
        self.presented += 1;
        self.window_presents += 1;
        if std::mem::take(&mut self.pending_fresh) {
            self.fresh_total += 1;
            self.window_fresh += 1;
        }

        if self.window_start.elapsed() >= self.report_interval {
            self.report();
        }
        Ok(())
    }
}
