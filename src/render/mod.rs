// SPDX-License-Identifier: GPL-3.0-only

//! Render boundary and the fixed-cadence render loop
//!
//! The loop never touches sensor state: each tick it takes the latest
//! published snapshot of the shared pixel buffer, uploads it to an image
//! surface, draws the surface and presents. When no new frame has been
//! published since the last tick the previous contents are drawn again.
//!
//! # Targets
//!
//! - [`terminal`]: ratatui half-block renderer for interactive viewing
//! - [`headless`]: no output, logs per-second statistics

pub mod headless;
pub mod terminal;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backends::sensor::frame_loop::LoopAction;
use crate::constants::render;
use crate::depth::{PixelBuffer, SharedPixelBuffer};
use crate::errors::RenderResult;

pub use headless::HeadlessTarget;
pub use terminal::TerminalTarget;

/// Handle to an image surface created by a render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// Top-left corner a surface is drawn at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };
}

/// Presentation surface the render loop draws into
pub trait RenderTarget {
    /// Create an RGB image surface of `width` x `height` pixels
    fn create_image_surface(&mut self, width: u32, height: u32) -> RenderResult<SurfaceId>;

    /// Replace the contents of `surface` with `pixels`
    ///
    /// `pixels` is an immutable snapshot; targets may keep it until the next upload.
    fn upload_pixels(&mut self, surface: SurfaceId, pixels: Arc<PixelBuffer>) -> RenderResult<()>;

    /// Draw `surface` with its top-left corner at `position`
    fn draw_surface(&mut self, surface: SurfaceId, position: Position) -> RenderResult<()>;

    /// Show everything drawn since the last present
    fn present(&mut self) -> RenderResult<()>;
}

/// Outcome of one render tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// 1-based tick number
    pub tick: u64,
    /// Generation of the snapshot that was drawn
    pub generation: u64,
    /// True when the snapshot was published since the previous tick
    pub fresh: bool,
}

/// Clamp a requested cadence to the supported range
pub fn clamp_render_fps(fps: u32) -> u32 {
    fps.clamp(render::MIN_RENDER_FPS, render::MAX_RENDER_FPS)
}

/// Fixed-cadence consumer of the shared pixel buffer
#[derive(Debug)]
pub struct RenderLoop {
    pixels: SharedPixelBuffer,
    surface: Option<SurfaceId>,
    position: Position,
    interval: Duration,
    last_generation: Option<u64>,
    ticks: u64,
}

impl RenderLoop {
    pub fn new(pixels: SharedPixelBuffer, fps: u32) -> Self {
        let fps = clamp_render_fps(fps);
        Self {
            pixels,
            surface: None,
            position: Position::ORIGIN,
            interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
            last_generation: None,
            ticks: 0,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Surface created on the first tick
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// Snapshot, upload, draw, present
    pub fn tick<T: RenderTarget + ?Sized>(&mut self, target: &mut T) -> RenderResult<TickStats> {
        let surface = match self.surface {
            Some(surface) => surface,
            None => {
                let surface =
                    target.create_image_surface(self.pixels.width(), self.pixels.height())?;
                debug!(
                    ?surface,
                    width = self.pixels.width(),
                    height = self.pixels.height(),
                    "Created image surface"
                );
                self.surface = Some(surface);
                surface
            }
        };

        // Read before the snapshot; a publish in between is reported on the next tick
        let generation = self.pixels.generation();
        let snapshot = self.pixels.snapshot();

        target.upload_pixels(surface, snapshot)?;
        target.draw_surface(surface, self.position)?;
        target.present()?;

        self.ticks += 1;
        let fresh = self.last_generation != Some(generation);
        self.last_generation = Some(generation);

        Ok(TickStats {
            tick: self.ticks,
            generation,
            fresh,
        })
    }

    /// Tick at the configured cadence until `control` returns [`LoopAction::Stop`]
    ///
    /// `control` runs after every tick and may inspect or drive the target
    /// (input handling, statistics). Returns the number of ticks run.
    pub fn run<T, F>(&mut self, target: &mut T, mut control: F) -> RenderResult<u64>
    where
        T: RenderTarget + ?Sized,
        F: FnMut(&mut T, &TickStats) -> RenderResult<LoopAction>,
    {
        info!(interval_ms = self.interval.as_millis() as u64, "Render loop started");
        let first_tick = self.ticks;

        loop {
            let started = Instant::now();
            let stats = self.tick(target)?;

            if control(target, &stats)? == LoopAction::Stop {
                break;
            }

            let elapsed = started.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }

        let ran = self.ticks - first_tick;
        info!(ticks = ran, "Render loop stopped");
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::Rgb;

    #[derive(Default)]
    struct CountingTarget {
        surfaces: u32,
        uploads: Vec<Arc<PixelBuffer>>,
        draws: Vec<(SurfaceId, Position)>,
        presents: u32,
    }

    impl RenderTarget for CountingTarget {
        fn create_image_surface(&mut self, _width: u32, _height: u32) -> RenderResult<SurfaceId> {
            self.surfaces += 1;
            Ok(SurfaceId(self.surfaces))
        }

        fn upload_pixels(&mut self, _surface: SurfaceId, pixels: Arc<PixelBuffer>) -> RenderResult<()> {
            self.uploads.push(pixels);
            Ok(())
        }

        fn draw_surface(&mut self, surface: SurfaceId, position: Position) -> RenderResult<()> {
            self.draws.push((surface, position));
            Ok(())
        }

        fn present(&mut self) -> RenderResult<()> {
            self.presents += 1;
            Ok(())
        }
    }

    #[test]
    fn test_clamp_render_fps() {
        assert_eq!(clamp_render_fps(0), render::MIN_RENDER_FPS);
        assert_eq!(clamp_render_fps(60), 60);
        assert_eq!(clamp_render_fps(10_000), render::MAX_RENDER_FPS);
    }

    #[test]
    fn test_surface_created_once() {
        let pixels = SharedPixelBuffer::new(4, 4);
        let mut render_loop = RenderLoop::new(pixels, 60);
        let mut target = CountingTarget::default();

        render_loop.tick(&mut target).unwrap();
        render_loop.tick(&mut target).unwrap();

        assert_eq!(target.surfaces, 1);
        assert_eq!(target.presents, 2);
        assert_eq!(target.draws, vec![(SurfaceId(1), Position::ORIGIN); 2]);
    }

    #[test]
    fn test_stale_tick_redraws_previous_frame() {
        let pixels = SharedPixelBuffer::new(2, 1);
        let mut writer = pixels.writer();
        let mut render_loop = RenderLoop::new(pixels, 60);
        let mut target = CountingTarget::default();

        let first = render_loop.tick(&mut target).unwrap();
        assert!(first.fresh);

        writer
            .publish_with(|buf| {
                buf.fill(Rgb::gray(50));
                Ok::<(), ()>(())
            })
            .unwrap();
        let second = render_loop.tick(&mut target).unwrap();
        let third = render_loop.tick(&mut target).unwrap();

        assert!(second.fresh);
        assert!(!third.fresh);
        assert_eq!(second.generation, third.generation);
        assert_eq!(target.uploads[1], target.uploads[2]);
        assert!(target.uploads[0].is_black());
    }

    #[test]
    fn test_run_stops_on_request() {
        let pixels = SharedPixelBuffer::new(1, 1);
        let mut render_loop = RenderLoop::new(pixels, render::MAX_RENDER_FPS);
        let mut target = CountingTarget::default();

        let ran = render_loop
            .run(&mut target, |_, stats| {
                Ok(if stats.tick >= 3 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                })
            })
            .unwrap();

        assert_eq!(ran, 3);
        assert_eq!(target.presents, 3);
    }
}
