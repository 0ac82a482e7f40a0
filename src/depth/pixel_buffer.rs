// SPDX-License-Identifier: GPL-3.0-only

//! Render-ready grayscale image shared between the frame thread and the
//! render loop
//!
//! Publication is a double buffer: the writer fills a private back buffer and
//! swaps it with the front under a lock held only for the pointer swap.
//! Readers take an `Arc` snapshot of the front, which is never mutated while
//! shared, so no reader can observe a partially written frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One RGB pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::gray(0);

    /// Pixel with the same intensity in every channel
    pub const fn gray(intensity: u8) -> Self {
        Self {
            r: intensity,
            g: intensity,
            b: intensity,
        }
    }

    pub fn is_gray(&self) -> bool {
        self.r == self.g && self.g == self.b
    }
}

/// Fixed-size RGB image
///
/// The pixel count is fixed at construction; only pixel values change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgb>,
}

impl PixelBuffer {
    /// Create an all-black buffer
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgb::BLACK; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Row-major pixels
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// Mutable row-major pixels (a slice, so the length cannot change)
    pub fn pixels_mut(&mut self) -> &mut [Rgb] {
        &mut self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn fill(&mut self, color: Rgb) {
        self.pixels.fill(color);
    }

    pub fn is_grayscale(&self) -> bool {
        self.pixels.iter().all(Rgb::is_gray)
    }

    pub fn is_black(&self) -> bool {
        self.pixels.iter().all(|p| *p == Rgb::BLACK)
    }

    /// Mean red-channel intensity (the image is grayscale)
    pub fn mean_intensity(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|p| u64::from(p.r)).sum();
        sum as f64 / self.pixels.len() as f64
    }
}

#[derive(Debug)]
struct Shared {
    front: Mutex<Arc<PixelBuffer>>,
    generation: AtomicU64,
}

/// Handle to the published image
///
/// Clones refer to the same image.
#[derive(Debug, Clone)]
pub struct SharedPixelBuffer {
    shared: Arc<Shared>,
    width: u32,
    height: u32,
}

impl SharedPixelBuffer {
    /// Create a shared image that starts all black
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                front: Mutex::new(Arc::new(PixelBuffer::new(width, height))),
                generation: AtomicU64::new(0),
            }),
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Latest completely written image
    pub fn snapshot(&self) -> Arc<PixelBuffer> {
        Arc::clone(&self.front())
    }

    /// Number of frames published so far
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Create the writer side of the double buffer
    ///
    /// The pipeline has exactly one writer: the sensor's frame handler.
    pub fn writer(&self) -> PixelBufferWriter {
        PixelBufferWriter {
            shared: self.clone(),
            back: Arc::new(PixelBuffer::new(self.width, self.height)),
        }
    }

    fn front(&self) -> MutexGuard<'_, Arc<PixelBuffer>> {
        // A panicking writer cannot leave the Arc half-swapped
        self.shared
            .front
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writer side of [`SharedPixelBuffer`]
#[derive(Debug)]
pub struct PixelBufferWriter {
    shared: SharedPixelBuffer,
    back: Arc<PixelBuffer>,
}

impl PixelBufferWriter {
    /// Fill the back buffer with `write` and publish it if `write` succeeds
    ///
    /// The back buffer is reused across frames. It is only copied when a
    /// reader still holds a snapshot of it from an earlier publish.
    pub fn publish_with<E, F>(&mut self, write: F) -> Result<(), E>
    where
        F: FnOnce(&mut PixelBuffer) -> Result<(), E>,
    {
        write(Arc::make_mut(&mut self.back))?;

        {
            let mut front = self.shared.front();
            std::mem::swap(&mut *front, &mut self.back);
        }
        self.shared.shared.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }
}
