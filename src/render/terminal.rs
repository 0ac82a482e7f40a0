// SPDX-License-Identifier: GPL-3.0-only

//! Terminal-based depth viewer
//!
//! Renders the depth image to the terminal using Unicode half-block
//! characters for improved vertical resolution.

use std::io::{self, stdout};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};
use tracing::info;

use super::{Position, RenderTarget, SurfaceId};
use crate::app::DepthViewer;
use crate::backends::sensor::frame_loop::LoopAction;
use crate::depth::PixelBuffer;
use crate::errors::{RenderError, RenderResult};

/// Run the interactive terminal viewer until the user quits
pub fn run(viewer: &DepthViewer) -> Result<(), Box<dyn std::error::Error>> {
    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    let mut target = TerminalTarget::new(terminal);

    // Run the app
    let result = run_app(viewer, &mut target);

    // Restore terminal
    disable_raw_mode()?;
    execute!(target.terminal_mut().backend_mut(), LeaveAlternateScreen)?;
    target.terminal_mut().show_cursor()?;

    result.map_err(Into::into)
}

fn run_app<B: Backend>(viewer: &DepthViewer, target: &mut TerminalTarget<B>) -> RenderResult<()> {
    let settings = viewer.settings().clone();
    let mut show_help = false;
    let mut render_loop = viewer.render_loop();

    render_loop.run(target, |target, stats| {
        // Drain pending input without blocking the render cadence
        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            match command_for_key(key) {
                Some(Command::Quit) => return Ok(LoopAction::Stop),
                Some(Command::ToggleRange) => {
                    let mode = settings.range_mode().toggled();
                    settings.set_range_mode(mode);
                    info!(%mode, "Range mode changed");
                }
                Some(Command::ToggleMapping) => {
                    let mapping = settings.mapping().toggled();
                    settings.set_mapping(mapping);
                    info!(%mapping, "Intensity mapping changed");
                }
                Some(Command::ToggleHelp) => show_help = !show_help,
                None => {}
            }
        }

        let status = if show_help {
            build_help_message()
        } else {
            build_status_message(viewer, stats.generation)
        };
        target.set_status(status);
        Ok(LoopAction::Continue)
    })?;

    Ok(())
}

/// Viewer command bound to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    ToggleRange,
    ToggleMapping,
    ToggleHelp,
}

/// Map a key press to a viewer command
pub fn command_for_key(key: KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    // Ctrl+C to quit
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Command::Quit);
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        KeyCode::Char('n') => Some(Command::ToggleRange),
        KeyCode::Char('m') => Some(Command::ToggleMapping),
        KeyCode::Char('h') => Some(Command::ToggleHelp),
        _ => None,
    }
}

fn build_status_message(viewer: &DepthViewer, generation: u64) -> String {
    let settings = viewer.settings();
    let sensor = viewer
        .sensor_device()
        .map(|device| device.name.clone())
        .unwrap_or_else(|| "no sensor".to_string());

    format!(
        "{} [{}] | frames {} | range {} ({}) | {} | 'h' help | 'q' quit",
        sensor,
        viewer.sensor_state(),
        generation,
        settings.reliable_range(),
        settings.range_mode(),
        settings.mapping(),
    )
}

fn build_help_message() -> String {
    "n: Toggle near range | m: Toggle intensity mapping | h: Toggle help | q/Ctrl+C: Quit"
        .to_string()
}

#[derive(Debug)]
struct Surface {
    width: u32,
    height: u32,
    pixels: Option<Arc<PixelBuffer>>,
}

/// Render target drawing into a ratatui terminal
///
/// Positions are in terminal cells. The bottom line is reserved for the
/// status bar.
pub struct TerminalTarget<B: Backend> {
    terminal: Terminal<B>,
    surfaces: Vec<Surface>,
    draw_list: Vec<(SurfaceId, Position)>,
    status: String,
}

impl<B: Backend> TerminalTarget<B> {
    pub fn new(terminal: Terminal<B>) -> Self {
        Self {
            terminal,
            surfaces: Vec::new(),
            draw_list: Vec::new(),
            status: String::new(),
        }
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<B> {
        &mut self.terminal
    }

    pub fn set_status(&mut self, status: String) {
        self.status = status;
    }

    fn surface_mut(&mut self, surface: SurfaceId) -> RenderResult<&mut Surface> {
        self.surfaces
            .get_mut(surface.0 as usize)
            .ok_or(RenderError::UnknownSurface(surface))
    }
}

impl<B: Backend> RenderTarget for TerminalTarget<B> {
    fn create_image_surface(&mut self, width: u32, height: u32) -> RenderResult<SurfaceId> {
        let id = SurfaceId(self.surfaces.len() as u32);
        self.surfaces.push(Surface {
            width,
            height,
            pixels: None,
        });
        Ok(id)
    }

    fn upload_pixels(&mut self, surface: SurfaceId, pixels: Arc<PixelBuffer>) -> RenderResult<()> {
        let target = self.surface_mut(surface)?;
        if pixels.width() != target.width || pixels.height() != target.height {
            return Err(RenderError::SurfaceSizeMismatch {
                width: target.width,
                height: target.height,
                actual_width: pixels.width(),
                actual_height: pixels.height(),
            });
        }
        target.pixels = Some(pixels);
        Ok(())
    }

    fn draw_surface(&mut self, surface: SurfaceId, position: Position) -> RenderResult<()> {
        self.surface_mut(surface)?;
        self.draw_list.push((surface, position));
        Ok(())
    }

    fn present(&mut self) -> RenderResult<()> {
        let draw_list = std::mem::take(&mut self.draw_list);
        let surfaces = &self.surfaces;
        let status = &self.status;

        self.terminal.draw(|f| {
            let area = f.area();
            let (image_area, status_area) = split_status_line(area);

            for (surface, position) in &draw_list {
                let Some(pixels) = surfaces
                    .get(surface.0 as usize)
                    .and_then(|s| s.pixels.as_deref())
                else {
                    continue;
                };
                f.render_widget(FrameWidget { pixels }, offset(image_area, *position));
            }

            f.render_widget(StatusBar { message: status }, status_area);
        })
        .map_err(|e| io::Error::other(e.to_string()))?;

        Ok(())
    }
}

/// Split `area` into the image region and the bottom status line
fn split_status_line(area: Rect) -> (Rect, Rect) {
    let image_height = area.height.saturating_sub(1);
    let image_area = Rect {
        height: image_height,
        ..area
    };
    let status_area = Rect {
        y: area.y + image_height,
        height: area.height.min(1),
        ..area
    };
    (image_area, status_area)
}

/// Shift `area` by a cell offset, clipping to the original bounds
fn offset(area: Rect, position: Position) -> Rect {
    let dx = position.x.clamp(0, i32::from(area.width)) as u16;
    let dy = position.y.clamp(0, i32::from(area.height)) as u16;
    Rect {
        x: area.x + dx,
        y: area.y + dy,
        width: area.width - dx,
        height: area.height - dy,
    }
}

/// Widget that renders a depth image using half-block characters
struct FrameWidget<'a> {
    pixels: &'a PixelBuffer,
}

impl Widget for FrameWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let frame = self.pixels;
        if frame.is_empty() || area.width == 0 || area.height == 0 {
            return;
        }

        // Calculate display dimensions maintaining aspect ratio
        // Each terminal cell displays 2 vertical pixels using half-block characters
        let frame_aspect = frame.width() as f64 / frame.height() as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64; // *2 because half-blocks

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            // Terminal is wider - fit to height
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            // Terminal is taller - fit to width
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        // Center the image
        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width() as f64 / display_width as f64;
        let y_scale = frame.height() as f64 / (display_height * 2) as f64;

        // Upper half (▀) colored with fg, lower half with bg
        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let top_color = sample_pixel(frame, src_x, src_y_top);
                let bottom_color = sample_pixel(frame, src_x, src_y_bottom);

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(top_color);
                    cell.set_bg(bottom_color);
                }
            }
        }
    }
}

fn sample_pixel(frame: &PixelBuffer, x: u32, y: u32) -> Color {
    let x = x.min(frame.width() - 1);
    let y = y.min(frame.height() - 1);
    frame
        .get(x, y)
        .map(|p| Color::Rgb(p.r, p.g, p.b))
        .unwrap_or(Color::Black)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Fill background
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}
