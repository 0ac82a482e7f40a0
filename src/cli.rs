// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the depth viewer
//!
//! This module provides command-line functionality for:
//! - Listing attached depth sensors
//! - Running the interactive terminal viewer
//! - Running the pipeline headless for a fixed duration

use depth_viewer::app::{DepthViewer, connect_or_degrade};
use depth_viewer::backends::sensor::{self, LoopAction};
use depth_viewer::config::Config;
use depth_viewer::depth::DepthSettings;
use depth_viewer::render::{HeadlessTarget, terminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// List all attached depth sensors
pub fn list_sensors(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let backend = sensor::get_backend(
        config.backend,
        &DepthSettings::default(),
        &config.simulation_options(),
    );
    let sensors = backend.enumerate_sensors();

    if sensors.is_empty() {
        println!("No depth sensors found.");
        return Ok(());
    }

    println!("Depth sensors ({}):", backend.backend_type());
    println!();
    for (index, device) in sensors.iter().enumerate() {
        println!("  [{}] {} ({})", index, device.name, device.status);
        println!("      Path: {}", device.path);
        if let Some(serial) = &device.serial {
            println!("      Serial: {}", serial);
        }
        println!();
    }

    Ok(())
}

/// Run the interactive terminal viewer
pub fn run_viewer(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut viewer = DepthViewer::new(config);
    connect_or_degrade(&mut viewer);

    let result = terminal::run(&viewer);
    viewer.shutdown();
    result
}

/// Run sensor and render loop without output for `seconds`, then print a summary
pub fn run_headless(config: Config, seconds: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mut viewer = DepthViewer::new(config);
    connect_or_degrade(&mut viewer);

    match viewer.sensor_device() {
        Some(device) => println!("Streaming from {} ({})", device.name, device.path),
        None => println!("No depth sensor running, rendering black frames"),
    }

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let start = Instant::now();
    let target_duration = Duration::from_secs(seconds);
    println!("Running for {}s. Press Ctrl+C to stop early.", seconds);

    let mut target = HeadlessTarget::new();
    let mut render_loop = viewer.render_loop();
    let ticks = render_loop.run(&mut target, |_, _| {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            return Ok(LoopAction::Stop);
        }
        Ok(if start.elapsed() >= target_duration {
            LoopAction::Stop
        } else {
            LoopAction::Continue
        })
    })?;

    viewer.shutdown();

    let elapsed = start.elapsed().as_secs_f64();
    let mean = target
        .last_frame()
        .map(|frame| frame.mean_intensity())
        .unwrap_or(0.0);

    println!();
    println!("Render ticks:     {}", ticks);
    println!("Frames published: {}", viewer.pixels().generation());
    println!("Fresh frames:     {}", target.fresh_frames());
    if elapsed > 0.0 {
        println!("Render rate:      {:.1} fps", ticks as f64 / elapsed);
    }
    println!("Mean intensity:   {:.1}", mean);
    println!("Sensor state:     {}", viewer.sensor_state());

    Ok(())
}
