// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the sensor lifecycle against the simulated sensor

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use depth_viewer::backends::sensor::{
    DepthStreamFormat, SceneKind, SensorLifecycle, SensorSlot, SensorState, SensorStatus,
    SimulatedSensor, SimulationOptions,
};
use depth_viewer::depth::DepthSettings;
use depth_viewer::errors::SensorError;
use depth_viewer::render::HeadlessTarget;
use depth_viewer::{Config, DepthViewer};

fn small_format() -> DepthStreamFormat {
    DepthStreamFormat {
        width: 8,
        height: 6,
        fps: 120,
    }
}

fn small_config() -> Config {
    Config {
        stream: small_format(),
        render_fps: 240,
        ..Default::default()
    }
}

fn simulated(settings: &DepthSettings, options: SimulationOptions) -> Box<SimulatedSensor> {
    Box::new(SimulatedSensor::new(settings.clone(), options))
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_no_device_renders_black() {
    let mut viewer = DepthViewer::new(small_config());
    let backend = simulated(
        viewer.settings(),
        SimulationOptions {
            statuses: Vec::new(),
            ..Default::default()
        },
    );

    assert_eq!(
        viewer.connect(backend).unwrap_err(),
        SensorError::NoDeviceFound
    );

    let mut target = HeadlessTarget::new();
    let mut render_loop = viewer.render_loop();
    for _ in 0..3 {
        render_loop.tick(&mut target).unwrap();
        assert!(target.last_frame().unwrap().is_black());
    }
}

#[test]
fn test_only_connected_sensor_is_picked() {
    let settings = DepthSettings::default();
    let mut lifecycle = SensorLifecycle::new(small_format());
    let backend = simulated(
        &settings,
        SimulationOptions {
            statuses: vec![
                SensorStatus::NotPowered,
                SensorStatus::InUse,
                SensorStatus::Connected,
            ],
            ..Default::default()
        },
    );

    let device = lifecycle.discover(backend).unwrap();
    assert_eq!(device.path, "simulated:2");
    assert_eq!(lifecycle.state(), SensorState::Discovered);
}

#[test]
fn test_start_failure_leaves_no_handle_and_black_frames() {
    let config = Config {
        fail_start: true,
        backend: depth_viewer::backends::sensor::SensorBackendType::Simulated,
        ..small_config()
    };
    let mut viewer = DepthViewer::new(config);

    let err = viewer.connect_configured().unwrap_err();
    assert!(matches!(err, SensorError::DeviceUnavailable(_)));
    assert!(viewer.sensor_device().is_none());

    let mut target = HeadlessTarget::new();
    let mut render_loop = viewer.render_loop();
    for _ in 0..5 {
        render_loop.tick(&mut target).unwrap();
        assert!(target.last_frame().unwrap().is_black());
    }
    assert_eq!(viewer.pixels().generation(), 0);
}

#[test]
fn test_frames_reach_pixel_buffer() {
    let mut viewer = DepthViewer::new(small_config());
    let backend = simulated(
        viewer.settings(),
        SimulationOptions {
            scene: SceneKind::Constant(2400),
            ..Default::default()
        },
    );
    viewer.connect(backend).unwrap();

    assert!(wait_for(|| viewer.pixels().generation() > 0));
    let snapshot = viewer.pixels().snapshot();
    assert_eq!(snapshot.len(), 48);
    assert!(snapshot.pixels().iter().all(|p| p.r == 191 && p.is_gray()));
}

#[test]
fn test_empty_events_leave_buffer_unchanged() {
    let mut lifecycle = SensorLifecycle::new(small_format());
    let backend = simulated(
        &DepthSettings::default(),
        SimulationOptions {
            scene: SceneKind::Constant(1000),
            empty_every: Some(1),
            frame_limit: Some(10),
            ..Default::default()
        },
    );
    lifecycle.discover(backend).unwrap();

    let delivered = Arc::new(Mutex::new(0u32));
    let delivered_clone = Arc::clone(&delivered);
    lifecycle
        .start(move |_| *delivered_clone.lock().unwrap() += 1)
        .unwrap();

    // Every event is empty; the producer finishes after ten of them
    std::thread::sleep(Duration::from_millis(300));
    lifecycle.stop();
    assert_eq!(*delivered.lock().unwrap(), 0);
}

#[test]
fn test_stop_is_idempotent() {
    let mut viewer = DepthViewer::new(small_config());
    let backend = simulated(viewer.settings(), SimulationOptions::default());
    viewer.connect(backend).unwrap();
    assert_eq!(viewer.sensor_state(), SensorState::Running);

    viewer.shutdown();
    viewer.shutdown();
    assert_eq!(viewer.sensor_state(), SensorState::Stopped);

    // Frames published before the stop stay visible
    let generation = viewer.pixels().generation();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(viewer.pixels().generation(), generation);
}

#[test]
fn test_rediscover_after_stop() {
    let settings = DepthSettings::default();
    let mut lifecycle = SensorLifecycle::new(small_format());

    lifecycle
        .discover(simulated(&settings, SimulationOptions::default()))
        .unwrap();
    lifecycle.start(|_| {}).unwrap();
    lifecycle.stop();
    assert!(matches!(lifecycle.slot(), SensorSlot::Absent));

    lifecycle
        .discover(simulated(&settings, SimulationOptions::default()))
        .unwrap();
    lifecycle.start(|_| {}).unwrap();
    assert_eq!(lifecycle.state(), SensorState::Running);
}

#[test]
fn test_range_mode_change_applies_to_new_frames() {
    let mut viewer = DepthViewer::new(small_config());
    let backend = simulated(
        viewer.settings(),
        SimulationOptions {
            scene: SceneKind::Constant(3500),
            ..Default::default()
        },
    );
    viewer.connect(backend).unwrap();

    // 3500 is inside the default range
    assert!(wait_for(|| viewer.pixels().snapshot().pixels()[0].r > 0));

    // ...and beyond the near range
    viewer
        .settings()
        .set_range_mode(depth_viewer::backends::sensor::RangeMode::Near);
    assert!(wait_for(|| viewer.pixels().snapshot().is_black()));
}
