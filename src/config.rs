// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/depth-viewer/config.json`. The
//! directory can be overridden with `DEPTH_VIEWER_CONFIG_DIR`. Every field
//! has a default, so partial files are accepted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backends::sensor::{
    DepthStreamFormat, RangeMode, SensorBackendType, SimulationOptions,
};
use crate::constants::render;
use crate::depth::IntensityMapping;
use crate::errors::{ConfigError, ConfigResult};

/// Environment variable overriding the configuration directory
pub const ENV_CONFIG_DIR: &str = "DEPTH_VIEWER_CONFIG_DIR";

const APP_DIR: &str = "depth-viewer";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sensor driver to use
    pub backend: SensorBackendType,
    /// Depth stream format requested from the sensor
    pub stream: DepthStreamFormat,
    /// Reliable range stamped on frames
    pub range_mode: RangeMode,
    /// Depth-to-intensity mapping
    pub mapping: IntensityMapping,
    /// Render loop cadence (ticks per second)
    pub render_fps: u32,
    /// Make the simulated sensor fail at start
    pub fail_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: SensorBackendType::default(),
            stream: DepthStreamFormat::default(),
            range_mode: RangeMode::default(),
            mapping: IntensityMapping::default(),
            render_fps: render::DEFAULT_RENDER_FPS,
            fail_start: false,
        }
    }
}

impl Config {
    /// Default configuration file location, if a config directory can be determined
    pub fn default_path() -> Option<PathBuf> {
        let dir = match std::env::var_os(ENV_CONFIG_DIR) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()?.join(APP_DIR),
        };
        Some(dir.join(CONFIG_FILE))
    }

    /// Load from the default location; defaults when there is none
    pub fn load() -> ConfigResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No configuration directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Configuration file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.stream.pixel_count() == 0 || self.stream.fps == 0 {
            return Err(ConfigError::Invalid(format!(
                "stream format {} is empty",
                self.stream
            )));
        }
        if !(render::MIN_RENDER_FPS..=render::MAX_RENDER_FPS).contains(&self.render_fps) {
            return Err(ConfigError::Invalid(format!(
                "render_fps must be between {} and {}, got {}",
                render::MIN_RENDER_FPS,
                render::MAX_RENDER_FPS,
                self.render_fps
            )));
        }
        Ok(())
    }

    /// Simulated sensor behaviour for this configuration
    pub fn simulation_options(&self) -> SimulationOptions {
        SimulationOptions {
            fail_start: self.fail_start,
            ..Default::default()
        }
    }
}
