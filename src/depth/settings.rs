// SPDX-License-Identifier: GPL-3.0-only

//! Live depth visualization settings
//!
//! Updated from the UI thread and read from the frame threads, so each value
//! is a single atomic and readers never block.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::processor::IntensityMapping;
use crate::backends::sensor::{DepthRange, RangeMode};

#[derive(Debug)]
struct SettingsInner {
    range_mode: AtomicU8,
    mapping: AtomicU8,
}

/// Shared, cheaply clonable handle to the live settings
#[derive(Debug, Clone)]
pub struct DepthSettings {
    inner: Arc<SettingsInner>,
}

impl DepthSettings {
    pub fn new(range_mode: RangeMode, mapping: IntensityMapping) -> Self {
        Self {
            inner: Arc::new(SettingsInner {
                range_mode: AtomicU8::new(range_mode_code(range_mode)),
                mapping: AtomicU8::new(mapping_code(mapping)),
            }),
        }
    }

    /// Range mode drivers stamp on frames that carry no reliable range of their own
    pub fn range_mode(&self) -> RangeMode {
        match self.inner.range_mode.load(Ordering::Relaxed) {
            1 => RangeMode::Near,
            _ => RangeMode::Default,
        }
    }

    pub fn set_range_mode(&self, mode: RangeMode) {
        self.inner
            .range_mode
            .store(range_mode_code(mode), Ordering::Relaxed);
    }

    /// Reliable range for the current range mode
    pub fn reliable_range(&self) -> DepthRange {
        self.range_mode().range()
    }

    pub fn mapping(&self) -> IntensityMapping {
        match self.inner.mapping.load(Ordering::Relaxed) {
            1 => IntensityMapping::Normalized,
            _ => IntensityMapping::Absolute,
        }
    }

    pub fn set_mapping(&self, mapping: IntensityMapping) {
        self.inner
            .mapping
            .store(mapping_code(mapping), Ordering::Relaxed);
    }
}

impl Default for DepthSettings {
    fn default() -> Self {
        Self::new(RangeMode::default(), IntensityMapping::default())
    }
}

fn range_mode_code(mode: RangeMode) -> u8 {
    match mode {
        RangeMode::Default => 0,
        RangeMode::Near => 1,
    }
}

fn mapping_code(mapping: IntensityMapping) -> u8 {
    match mapping {
        IntensityMapping::Absolute => 0,
        IntensityMapping::Normalized => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_shared_between_clones() {
        let settings = DepthSettings::default();
        let reader = settings.clone();

        settings.set_range_mode(RangeMode::Near);
        settings.set_mapping(IntensityMapping::Normalized);

        assert_eq!(reader.range_mode(), RangeMode::Near);
        assert_eq!(reader.reliable_range(), DepthRange::NEAR);
        assert_eq!(reader.mapping(), IntensityMapping::Normalized);
    }
}
