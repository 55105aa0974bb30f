//! Scheduler configuration

use crate::error::{AnimationError, Result};
use serde::{Deserialize, Serialize};

/// Heartbeat configuration
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Ticks per second
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: f32,
}

fn default_tick_rate() -> f32 {
    30.0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick_rate(mut self, hz: f32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// Reject non-positive or non-finite rates
    pub fn validate(&self) -> Result<()> {
        validate_tick_rate(self.tick_rate_hz)
    }

    /// Whole milliseconds between ticks, never less than one
    pub fn frame_duration_ms(&self) -> f64 {
        frame_duration_ms(self.tick_rate_hz)
    }
}

pub(crate) fn validate_tick_rate(hz: f32) -> Result<()> {
    if hz.is_finite() && hz > 0.0 {
        Ok(())
    } else {
        Err(AnimationError::InvalidTickRate(hz))
    }
}

pub(crate) fn frame_duration_ms(hz: f32) -> f64 {
    (1000.0 / hz as f64).floor().max(1.0)
}
