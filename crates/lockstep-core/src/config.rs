//! The recognized configuration surface of an execution.

use lockstep_types::{Duration, Error, Result, TimePoint};
use serde::{Deserialize, Serialize};

fn default_factor_target() -> f64 {
    1.0
}

fn default_steps_to_monitor() -> u32 {
    5
}

/// Real-time pacing options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealTimeSettings {
    /// Whether the simulation is paced against the wall clock.
    #[serde(default)]
    pub enabled: bool,
    /// Target real-time factor; must be positive.
    #[serde(default = "default_factor_target")]
    pub factor_target: f64,
    /// Number of steps per rolling-average measurement window.
    #[serde(default = "default_steps_to_monitor")]
    pub steps_to_monitor: u32,
}

impl Default for RealTimeSettings {
    fn default() -> Self {
        RealTimeSettings {
            enabled: false,
            factor_target: default_factor_target(),
            steps_to_monitor: default_steps_to_monitor(),
        }
    }
}

/// Configuration for an execution with the fixed-step algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// The logical time at which the simulation starts.
    #[serde(default)]
    pub start_time: TimePoint,
    /// The logical time at which the simulation ends, if bounded.
    #[serde(default)]
    pub stop_time: Option<TimePoint>,
    /// The base macro step size. Required and positive.
    pub base_step_size: Duration,
    /// The number of worker threads for the parallel stepping phase.
    /// Defaults to the hardware concurrency.
    #[serde(default)]
    pub worker_thread_count: Option<u32>,
    /// Real-time pacing options.
    #[serde(default)]
    pub real_time: RealTimeSettings,
}

impl ExecutionConfig {
    /// Creates a configuration with the given base step size and defaults
    /// for everything else.
    pub fn new(base_step_size: Duration) -> Self {
        ExecutionConfig {
            start_time: TimePoint::ZERO,
            stop_time: None,
            base_step_size,
            worker_thread_count: None,
            real_time: RealTimeSettings::default(),
        }
    }

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if !self.base_step_size.is_positive() {
            return Err(Error::logic("base_step_size must be positive"));
        }
        if let Some(stop) = self.stop_time {
            if stop < self.start_time {
                return Err(Error::logic("stop_time must not precede start_time"));
            }
        }
        if !(self.real_time.factor_target > 0.0) {
            return Err(Error::logic("real_time.factor_target must be positive"));
        }
        if self.real_time.steps_to_monitor < 1 {
            return Err(Error::logic("real_time.steps_to_monitor must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: ExecutionConfig =
            serde_json::from_str(r#"{"base_step_size": 100000000}"#).unwrap();
        assert_eq!(config.start_time, TimePoint::ZERO);
        assert_eq!(config.stop_time, None);
        assert_eq!(config.base_step_size, Duration::from_seconds(0.1));
        assert_eq!(config.worker_thread_count, None);
        assert!(!config.real_time.enabled);
        assert_eq!(config.real_time.factor_target, 1.0);
        assert_eq!(config.real_time.steps_to_monitor, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        let mut config = ExecutionConfig::new(Duration::from_seconds(0.1));
        config.validate().unwrap();

        config.base_step_size = Duration::ZERO;
        assert!(config.validate().is_err());

        config.base_step_size = Duration::from_seconds(0.1);
        config.real_time.factor_target = 0.0;
        assert!(config.validate().is_err());

        config.real_time.factor_target = 1.0;
        config.stop_time = Some(TimePoint::from_seconds(-1.0));
        assert!(config.validate().is_err());
    }
}
