//! Mapping from the TOML schema (`sorter_config`) into runtime config types.

use crate::config::{ControlCfg, DisplayCfg, HomingCfg, SequenceCfg};

impl From<&sorter_config::ControlCfg> for ControlCfg {
    fn from(c: &sorter_config::ControlCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            period_ms: c.period_ms,
            deadband_counts: c.deadband_counts,
            integral_clamp: c.integral_clamp,
            min_duty: c.min_duty,
            max_duty: c.max_duty,
            reverse_bias: c.reverse_bias,
            arrival_tolerance_counts: c.arrival_tolerance_counts,
        }
    }
}

impl From<&sorter_config::HomingCfg> for HomingCfg {
    fn from(c: &sorter_config::HomingCfg) -> Self {
        Self {
            sensor_threshold: c.sensor_threshold,
            search_duty: c.search_duty,
            timeout_ms: c.timeout_ms,
            retries: c.retries,
        }
    }
}

impl From<&sorter_config::SequenceCfg> for SequenceCfg {
    fn from(c: &sorter_config::SequenceCfg) -> Self {
        Self {
            steps: c.steps,
            span_counts: c.span_counts,
            sweep_forward: c.sweep_forward,
            measure_counts: c.measure_counts,
            decide_threshold: c.decide_threshold,
            accept_bin: c.accept_bin,
            reject_bin: c.reject_bin,
            dwell_min_ms: c.dwell_min_ms,
            seek_timeout_ms: c.seek_timeout_ms,
            removal_threshold: c.removal_threshold,
            pause_ms: c.pause_ms,
            return_band_counts: c.return_band_counts,
            return_duty_max: c.return_duty_max,
        }
    }
}

impl From<&sorter_config::DisplayCfg> for DisplayCfg {
    fn from(c: &sorter_config::DisplayCfg) -> Self {
        Self {
            min_refresh_ms: c.min_refresh_ms,
        }
    }
}
