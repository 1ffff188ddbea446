//! Runtime configuration for the motion core.
//!
//! These are the structs the controller, homing routine, and sequencer are
//! constructed with. They are separate from the TOML-deserialized schema in
//! `sorter_config`; `conversions` maps between the two.

/// Position-loop tuning. All gains and bounds are named calibration
/// constants: tests verify convergence and boundedness, not specific values.
#[derive(Debug, Clone)]
pub struct ControlCfg {
    /// Proportional gain (duty per count of error).
    pub kp: f32,
    /// Integral gain (duty per accumulated count).
    pub ki: f32,
    /// Fixed control period in milliseconds; not reconfigurable at runtime.
    pub period_ms: u64,
    /// Error magnitude treated as zero. Guarantees a true zero-duty hold at
    /// the setpoint instead of an audible buzz.
    pub deadband_counts: i64,
    /// Anti-windup bound: the integral accumulator stays in ±this.
    pub integral_clamp: f32,
    /// Static-friction floor. Nonzero commands below this stall the
    /// mechanism short of target, so they are raised to it.
    pub min_duty: u16,
    /// Hard duty ceiling.
    pub max_duty: u16,
    /// Fixed bias added to reverse-direction magnitudes to compensate
    /// mechanical asymmetry.
    pub reverse_bias: u16,
    /// "Close enough to proceed" band for the sequencer; looser than the
    /// deadband (e.g. 25 counts vs 2).
    pub arrival_tolerance_counts: i64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.5,
            period_ms: 100,
            deadband_counts: 2,
            integral_clamp: 300.0,
            min_duty: 400,
            max_duty: 1400,
            reverse_bias: 120,
            arrival_tolerance_counts: 25,
        }
    }
}

/// Sensor-gated homing parameters.
#[derive(Debug, Clone)]
pub struct HomingCfg {
    /// Analog level at which the reference marker counts as detected.
    pub sensor_threshold: u16,
    /// Fixed duty while searching for the reference.
    pub search_duty: u16,
    /// Abandon the search after this long.
    pub timeout_ms: u64,
    /// Bounded retries before the sequencer faults. Never retried silently.
    pub retries: u8,
}

impl Default for HomingCfg {
    fn default() -> Self {
        Self {
            sensor_threshold: 2000,
            search_duty: 600,
            timeout_ms: 4_000,
            retries: 1,
        }
    }
}

/// Cycle choreography. Step k of the sweep targets `±(span_counts·k)/steps`.
#[derive(Debug, Clone)]
pub struct SequenceCfg {
    /// Number of equal sub-steps in the sweep.
    pub steps: u32,
    /// Total sweep span in encoder counts.
    pub span_counts: i64,
    /// Sweep direction: true = positive counts.
    pub sweep_forward: bool,
    /// Measurement-station position for the sort cycle.
    pub measure_counts: i64,
    /// Analog level at or above which an object is accepted.
    pub decide_threshold: u16,
    /// Bin index (1..=steps) for accepted objects.
    pub accept_bin: u32,
    /// Bin index (1..=steps) for rejected objects.
    pub reject_bin: u32,
    /// Minimum dwell after a setpoint is issued before arrival may advance
    /// the state; filters transient pass-through samples.
    pub dwell_min_ms: u64,
    /// Safety timeout that unconditionally ends a stuck Seeking/Returning.
    pub seek_timeout_ms: u64,
    /// Dwelling advances once the sensor falls below this (object removed);
    /// 0 selects the timed variant.
    pub removal_threshold: u16,
    /// Dwelling (timed variant): operator-visible pause.
    pub pause_ms: u64,
    /// Coarse proximity band around zero where Returning hands over to the
    /// sensor-based homing; looser than the arrival tolerance.
    pub return_band_counts: i64,
    /// Lower duty ceiling while returning, to avoid overshooting the marker.
    pub return_duty_max: u16,
}

impl Default for SequenceCfg {
    fn default() -> Self {
        Self {
            steps: 8,
            span_counts: 408,
            sweep_forward: true,
            measure_counts: 204,
            decide_threshold: 2600,
            accept_bin: 3,
            reject_bin: 6,
            dwell_min_ms: 1_000,
            seek_timeout_ms: 2_000,
            removal_threshold: 0,
            pause_ms: 5_000,
            return_band_counts: 150,
            return_duty_max: 700,
        }
    }
}

/// Status display pacing.
#[derive(Debug, Clone)]
pub struct DisplayCfg {
    /// Minimum interval between sink refreshes. Floored at 100 ms by the
    /// display task so the transport is never saturated.
    pub min_refresh_ms: u64,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self { min_refresh_ms: 150 }
    }
}
