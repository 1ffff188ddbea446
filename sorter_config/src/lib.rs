#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the sorting axis.
//!
//! `Config` and sub-structs are deserialized from TOML and validated before
//! anything touches hardware. The structs here are the serialization surface;
//! `sorter_core::conversions` maps them into the runtime config types.

use serde::Deserialize;

/// Pin assignments for the Raspberry Pi hardware build. Ignored by the
/// simulator. `dir_active_high` resolves the direction-pin polarity that
/// differs between driver board revisions.
#[derive(Debug, Deserialize)]
pub struct Pins {
    /// SPI chip-select for the quadrature counter.
    pub encoder_cs: u8,
    /// PWM channel (0 or 1) feeding the motor driver.
    pub motor_pwm_channel: u8,
    /// GPIO for the motor direction line.
    pub motor_dir: u8,
    /// Direction-line polarity: true = high means forward.
    #[serde(default = "default_true")]
    pub dir_active_high: bool,
    /// SPI chip-select for the reflectance-sensor ADC.
    pub adc_cs: u8,
    /// ADC channel the sensor is wired to.
    #[serde(default)]
    pub adc_channel: u8,
    /// GPIOs for the two operator buttons (input pull-up, active low).
    pub button1: u8,
    pub button2: u8,
}

fn default_true() -> bool {
    true
}

/// Closed-loop position controller tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlCfg {
    /// Proportional gain (duty per count of error).
    pub kp: f32,
    /// Integral gain (duty per accumulated count).
    pub ki: f32,
    /// Fixed control period in milliseconds.
    pub period_ms: u64,
    /// Error band treated as zero; guarantees a true zero-duty hold at rest.
    pub deadband_counts: i64,
    /// Anti-windup bound on the integral accumulator.
    pub integral_clamp: f32,
    /// Static-friction floor: nonzero commands below this are raised to it.
    pub min_duty: u16,
    /// Hard duty ceiling.
    pub max_duty: u16,
    /// Extra duty added in reverse to compensate mechanical asymmetry.
    pub reverse_bias: u16,
    /// "Close enough to proceed" band used by the sequencer; looser than
    /// the deadband.
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
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HomingCfg {
    /// Analog level at which the reference marker counts as detected.
    pub sensor_threshold: u16,
    /// Fixed duty used while searching for the reference.
    pub search_duty: u16,
    /// Give up after this long without a detection.
    pub timeout_ms: u64,
    /// Bounded retries before the sequencer faults.
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

/// Choreography of a sorting/sweep cycle.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SequenceCfg {
    /// Number of equal sub-steps the sweep divides the span into.
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
    /// Minimum dwell after issuing a setpoint before arrival may advance.
    pub dwell_min_ms: u64,
    /// Safety timeout ending a stuck Seeking/Returning state.
    pub seek_timeout_ms: u64,
    /// Dwelling: advance once the sensor falls below this level (object
    /// removed). 0 selects the timed variant instead.
    pub removal_threshold: u16,
    /// Dwelling (timed variant): operator-visible pause.
    pub pause_ms: u64,
    /// Coarse proximity band around zero that hands Returning over to homing.
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
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayCfg {
    /// Minimum interval between refreshes; floored at 100 ms so the I2C
    /// transport is never saturated.
    pub min_refresh_ms: u64,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self { min_refresh_ms: 150 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    /// Path to a log file (JSON lines); stderr only when absent.
    pub file: Option<String>,
    /// "error" | "warn" | "info" | "debug" | "trace"
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub homing: HomingCfg,
    #[serde(default)]
    pub sequence: SequenceCfg,
    #[serde(default)]
    pub display: DisplayCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.kp <= 0.0 || !self.control.kp.is_finite() {
            eyre::bail!("control.kp must be finite and > 0");
        }
        if self.control.ki < 0.0 || !self.control.ki.is_finite() {
            eyre::bail!("control.ki must be finite and >= 0");
        }
        if self.control.period_ms == 0 {
            eyre::bail!("control.period_ms must be >= 1");
        }
        if self.control.period_ms > 1_000 {
            eyre::bail!("control.period_ms is unreasonably large (>1s)");
        }
        if self.control.deadband_counts < 0 {
            eyre::bail!("control.deadband_counts must be >= 0");
        }
        if self.control.integral_clamp <= 0.0 || !self.control.integral_clamp.is_finite() {
            eyre::bail!("control.integral_clamp must be finite and > 0");
        }
        if self.control.max_duty == 0 || self.control.max_duty > 2047 {
            eyre::bail!("control.max_duty must be in 1..=2047");
        }
        if self.control.min_duty > self.control.max_duty {
            eyre::bail!("control.min_duty must not exceed control.max_duty");
        }
        if self.control.arrival_tolerance_counts <= self.control.deadband_counts {
            eyre::bail!("control.arrival_tolerance_counts must exceed the deadband");
        }

        // Homing
        if self.homing.sensor_threshold == 0 || self.homing.sensor_threshold > 4095 {
            eyre::bail!("homing.sensor_threshold must be in 1..=4095");
        }
        if self.homing.search_duty == 0 || self.homing.search_duty > self.control.max_duty {
            eyre::bail!("homing.search_duty must be in 1..=control.max_duty");
        }
        if self.homing.timeout_ms == 0 {
            eyre::bail!("homing.timeout_ms must be >= 1");
        }

        // Sequence
        if self.sequence.steps == 0 {
            eyre::bail!("sequence.steps must be >= 1");
        }
        if self.sequence.span_counts <= 0 {
            eyre::bail!("sequence.span_counts must be > 0");
        }
        if self.sequence.accept_bin == 0 || self.sequence.accept_bin > self.sequence.steps {
            eyre::bail!("sequence.accept_bin must be in 1..=sequence.steps");
        }
        if self.sequence.reject_bin == 0 || self.sequence.reject_bin > self.sequence.steps {
            eyre::bail!("sequence.reject_bin must be in 1..=sequence.steps");
        }
        if self.sequence.seek_timeout_ms <= self.sequence.dwell_min_ms {
            eyre::bail!("sequence.seek_timeout_ms must exceed sequence.dwell_min_ms");
        }
        if self.sequence.return_band_counts < self.control.arrival_tolerance_counts {
            eyre::bail!("sequence.return_band_counts must be at least the arrival tolerance");
        }
        if self.sequence.return_duty_max == 0
            || self.sequence.return_duty_max > self.control.max_duty
        {
            eyre::bail!("sequence.return_duty_max must be in 1..=control.max_duty");
        }
        if self.sequence.decide_threshold > 4095 || self.sequence.removal_threshold > 4095 {
            eyre::bail!("sequence thresholds must be <= 4095");
        }

        // Display
        if self.display.min_refresh_ms < 100 {
            eyre::bail!("display.min_refresh_ms must be >= 100 (transport saturation)");
        }

        Ok(())
    }
}
