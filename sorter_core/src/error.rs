use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AxisError {
    #[error("homing timeout: reference marker not detected")]
    HomingTimeout,
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("sensor reading out of range: {0}")]
    SensorOutOfRange(u16),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing encoder")]
    MissingEncoder,
    #[error("missing motor")]
    MissingMotor,
    #[error("missing sensor")]
    MissingSensor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Classify a boxed hardware error into a typed `AxisError`. Timeouts are
/// distinguished from faults so the sequencer can report them separately;
/// everything else keeps its message.
pub fn classify_hw_error(e: &(dyn std::error::Error + 'static)) -> AxisError {
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        AxisError::HardwareFault(s)
    } else {
        AxisError::Hardware(s)
    }
}
