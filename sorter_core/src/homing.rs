//! Sensor-gated homing: drive to the reflectance marker and define it as
//! position zero.
//!
//! Implemented as a cooperative step function with its own micro-state, so it
//! never blocks the sequencer loop: the sequencer suppresses the periodic
//! controller (`enabled = false`), then calls `step()` once per iteration
//! until the routine reports `Homed` or `TimedOut`.

use sorter_traits::{Direction, Encoder, MotorDriver};

use crate::axis::Axis;
use crate::config::HomingCfg;
use crate::error::Result;

/// Internal phase of the homing procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    /// Armed; the first `step()` decides between short-circuit and search.
    Idle,
    /// Driving toward the reference at the fixed search duty.
    Searching,
    /// Reference found; axis zeroed.
    Complete,
    /// Search window elapsed without a detection.
    TimedOut,
}

/// Result of a single homing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingStatus {
    InProgress,
    /// Position, setpoint, and controller state are zeroed; actuation is
    /// stopped.
    Homed,
    /// Actuation is stopped; the caller decides between a bounded retry and
    /// a terminal fault.
    TimedOut,
}

#[derive(Debug)]
pub struct Homing {
    cfg: HomingCfg,
    phase: HomingPhase,
    started_ms: u64,
    direction: Direction,
}

impl Homing {
    pub fn new(cfg: HomingCfg) -> Self {
        Self {
            cfg,
            phase: HomingPhase::Idle,
            started_ms: 0,
            direction: Direction::Reverse,
        }
    }

    pub fn cfg(&self) -> &HomingCfg {
        &self.cfg
    }

    pub fn phase(&self) -> HomingPhase {
        self.phase
    }

    /// Arm (or re-arm) the routine. The next `step()` starts a fresh search.
    pub fn begin(&mut self) {
        self.phase = HomingPhase::Idle;
    }

    /// Advance the routine by one poll. The caller supplies the current
    /// sensor reading and the timestamp; actuation goes through the axis
    /// handle directly, bypassing the suspended position loop.
    pub fn step<E: Encoder, M: MotorDriver>(
        &mut self,
        now_ms: u64,
        sensor: u16,
        axis: &Axis<E, M>,
    ) -> Result<HomingStatus> {
        match self.phase {
            HomingPhase::Idle => {
                if sensor >= self.cfg.sensor_threshold {
                    // Already on the marker: zero in place, no motion.
                    axis.halt()?;
                    axis.zero()?;
                    self.phase = HomingPhase::Complete;
                    tracing::info!(sensor, "homing: reference pre-detected, zeroed in place");
                    return Ok(HomingStatus::Homed);
                }
                axis.halt()?;
                // Search toward zero: the sign of the dead-reckoned position
                // resolves which physical direction shortens the distance to
                // the marker. At exactly zero with no detection, reverse.
                self.direction = if axis.shared().position() < 0 {
                    Direction::Forward
                } else {
                    Direction::Reverse
                };
                axis.drive_direct(self.direction, self.cfg.search_duty)?;
                self.started_ms = now_ms;
                self.phase = HomingPhase::Searching;
                tracing::info!(
                    direction = ?self.direction,
                    duty = self.cfg.search_duty,
                    "homing: searching for reference"
                );
                Ok(HomingStatus::InProgress)
            }
            HomingPhase::Searching => {
                if sensor >= self.cfg.sensor_threshold {
                    axis.halt()?;
                    axis.zero()?;
                    self.phase = HomingPhase::Complete;
                    tracing::info!(
                        sensor,
                        elapsed_ms = now_ms.saturating_sub(self.started_ms),
                        "homing: reference detected, zeroed"
                    );
                    return Ok(HomingStatus::Homed);
                }
                if now_ms.saturating_sub(self.started_ms) >= self.cfg.timeout_ms {
                    axis.halt()?;
                    self.phase = HomingPhase::TimedOut;
                    tracing::warn!(timeout_ms = self.cfg.timeout_ms, "homing: search timed out");
                    return Ok(HomingStatus::TimedOut);
                }
                // Re-issue the search command: a control tick that raced the
                // suspension may have overwritten it once.
                axis.drive_direct(self.direction, self.cfg.search_duty)?;
                Ok(HomingStatus::InProgress)
            }
            HomingPhase::Complete => Ok(HomingStatus::Homed),
            HomingPhase::TimedOut => Ok(HomingStatus::TimedOut),
        }
    }
}
