//! Fixed-period PI position controller.
//!
//! Runs once per control period, independent of the sequencer's loop rate,
//! converting (setpoint, measured position) into a (direction, duty) command.
//! The deadband guarantees a true zero-duty hold at rest; the integral clamp
//! prevents windup; the kickstart floor keeps small corrections from stalling
//! against static friction.

use sorter_traits::{DUTY_MAX, Direction, MotorDriver};

use crate::config::ControlCfg;
use crate::error::{Result, classify_hw_error};
use crate::util::duty_percent;
use eyre::WrapErr;

/// Outcome of one control tick, for feedback publishing and tests.
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    /// Raw position error (setpoint − position), before the deadband.
    pub error: i64,
    /// Duty actually applied.
    pub duty: u16,
    pub direction: Direction,
    /// `|error| < arrival_tolerance_counts`, the looser band the sequencer
    /// keys transitions on.
    pub arrived: bool,
}

pub struct PositionController {
    cfg: ControlCfg,
    integral: f32,
    last_setpoint: i64,
    last_duty: u16,
}

impl core::fmt::Debug for PositionController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PositionController")
            .field("integral", &self.integral)
            .field("last_setpoint", &self.last_setpoint)
            .field("last_duty", &self.last_duty)
            .finish()
    }
}

impl PositionController {
    pub fn new(cfg: ControlCfg) -> Self {
        Self {
            cfg,
            integral: 0.0,
            last_setpoint: 0,
            last_duty: 0,
        }
    }

    pub fn cfg(&self) -> &ControlCfg {
        &self.cfg
    }

    /// Clear accumulated state. Called on setpoint changes and when the
    /// homing routine hands back a freshly zeroed axis.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_duty = 0;
    }

    /// Integral accumulator (bounded to ±integral_clamp); exposed for tests.
    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// The sequencer's "close enough to proceed" predicate.
    #[inline]
    pub fn arrived(&self, error: i64) -> bool {
        error.abs() < self.cfg.arrival_tolerance_counts
    }

    /// One control tick: compute and apply the actuation command.
    pub fn tick<M: MotorDriver>(
        &mut self,
        setpoint: i64,
        position: i64,
        duty_limit: u16,
        motor: &mut M,
    ) -> Result<TickReport> {
        if setpoint != self.last_setpoint {
            self.integral = 0.0;
            self.last_setpoint = setpoint;
        }

        let raw_error = setpoint - position;

        // Deadband: hold a true zero, and keep the integral flushed until
        // the error leaves the band again.
        let error = if raw_error.abs() <= self.cfg.deadband_counts {
            self.integral = 0.0;
            0
        } else {
            raw_error
        };

        if error != 0 {
            self.integral += error as f32;
        }
        // Anti-windup clamp, applied every tick regardless of deadband state.
        self.integral = self
            .integral
            .clamp(-self.cfg.integral_clamp, self.cfg.integral_clamp);

        let command = error as f32 * self.cfg.kp + self.integral * self.cfg.ki;

        // Sign selects the direction line; magnitude is the duty candidate.
        let direction = if command >= 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        let mut duty = command.abs() as u32;

        // Reverse runs against the mechanism's heavy side.
        if direction == Direction::Reverse && error != 0 {
            duty += u32::from(self.cfg.reverse_bias);
        }

        // Kickstart: below this, static friction wins and the axis stalls
        // short of target.
        if error != 0 && duty < u32::from(self.cfg.min_duty) {
            duty = u32::from(self.cfg.min_duty);
        }

        // Phase-dependent ceiling (the sequencer lowers it while returning).
        let ceiling = self.cfg.max_duty.min(duty_limit).min(DUTY_MAX);
        duty = duty.min(u32::from(ceiling));

        // Zero-command override: a true stop, not just "small command".
        if error == 0 {
            duty = 0;
        }
        let duty = duty as u16;

        motor
            .drive(direction, duty)
            .map_err(|e| eyre::Report::new(classify_hw_error(&*e)))
            .wrap_err("motor drive")?;
        self.last_duty = duty;

        let arrived = self.arrived(raw_error);
        tracing::trace!(
            error = raw_error,
            duty,
            pct = duty_percent(duty),
            ?direction,
            arrived,
            "control tick"
        );

        Ok(TickReport {
            error: raw_error,
            duty,
            direction,
            arrived,
        })
    }
}
