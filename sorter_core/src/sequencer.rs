//! Cycle sequencer: a closed state machine that issues setpoints, waits on
//! arrival-or-timeout, and branches on sensor readings.
//!
//! Two cycle profiles share the machine. Button One starts the sweep cycle
//! (visit every sub-step of the span in order); button Two starts the sort
//! cycle (measure an object, pick a bin from the reflectance reading, deliver,
//! wait for removal). Both end by returning near zero and re-homing against
//! the sensor reference; dead-reckoned position is not trusted for true zero
//! after a full cycle.
//!
//! The transition function runs in the free-running loop and never blocks;
//! homing is driven cooperatively one poll per iteration.

use std::sync::Arc;
use std::time::Instant;

use sorter_traits::clock::Clock;
use sorter_traits::{ANALOG_MAX, Button, ButtonState, Encoder, MotorDriver, Sensor};

use crate::axis::Axis;
use crate::config::SequenceCfg;
use crate::display::{StatusFrame, StatusPublisher};
use crate::error::{AxisError, Result, classify_hw_error};
use crate::homing::{Homing, HomingStatus};
use crate::status::CycleStatus;
use eyre::WrapErr;

/// Motion goal of a Seeking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    /// Sort cycle: the measurement station.
    Measure,
    /// Sort cycle: deliver to bin k.
    Bin(u32),
    /// Sweep cycle: sub-step k of the span.
    SweepStep(u32),
}

/// What follows a successful homing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Sweep,
    Sort,
    /// End-of-cycle homing: back to Idle.
    Finish,
}

/// Terminal fault kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    HomingTimeout,
}

impl Fault {
    fn as_error(self) -> AxisError {
        match self {
            Fault::HomingTimeout => AxisError::HomingTimeout,
        }
    }
}

/// The sequencer's closed state type. Mutated only inside `step()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqState {
    /// Holding the home setpoint, waiting for an operator trigger.
    Idle,
    /// Cooperative homing in progress; the position loop is suspended.
    Homing { attempt: u8, resume: Resume },
    /// Moving to a goal; leaves on (arrived AND dwell) or the safety timeout.
    Seeking { goal: Goal, since_ms: u64 },
    /// One-shot sensor branch; no motion.
    Deciding,
    /// Holding position over a bin until the object is removed (or a fixed
    /// pause elapses, in the timed variant).
    Dwelling { since_ms: u64 },
    /// Heading back to zero under a lowered duty ceiling.
    Returning { since_ms: u64 },
    /// Terminal; operator intervention required.
    Faulted(Fault),
}

impl SeqState {
    /// Short display tag for the status line.
    pub fn tag(&self) -> &'static str {
        match self {
            SeqState::Idle => "IDLE",
            SeqState::Homing { .. } => "HOMING",
            SeqState::Seeking { .. } => "SEEK",
            SeqState::Deciding => "DECIDE",
            SeqState::Dwelling { .. } => "DWELL",
            SeqState::Returning { .. } => "RETURN",
            SeqState::Faulted(_) => "FAULT",
        }
    }
}

pub struct Sequencer<E: Encoder, M: MotorDriver, S: Sensor> {
    cfg: SequenceCfg,
    axis: Axis<E, M>,
    sensor: S,
    homing: Homing,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    state: SeqState,
    last_sensor: u16,
    prev_btn1: ButtonState,
    prev_btn2: ButtonState,
    status: Option<StatusPublisher>,
}

impl<E: Encoder, M: MotorDriver, S: Sensor> Sequencer<E, M, S> {
    pub fn new(
        cfg: SequenceCfg,
        homing: Homing,
        axis: Axis<E, M>,
        sensor: S,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let epoch = clock.now();
        Self {
            cfg,
            axis,
            sensor,
            homing,
            clock,
            epoch,
            state: SeqState::Idle,
            last_sensor: 0,
            prev_btn1: ButtonState::Released,
            prev_btn2: ButtonState::Released,
            status: None,
        }
    }

    /// Attach the display event channel.
    pub fn set_status_publisher(&mut self, publisher: StatusPublisher) {
        self.status = Some(publisher);
    }

    pub fn state(&self) -> &SeqState {
        &self.state
    }

    pub fn cfg(&self) -> &SequenceCfg {
        &self.cfg
    }

    /// Setpoint for sub-step k of the sweep: ±(span·k)/steps.
    pub fn step_target(&self, k: u32) -> i64 {
        let magnitude = self.cfg.span_counts * i64::from(k) / i64::from(self.cfg.steps.max(1));
        if self.cfg.sweep_forward { magnitude } else { -magnitude }
    }

    /// Stop actuation and suspend the position loop (shutdown path).
    pub fn halt(&mut self) -> Result<()> {
        self.axis.shared().set_enabled(false);
        self.axis.halt()
    }

    /// One iteration of the sequencer loop.
    pub fn step(&mut self) -> Result<CycleStatus> {
        let now_ms = self.clock.ms_since(self.epoch);

        let status = match self.state {
            SeqState::Idle => self.step_idle(now_ms)?,
            SeqState::Homing { attempt, resume } => self.step_homing(now_ms, attempt, resume)?,
            SeqState::Seeking { goal, since_ms } => self.step_seeking(now_ms, goal, since_ms),
            SeqState::Deciding => self.step_deciding(now_ms)?,
            SeqState::Dwelling { since_ms } => self.step_dwelling(now_ms, since_ms)?,
            SeqState::Returning { since_ms } => self.step_returning(now_ms, since_ms),
            SeqState::Faulted(fault) => CycleStatus::Faulted(fault.as_error()),
        };

        self.publish_status();
        Ok(status)
    }

    // ── Per-state steps ──────────────────────────────────────────────────

    fn step_idle(&mut self, now_ms: u64) -> Result<CycleStatus> {
        let btn1 = self.read_button(Button::One)?;
        let btn2 = self.read_button(Button::Two)?;
        let rising1 = btn1 == ButtonState::Pressed && self.prev_btn1 == ButtonState::Released;
        let rising2 = btn2 == ButtonState::Pressed && self.prev_btn2 == ButtonState::Released;
        self.prev_btn1 = btn1;
        self.prev_btn2 = btn2;

        if rising1 {
            self.enter_homing(Resume::Sweep, now_ms);
        } else if rising2 {
            self.enter_homing(Resume::Sort, now_ms);
        }
        Ok(CycleStatus::Running)
    }

    fn step_homing(&mut self, now_ms: u64, attempt: u8, resume: Resume) -> Result<CycleStatus> {
        let sensor = self.read_analog()?;
        match self.homing.step(now_ms, sensor, &self.axis)? {
            HomingStatus::InProgress => Ok(CycleStatus::Running),
            HomingStatus::Homed => {
                self.axis.shared().restore_duty_limit();
                self.axis.shared().set_enabled(true);
                match resume {
                    Resume::Sweep => {
                        self.enter_seek(Goal::SweepStep(1), now_ms);
                        Ok(CycleStatus::Running)
                    }
                    Resume::Sort => {
                        self.enter_seek(Goal::Measure, now_ms);
                        Ok(CycleStatus::Running)
                    }
                    Resume::Finish => {
                        self.state = SeqState::Idle;
                        tracing::info!("cycle complete: homed at reference");
                        Ok(CycleStatus::Complete)
                    }
                }
            }
            HomingStatus::TimedOut => {
                if attempt < self.homing.cfg().retries {
                    tracing::warn!(
                        attempt = attempt + 1,
                        retries = self.homing.cfg().retries,
                        "homing timed out; retrying"
                    );
                    self.homing.begin();
                    self.state = SeqState::Homing {
                        attempt: attempt + 1,
                        resume,
                    };
                    Ok(CycleStatus::Running)
                } else {
                    let fault = Fault::HomingTimeout;
                    self.axis.halt()?;
                    self.state = SeqState::Faulted(fault);
                    tracing::error!("homing failed after bounded retries; faulting");
                    Ok(CycleStatus::Faulted(fault.as_error()))
                }
            }
        }
    }

    fn step_seeking(&mut self, now_ms: u64, goal: Goal, since_ms: u64) -> CycleStatus {
        let elapsed = now_ms.saturating_sub(since_ms);
        let arrived = self.axis.shared().arrived();

        if arrived && elapsed >= self.cfg.dwell_min_ms {
            self.advance_from_seek(goal, now_ms);
        } else if elapsed >= self.cfg.seek_timeout_ms {
            // Not an error: arrival never latched (jam, unreachable target,
            // or tuning), so the safety timeout moves the cycle along.
            tracing::warn!(
                ?goal,
                elapsed_ms = elapsed,
                position = self.axis.shared().position(),
                "seek timeout; advancing without arrival"
            );
            self.advance_from_seek(goal, now_ms);
        }
        CycleStatus::Running
    }

    fn step_deciding(&mut self, now_ms: u64) -> Result<CycleStatus> {
        let value = self.read_analog()?;
        let bin = if value >= self.cfg.decide_threshold {
            self.cfg.accept_bin
        } else {
            self.cfg.reject_bin
        };
        tracing::info!(
            value,
            threshold = self.cfg.decide_threshold,
            bin,
            "decided destination bin"
        );
        self.enter_seek(Goal::Bin(bin), now_ms);
        Ok(CycleStatus::Running)
    }

    fn step_dwelling(&mut self, now_ms: u64, since_ms: u64) -> Result<CycleStatus> {
        let done = if self.cfg.removal_threshold > 0 {
            // Removal-gated variant: wait for the object to leave the bin.
            let value = self.read_analog()?;
            value < self.cfg.removal_threshold
        } else {
            now_ms.saturating_sub(since_ms) >= self.cfg.pause_ms
        };
        if done {
            self.enter_returning(now_ms);
        }
        Ok(CycleStatus::Running)
    }

    fn step_returning(&mut self, now_ms: u64, since_ms: u64) -> CycleStatus {
        let position = self.axis.shared().position();
        let elapsed = now_ms.saturating_sub(since_ms);

        if position.abs() <= self.cfg.return_band_counts {
            self.enter_homing(Resume::Finish, now_ms);
        } else if elapsed >= self.cfg.seek_timeout_ms {
            // Hand over to the sensor search anyway; it either finds the
            // reference within its own timeout or faults explicitly.
            tracing::warn!(
                position,
                elapsed_ms = elapsed,
                "return timeout; handing over to homing"
            );
            self.enter_homing(Resume::Finish, now_ms);
        }
        CycleStatus::Running
    }

    // ── Transitions ──────────────────────────────────────────────────────

    fn enter_homing(&mut self, resume: Resume, _now_ms: u64) {
        self.axis.shared().set_enabled(false);
        self.homing.begin();
        self.state = SeqState::Homing { attempt: 0, resume };
        tracing::info!(?resume, "entering homing");
    }

    fn enter_seek(&mut self, goal: Goal, now_ms: u64) {
        let target = match goal {
            Goal::Measure => self.cfg.measure_counts,
            Goal::Bin(k) | Goal::SweepStep(k) => self.step_target(k),
        };
        self.axis.shared().set_setpoint(target);
        self.state = SeqState::Seeking {
            goal,
            since_ms: now_ms,
        };
        tracing::info!(?goal, target, "seek");
    }

    fn enter_returning(&mut self, now_ms: u64) {
        self.axis.shared().set_duty_limit(self.cfg.return_duty_max);
        self.axis.shared().set_setpoint(0);
        self.state = SeqState::Returning { since_ms: now_ms };
        tracing::info!(ceiling = self.cfg.return_duty_max, "returning to zero");
    }

    fn advance_from_seek(&mut self, goal: Goal, now_ms: u64) {
        match goal {
            Goal::SweepStep(k) if k < self.cfg.steps => {
                self.enter_seek(Goal::SweepStep(k + 1), now_ms);
            }
            Goal::SweepStep(_) => self.enter_returning(now_ms),
            Goal::Measure => {
                self.state = SeqState::Deciding;
            }
            Goal::Bin(_) => {
                self.state = SeqState::Dwelling { since_ms: now_ms };
            }
        }
    }

    // ── I/O helpers ──────────────────────────────────────────────────────

    fn read_analog(&mut self) -> Result<u16> {
        let value = self
            .sensor
            .read_analog()
            .map_err(|e| eyre::Report::new(classify_hw_error(&*e)))
            .wrap_err("sensor read")?;
        if value > ANALOG_MAX {
            // Taken at face value; no fabricated correction.
            tracing::warn!(value, "sensor reading out of expected range");
        }
        self.last_sensor = value;
        Ok(value)
    }

    fn read_button(&mut self, button: Button) -> Result<ButtonState> {
        self.sensor
            .read_button(button)
            .map_err(|e| eyre::Report::new(classify_hw_error(&*e)))
            .wrap_err("button read")
    }

    fn publish_status(&mut self) {
        if let Some(publisher) = &self.status {
            let shared = self.axis.shared();
            publisher.publish(StatusFrame {
                state: self.state.tag(),
                setpoint: shared.setpoint(),
                position: shared.position(),
                sensor: self.last_sensor,
                fault: matches!(self.state, SeqState::Faulted(_)),
            });
        }
    }
}
