//! Builder for the boxed, ready-to-run assembly.
//!
//! Encoder, motor, and sensor are mandatory; the type-state markers make a
//! `build()` without them a compile error, and `try_build()` reports the
//! missing piece as a typed `BuildError` for dynamically assembled callers.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use sorter_traits::clock::{Clock, MonotonicClock};
use sorter_traits::{DUTY_MAX, Encoder, MotorDriver, Sensor, StatusSink};

use crate::axis::Axis;
use crate::config::{ControlCfg, DisplayCfg, HomingCfg, SequenceCfg};
use crate::controller::PositionController;
use crate::display::{self, DisplayTask, StatusFrame};
use crate::error::{AxisError, BuildError, Result};
use crate::homing::Homing;
use crate::runner::{self, RunSummary, spawn_control_loop};
use crate::sequencer::Sequencer;
use crate::shared::SharedAxis;

pub type BoxedEncoder = Box<dyn Encoder + Send>;
pub type BoxedMotor = Box<dyn MotorDriver + Send>;
pub type BoxedSensor = Box<dyn Sensor + Send>;
pub type BoxedSink = Box<dyn StatusSink + Send>;
type RenderFn = Box<dyn Fn(&StatusFrame) -> (String, String) + Send>;

/// The assembled rig. `run` spawns the periodic control task, drives cycles
/// to completion, and tears the task down before returning.
pub struct Sorter {
    axis: Axis<BoxedEncoder, BoxedMotor>,
    controller: Option<PositionController>,
    sequencer: Sequencer<BoxedEncoder, BoxedMotor, BoxedSensor>,
    clock: Arc<dyn Clock + Send + Sync>,
    poll: Duration,
    // Held for its Drop: joins the sink thread at teardown.
    _display: Option<DisplayTask>,
}

impl Sorter {
    pub fn builder() -> SorterBuilder<Missing, Missing, Missing> {
        SorterBuilder::default()
    }

    pub fn shared(&self) -> &SharedAxis {
        self.axis.shared()
    }

    pub fn sequencer(&self) -> &Sequencer<BoxedEncoder, BoxedMotor, BoxedSensor> {
        &self.sequencer
    }

    /// Run up to `cycles` full cycles. One-shot: the controller moves into
    /// the control task for the duration of the run.
    pub fn run(&mut self, cycles: u32, shutdown: &AtomicBool) -> Result<RunSummary> {
        let controller = self.controller.take().ok_or_else(|| {
            eyre::Report::new(AxisError::State("run may only be invoked once".into()))
        })?;
        let control_task = spawn_control_loop(self.axis.clone(), controller, self.clock.clone());
        let result = runner::run(
            &mut self.sequencer,
            cycles,
            self.poll,
            self.clock.as_ref(),
            shutdown,
        );
        control_task.stop();
        drop(control_task);
        result
    }
}

// Type-state markers.
pub struct Missing;
pub struct Set;

pub struct SorterBuilder<E, M, S> {
    encoder: Option<BoxedEncoder>,
    motor: Option<BoxedMotor>,
    sensor: Option<BoxedSensor>,
    control: Option<ControlCfg>,
    homing: Option<HomingCfg>,
    sequence: Option<SequenceCfg>,
    display_cfg: Option<DisplayCfg>,
    display: Option<(BoxedSink, RenderFn)>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    poll_ms: Option<u64>,
    _e: PhantomData<E>,
    _m: PhantomData<M>,
    _s: PhantomData<S>,
}

impl Default for SorterBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            encoder: None,
            motor: None,
            sensor: None,
            control: None,
            homing: None,
            sequence: None,
            display_cfg: None,
            display: None,
            clock: None,
            poll_ms: None,
            _e: PhantomData,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<E, M, S> SorterBuilder<E, M, S> {
    pub fn with_control(mut self, cfg: ControlCfg) -> Self {
        self.control = Some(cfg);
        self
    }
    pub fn with_homing(mut self, cfg: HomingCfg) -> Self {
        self.homing = Some(cfg);
        self
    }
    pub fn with_sequence(mut self, cfg: SequenceCfg) -> Self {
        self.sequence = Some(cfg);
        self
    }
    pub fn with_display_cfg(mut self, cfg: DisplayCfg) -> Self {
        self.display_cfg = Some(cfg);
        self
    }
    /// Attach a status display and its renderer.
    pub fn with_display<D, R>(mut self, sink: D, render: R) -> Self
    where
        D: StatusSink + Send + 'static,
        R: Fn(&StatusFrame) -> (String, String) + Send + 'static,
    {
        self.display = Some((Box::new(sink), Box::new(render)));
        self
    }
    /// Custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    /// Sequencer loop pacing; defaults to 5 ms.
    pub fn with_poll_ms(mut self, ms: u64) -> Self {
        self.poll_ms = Some(ms);
        self
    }

    /// Fallible build in any type-state; reports missing pieces as typed
    /// `BuildError`s.
    pub fn try_build(self) -> Result<Sorter> {
        let SorterBuilder {
            encoder,
            motor,
            sensor,
            control,
            homing,
            sequence,
            display_cfg,
            display,
            clock,
            poll_ms,
            _e: _,
            _m: _,
            _s: _,
        } = self;

        let encoder = encoder.ok_or_else(|| eyre::Report::new(BuildError::MissingEncoder))?;
        let motor = motor.ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;
        let sensor = sensor.ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;

        let control = control.unwrap_or_default();
        let homing = homing.unwrap_or_default();
        let sequence = sequence.unwrap_or_default();
        let display_cfg = display_cfg.unwrap_or_default();

        validate(&control, &homing, &sequence)?;

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let poll = Duration::from_millis(poll_ms.unwrap_or(5).max(1));

        let shared = Arc::new(SharedAxis::new(control.max_duty));
        let axis = Axis::new(encoder, motor, shared);
        let controller = PositionController::new(control);
        let mut sequencer = Sequencer::new(
            sequence,
            Homing::new(homing),
            axis.clone(),
            sensor,
            clock.clone(),
        );

        let display_task = display.map(|(sink, render)| {
            let (publisher, task) = display::spawn(sink, &display_cfg, clock.clone(), render);
            sequencer.set_status_publisher(publisher);
            task
        });

        Ok(Sorter {
            axis,
            controller: Some(controller),
            sequencer,
            clock,
            poll,
            _display: display_task,
        })
    }
}

fn validate(control: &ControlCfg, homing: &HomingCfg, sequence: &SequenceCfg) -> Result<()> {
    let invalid = |msg: &'static str| eyre::Report::new(BuildError::InvalidConfig(msg));

    if control.period_ms == 0 {
        return Err(invalid("period_ms must be >= 1"));
    }
    if !(control.kp.is_finite() && control.kp > 0.0) {
        return Err(invalid("kp must be finite and > 0"));
    }
    if !(control.ki.is_finite() && control.ki >= 0.0) {
        return Err(invalid("ki must be finite and >= 0"));
    }
    if control.deadband_counts < 0 {
        return Err(invalid("deadband_counts must be >= 0"));
    }
    if !(control.integral_clamp.is_finite() && control.integral_clamp > 0.0) {
        return Err(invalid("integral_clamp must be finite and > 0"));
    }
    if control.max_duty == 0 || control.max_duty > DUTY_MAX {
        return Err(invalid("max_duty must be in 1..=DUTY_MAX"));
    }
    if control.min_duty > control.max_duty {
        return Err(invalid("min_duty must not exceed max_duty"));
    }
    if control.arrival_tolerance_counts <= control.deadband_counts {
        return Err(invalid("arrival tolerance must exceed the deadband"));
    }
    if homing.search_duty == 0 || homing.search_duty > control.max_duty {
        return Err(invalid("search_duty must be in 1..=max_duty"));
    }
    if homing.sensor_threshold == 0 {
        return Err(invalid("sensor_threshold must be > 0"));
    }
    if homing.timeout_ms == 0 {
        return Err(invalid("homing timeout_ms must be >= 1"));
    }
    if sequence.steps == 0 {
        return Err(invalid("steps must be >= 1"));
    }
    if sequence.span_counts <= 0 {
        return Err(invalid("span_counts must be > 0"));
    }
    if sequence.accept_bin == 0 || sequence.accept_bin > sequence.steps {
        return Err(invalid("accept_bin must be in 1..=steps"));
    }
    if sequence.reject_bin == 0 || sequence.reject_bin > sequence.steps {
        return Err(invalid("reject_bin must be in 1..=steps"));
    }
    if sequence.seek_timeout_ms <= sequence.dwell_min_ms {
        return Err(invalid("seek_timeout_ms must exceed dwell_min_ms"));
    }
    if sequence.return_band_counts < control.arrival_tolerance_counts {
        return Err(invalid("return_band_counts must cover the arrival tolerance"));
    }
    if sequence.return_duty_max == 0 || sequence.return_duty_max > control.max_duty {
        return Err(invalid("return_duty_max must be in 1..=max_duty"));
    }
    Ok(())
}

// Setters that advance type-state when providing mandatory components.
impl<M, S> SorterBuilder<Missing, M, S> {
    pub fn with_encoder(self, encoder: impl Encoder + Send + 'static) -> SorterBuilder<Set, M, S> {
        let SorterBuilder {
            encoder: _,
            motor,
            sensor,
            control,
            homing,
            sequence,
            display_cfg,
            display,
            clock,
            poll_ms,
            _e: _,
            _m: _,
            _s: _,
        } = self;
        SorterBuilder {
            encoder: Some(Box::new(encoder)),
            motor,
            sensor,
            control,
            homing,
            sequence,
            display_cfg,
            display,
            clock,
            poll_ms,
            _e: PhantomData,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<E, S> SorterBuilder<E, Missing, S> {
    pub fn with_motor(self, motor: impl MotorDriver + Send + 'static) -> SorterBuilder<E, Set, S> {
        let SorterBuilder {
            encoder,
            motor: _,
            sensor,
            control,
            homing,
            sequence,
            display_cfg,
            display,
            clock,
            poll_ms,
            _e: _,
            _m: _,
            _s: _,
        } = self;
        SorterBuilder {
            encoder,
            motor: Some(Box::new(motor)),
            sensor,
            control,
            homing,
            sequence,
            display_cfg,
            display,
            clock,
            poll_ms,
            _e: PhantomData,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<E, M> SorterBuilder<E, M, Missing> {
    pub fn with_sensor(self, sensor: impl Sensor + Send + 'static) -> SorterBuilder<E, M, Set> {
        let SorterBuilder {
            encoder,
            motor,
            sensor: _,
            control,
            homing,
            sequence,
            display_cfg,
            display,
            clock,
            poll_ms,
            _e: _,
            _m: _,
            _s: _,
        } = self;
        SorterBuilder {
            encoder,
            motor,
            sensor: Some(Box::new(sensor)),
            control,
            homing,
            sequence,
            display_cfg,
            display,
            clock,
            poll_ms,
            _e: PhantomData,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

impl SorterBuilder<Set, Set, Set> {
    /// Validate and build. Only available once encoder, motor, and sensor
    /// are all provided.
    pub fn build(self) -> Result<Sorter> {
        self.try_build()
    }
}
