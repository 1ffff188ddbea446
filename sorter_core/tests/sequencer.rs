use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sorter_core::{
    Axis, CycleStatus, Goal, Homing, HomingCfg, Resume, SeqState, SequenceCfg, Sequencer,
    SharedAxis,
};
use sorter_traits::clock::TestClock;
use sorter_traits::{Button, ButtonState, Direction, Encoder, MotorDriver, Sensor};

#[derive(Clone)]
struct StubEncoder(Arc<AtomicI64>);

impl Encoder for StubEncoder {
    fn read(&mut self) -> Result<i64, Box<dyn Error + Send + Sync>> {
        Ok(self.0.load(Ordering::Relaxed))
    }
    fn reset(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.0.store(0, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SpyMotor {
    commands: Arc<Mutex<Vec<(Direction, u16)>>>,
}

impl SpyMotor {
    fn last(&self) -> Option<(Direction, u16)> {
        self.commands.lock().unwrap().last().copied()
    }
}

impl MotorDriver for SpyMotor {
    fn drive(&mut self, direction: Direction, duty: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.commands.lock().unwrap().push((direction, duty));
        Ok(())
    }
}

/// Operator panel: settable analog level plus two latched buttons.
#[derive(Clone, Default)]
struct Panel {
    analog: Arc<AtomicU32>,
    press1: Arc<AtomicBool>,
    press2: Arc<AtomicBool>,
}

impl Panel {
    fn set_analog(&self, v: u16) {
        self.analog.store(u32::from(v), Ordering::Relaxed);
    }
}

impl Sensor for Panel {
    fn read_analog(&mut self) -> Result<u16, Box<dyn Error + Send + Sync>> {
        Ok(self.analog.load(Ordering::Relaxed) as u16)
    }
    fn read_button(&mut self, button: Button) -> Result<ButtonState, Box<dyn Error + Send + Sync>> {
        let held = match button {
            Button::One => self.press1.load(Ordering::Relaxed),
            Button::Two => self.press2.load(Ordering::Relaxed),
        };
        Ok(if held {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        })
    }
}

struct Rig {
    seq: Sequencer<StubEncoder, SpyMotor, Panel>,
    shared: Arc<SharedAxis>,
    panel: Panel,
    clock: TestClock,
    motor: SpyMotor,
}

impl Rig {
    fn new(cfg: SequenceCfg, homing: HomingCfg) -> Self {
        let counter = Arc::new(AtomicI64::new(0));
        let motor = SpyMotor::default();
        let panel = Panel::default();
        let shared = Arc::new(SharedAxis::new(1400));
        let axis = Axis::new(StubEncoder(counter), motor.clone(), shared.clone());
        let clock = TestClock::new();
        let seq = Sequencer::new(
            cfg,
            Homing::new(homing),
            axis,
            panel.clone(),
            Arc::new(clock.clone()),
        );
        Self {
            seq,
            shared,
            panel,
            clock,
            motor,
        }
    }

    fn advance(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    /// Trigger a cycle and complete the initial homing with the marker
    /// pre-detected, landing in the first profile state.
    fn start_cycle(&mut self, button: Button) {
        match button {
            Button::One => self.panel.press1.store(true, Ordering::Relaxed),
            Button::Two => self.panel.press2.store(true, Ordering::Relaxed),
        }
        self.seq.step().unwrap();
        self.panel.press1.store(false, Ordering::Relaxed);
        self.panel.press2.store(false, Ordering::Relaxed);
        assert!(matches!(self.seq.state(), SeqState::Homing { .. }));

        self.panel.set_analog(3_000);
        self.seq.step().unwrap();
        self.panel.set_analog(0);
    }
}

fn cfg() -> SequenceCfg {
    SequenceCfg::default()
}

#[test]
fn trigger_starts_homing_then_first_sweep_step() {
    let mut rig = Rig::new(cfg(), HomingCfg::default());
    assert!(matches!(rig.seq.state(), SeqState::Idle));

    // No trigger: stays idle, controller never enabled before first homing.
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Idle));
    assert!(!rig.shared.enabled());

    rig.panel.press1.store(true, Ordering::Relaxed);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Homing {
            attempt: 0,
            resume: Resume::Sweep
        }
    ));
    assert!(!rig.shared.enabled());

    // Marker pre-detected: homing short-circuits, the position loop resumes,
    // and the first sub-step of an 8-step 408-count sweep is 51.
    rig.panel.set_analog(3_000);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::SweepStep(1),
            ..
        }
    ));
    assert_eq!(rig.shared.setpoint(), 51);
    assert!(rig.shared.enabled());
    assert!(rig.shared.homed());
}

#[test]
fn step_targets_divide_the_span_evenly() {
    let rig = Rig::new(cfg(), HomingCfg::default());
    assert_eq!(rig.seq.step_target(1), 51);
    assert_eq!(rig.seq.step_target(4), 204);
    assert_eq!(rig.seq.step_target(8), 408);

    let reversed = Rig::new(
        SequenceCfg {
            sweep_forward: false,
            ..cfg()
        },
        HomingCfg::default(),
    );
    assert_eq!(reversed.seq.step_target(1), -51);
}

#[test]
fn arrival_before_minimum_dwell_does_not_advance() {
    let mut rig = Rig::new(cfg(), HomingCfg::default());
    rig.start_cycle(Button::One);
    assert_eq!(rig.shared.setpoint(), 51);

    // Arrived at t = 0.9 s; dwell minimum is 1.0 s.
    rig.shared.publish_feedback(51, 0, true);
    rig.advance(900);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::SweepStep(1),
            ..
        }
    ));

    // At t = 1.0 s the transition fires.
    rig.advance(100);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::SweepStep(2),
            ..
        }
    ));
    assert_eq!(rig.shared.setpoint(), 102);
}

#[test]
fn safety_timeout_fires_without_arrival() {
    let mut rig = Rig::new(cfg(), HomingCfg::default());
    rig.start_cycle(Button::One);

    // Never arrives; the 2.0 s safety timeout still moves the cycle on.
    rig.advance(1_999);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::SweepStep(1),
            ..
        }
    ));
    rig.advance(1);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::SweepStep(2),
            ..
        }
    ));
}

#[test]
fn sort_cycle_measures_then_branches_on_the_sensor() {
    let mut rig = Rig::new(cfg(), HomingCfg::default());
    rig.start_cycle(Button::Two);
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::Measure,
            ..
        }
    ));
    assert_eq!(rig.shared.setpoint(), 204);

    rig.shared.publish_feedback(204, 0, true);
    rig.advance(1_000);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Deciding));

    // Reflective object: accepted into bin 3 → 408·3/8 = 153.
    rig.panel.set_analog(3_000);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::Bin(3),
            ..
        }
    ));
    assert_eq!(rig.shared.setpoint(), 153);
}

#[test]
fn dull_object_goes_to_the_reject_bin() {
    let mut rig = Rig::new(cfg(), HomingCfg::default());
    rig.start_cycle(Button::Two);
    rig.shared.publish_feedback(204, 0, true);
    rig.advance(1_000);
    rig.seq.step().unwrap();

    rig.panel.set_analog(1_000);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Seeking {
            goal: Goal::Bin(6),
            ..
        }
    ));
    assert_eq!(rig.shared.setpoint(), 306);
}

#[test]
fn removal_gated_dwell_waits_for_the_object_to_leave() {
    let mut rig = Rig::new(
        SequenceCfg {
            removal_threshold: 1_200,
            ..cfg()
        },
        HomingCfg::default(),
    );
    rig.start_cycle(Button::Two);
    rig.shared.publish_feedback(204, 0, true);
    rig.advance(1_000);
    rig.seq.step().unwrap(); // -> Deciding
    rig.panel.set_analog(3_000);
    rig.seq.step().unwrap(); // -> Seeking(Bin 3)
    rig.shared.publish_feedback(153, 0, true);
    rig.advance(1_000);
    rig.seq.step().unwrap(); // -> Dwelling
    assert!(matches!(rig.seq.state(), SeqState::Dwelling { .. }));

    // Object still present: keep holding.
    rig.panel.set_analog(2_000);
    rig.advance(10_000);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Dwelling { .. }));

    // Object removed: head home under the lowered ceiling.
    rig.panel.set_analog(800);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Returning { .. }));
    assert_eq!(rig.shared.setpoint(), 0);
    assert_eq!(rig.shared.duty_limit(), 700);
}

#[test]
fn timed_dwell_advances_after_the_pause() {
    let mut rig = Rig::new(cfg(), HomingCfg::default()); // removal_threshold = 0
    rig.start_cycle(Button::Two);
    rig.shared.publish_feedback(204, 0, true);
    rig.advance(1_000);
    rig.seq.step().unwrap();
    rig.panel.set_analog(3_000);
    rig.seq.step().unwrap();
    rig.shared.publish_feedback(153, 0, true);
    rig.advance(1_000);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Dwelling { .. }));

    rig.advance(4_999);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Dwelling { .. }));
    rig.advance(1);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Returning { .. }));
}

#[test]
fn full_sweep_cycle_returns_homes_and_completes() {
    let mut rig = Rig::new(
        SequenceCfg {
            steps: 2,
            dwell_min_ms: 0,
            accept_bin: 1,
            reject_bin: 2,
            ..cfg()
        },
        HomingCfg::default(),
    );
    rig.start_cycle(Button::One);
    assert_eq!(rig.shared.setpoint(), 204);

    rig.shared.publish_feedback(204, 0, true);
    rig.seq.step().unwrap();
    assert_eq!(rig.shared.setpoint(), 408);

    rig.shared.publish_feedback(408, 0, true);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Returning { .. }));
    assert_eq!(rig.shared.duty_limit(), 700);

    // Outside the proximity band: keep driving.
    rig.shared.publish_feedback(400, -50, false);
    rig.seq.step().unwrap();
    assert!(matches!(rig.seq.state(), SeqState::Returning { .. }));

    // Inside the 150-count band: dead reckoning is done, the sensor homing
    // finishes the job.
    rig.shared.publish_feedback(120, -50, false);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Homing {
            resume: Resume::Finish,
            ..
        }
    ));
    assert!(!rig.shared.enabled());

    rig.panel.set_analog(2_500);
    let status = rig.seq.step().unwrap();
    assert!(matches!(status, CycleStatus::Complete));
    assert!(matches!(rig.seq.state(), SeqState::Idle));
    assert_eq!(rig.shared.position(), 0);
    assert_eq!(rig.shared.duty_limit(), 1_400);
    assert!(rig.shared.enabled());
}

#[test]
fn homing_faults_after_bounded_retries() {
    let mut rig = Rig::new(cfg(), HomingCfg::default()); // retries = 1
    rig.panel.press1.store(true, Ordering::Relaxed);
    rig.seq.step().unwrap();
    rig.panel.press1.store(false, Ordering::Relaxed);

    // First attempt: search starts, then the window elapses.
    rig.seq.step().unwrap();
    rig.advance(4_000);
    rig.seq.step().unwrap();
    assert!(matches!(
        rig.seq.state(),
        SeqState::Homing { attempt: 1, .. }
    ));

    // Retry also times out: terminal fault, actuation stopped.
    rig.seq.step().unwrap();
    rig.advance(4_000);
    let status = rig.seq.step().unwrap();
    assert!(matches!(status, CycleStatus::Faulted(_)));
    assert!(matches!(rig.seq.state(), SeqState::Faulted(_)));
    assert_eq!(rig.motor.last(), Some((Direction::Forward, 0)));
    assert!(!rig.shared.enabled());

    // The fault is sticky.
    let status = rig.seq.step().unwrap();
    assert!(matches!(status, CycleStatus::Faulted(_)));
}
