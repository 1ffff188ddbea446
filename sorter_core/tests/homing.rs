use std::error::Error;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use sorter_core::{Axis, Homing, HomingCfg, HomingPhase, HomingStatus, SharedAxis};
use sorter_traits::{Direction, Encoder, MotorDriver};

/// Encoder backed by a shared counter; reset zeroes it.
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
    fn max_duty_seen(&self) -> u16 {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, d)| *d)
            .max()
            .unwrap_or(0)
    }
}

impl MotorDriver for SpyMotor {
    fn drive(&mut self, direction: Direction, duty: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.commands.lock().unwrap().push((direction, duty));
        Ok(())
    }
}

fn rig(position: i64) -> (Axis<StubEncoder, SpyMotor>, SpyMotor, Arc<AtomicI64>) {
    let counter = Arc::new(AtomicI64::new(position));
    let motor = SpyMotor::default();
    let shared = Arc::new(SharedAxis::new(1400));
    shared.publish_feedback(position, 0, false);
    let axis = Axis::new(StubEncoder(counter.clone()), motor.clone(), shared);
    (axis, motor, counter)
}

fn cfg() -> HomingCfg {
    HomingCfg::default()
}

#[test]
fn pre_detected_reference_succeeds_without_motion() {
    let (axis, motor, counter) = rig(0);
    let mut homing = Homing::new(cfg());
    homing.begin();

    let status = homing.step(0, 3_000, &axis).unwrap();
    assert_eq!(status, HomingStatus::Homed);
    assert_eq!(homing.phase(), HomingPhase::Complete);

    // No nonzero duty was ever issued.
    assert_eq!(motor.max_duty_seen(), 0);
    assert_eq!(counter.load(Ordering::Relaxed), 0);
    assert_eq!(axis.shared().position(), 0);
    assert_eq!(axis.shared().setpoint(), 0);
    assert!(axis.shared().homed());
}

#[test]
fn search_drives_toward_zero_from_positive_position() {
    let (axis, motor, _) = rig(500);
    let mut homing = Homing::new(cfg());
    homing.begin();

    let status = homing.step(0, 100, &axis).unwrap();
    assert_eq!(status, HomingStatus::InProgress);
    assert_eq!(motor.last(), Some((Direction::Reverse, cfg().search_duty)));
}

#[test]
fn search_drives_toward_zero_from_negative_position() {
    let (axis, motor, _) = rig(-500);
    let mut homing = Homing::new(cfg());
    homing.begin();

    homing.step(0, 100, &axis).unwrap();
    assert_eq!(motor.last(), Some((Direction::Forward, cfg().search_duty)));
}

#[test]
fn detection_mid_search_zeroes_and_stops() {
    let (axis, motor, counter) = rig(500);
    let mut homing = Homing::new(cfg());
    homing.begin();

    assert_eq!(homing.step(0, 100, &axis).unwrap(), HomingStatus::InProgress);
    // Axis physically drifts toward the marker.
    counter.store(40, Ordering::Relaxed);

    let status = homing.step(850, 2_500, &axis).unwrap();
    assert_eq!(status, HomingStatus::Homed);
    assert_eq!(motor.last(), Some((Direction::Forward, 0)));
    assert_eq!(counter.load(Ordering::Relaxed), 0);
    assert_eq!(axis.shared().setpoint(), 0);
    // The controller is told to flush its accumulated state.
    assert!(axis.shared().take_reset_request());
}

#[test]
fn times_out_within_one_poll_of_the_window() {
    let (axis, motor, _) = rig(500);
    let timeout = cfg().timeout_ms;
    let mut homing = Homing::new(cfg());
    homing.begin();

    assert_eq!(homing.step(0, 100, &axis).unwrap(), HomingStatus::InProgress);
    assert_eq!(
        homing.step(timeout - 1, 100, &axis).unwrap(),
        HomingStatus::InProgress
    );
    assert_eq!(
        homing.step(timeout, 100, &axis).unwrap(),
        HomingStatus::TimedOut
    );
    // Actuation left stopped.
    assert_eq!(motor.last(), Some((Direction::Forward, 0)));
    // The outcome is stable until re-armed.
    assert_eq!(
        homing.step(timeout + 500, 3_000, &axis).unwrap(),
        HomingStatus::TimedOut
    );
}

#[test]
fn rearming_after_timeout_starts_a_fresh_search() {
    let (axis, motor, _) = rig(500);
    let timeout = cfg().timeout_ms;
    let mut homing = Homing::new(cfg());
    homing.begin();

    homing.step(0, 100, &axis).unwrap();
    homing.step(timeout, 100, &axis).unwrap();
    assert_eq!(homing.phase(), HomingPhase::TimedOut);

    homing.begin();
    let status = homing.step(timeout + 10, 100, &axis).unwrap();
    assert_eq!(status, HomingStatus::InProgress);
    assert_eq!(motor.last(), Some((Direction::Reverse, cfg().search_duty)));
    // And the new window is honored from the re-arm time.
    assert_eq!(
        homing.step(timeout + 10 + cfg().timeout_ms, 100, &axis).unwrap(),
        HomingStatus::TimedOut
    );
}
