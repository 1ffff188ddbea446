//! Clone-able handle to one physical axis: encoder + motor behind mutexes,
//! plus the shared control state.
//!
//! Exactly one of the two schedules commands the motor at any time: the
//! periodic controller while `enabled`, the homing routine while not. The
//! mutexes make that handover safe; the `enabled` flag makes it exclusive.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use sorter_traits::{Direction, Encoder, MotorDriver};

use crate::error::{Result, classify_hw_error};
use crate::shared::SharedAxis;
use eyre::WrapErr;

pub struct Axis<E: Encoder, M: MotorDriver> {
    encoder: Arc<Mutex<E>>,
    motor: Arc<Mutex<M>>,
    shared: Arc<SharedAxis>,
}

impl<E: Encoder, M: MotorDriver> Clone for Axis<E, M> {
    fn clone(&self) -> Self {
        Self {
            encoder: Arc::clone(&self.encoder),
            motor: Arc::clone(&self.motor),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Encoder, M: MotorDriver> Axis<E, M> {
    pub fn new(encoder: E, motor: M, shared: Arc<SharedAxis>) -> Self {
        Self {
            encoder: Arc::new(Mutex::new(encoder)),
            motor: Arc::new(Mutex::new(motor)),
            shared,
        }
    }

    pub fn shared(&self) -> &SharedAxis {
        &self.shared
    }

    /// Read the raw encoder count.
    pub fn read_position(&self) -> Result<i64> {
        self.encoder
            .lock()
            .read()
            .map_err(|e| eyre::Report::new(classify_hw_error(&*e)))
            .wrap_err("encoder read")
    }

    /// Lock the motor for a controller tick.
    pub(crate) fn lock_motor(&self) -> MutexGuard<'_, M> {
        self.motor.lock()
    }

    /// Direct actuation, bypassing the position loop. Only the homing routine
    /// uses this, and only while `enabled` is false.
    pub fn drive_direct(&self, direction: Direction, duty: u16) -> Result<()> {
        self.motor
            .lock()
            .drive(direction, duty)
            .map_err(|e| eyre::Report::new(classify_hw_error(&*e)))
            .wrap_err("direct drive")
    }

    /// Stop actuation. Duty 0 is the driver's only stop primitive.
    pub fn halt(&self) -> Result<()> {
        self.drive_direct(Direction::Forward, 0)
    }

    /// Define the current physical position as zero: reset the encoder,
    /// zero the setpoint, publish zeroed feedback, and schedule a controller
    /// reset. This is the single controlled event after which the position
    /// count is meaningful.
    pub fn zero(&self) -> Result<()> {
        self.encoder
            .lock()
            .reset()
            .map_err(|e| eyre::Report::new(classify_hw_error(&*e)))
            .wrap_err("encoder reset")?;
        self.shared.set_setpoint(0);
        self.shared.publish_feedback(0, 0, true);
        self.shared.request_controller_reset();
        self.shared.set_homed(true);
        Ok(())
    }
}
