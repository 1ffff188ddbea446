//! Shared control state between the periodic control task and the sequencer.
//!
//! Every field is a word-sized atomic, so cross-task reads can never observe
//! a torn value. The sequencer writes setpoint/duty-limit/enabled; the
//! control task writes the feedback side (position, velocity, arrived).
//! Relaxed ordering is sufficient: each word is independent telemetry or a
//! command level, never a release handshake for other memory.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

#[derive(Debug)]
pub struct SharedAxis {
    setpoint: AtomicI64,
    position: AtomicI64,
    velocity_cps: AtomicI64,
    /// Phase-dependent duty ceiling (stores a u16).
    duty_limit: AtomicU32,
    /// Normal ceiling restored after phases that lower the limit.
    duty_limit_default: u32,
    /// False while the homing routine owns actuation; the periodic task
    /// still publishes feedback but issues no motor commands.
    enabled: AtomicBool,
    arrived: AtomicBool,
    homed: AtomicBool,
    reset_pending: AtomicBool,
}

impl SharedAxis {
    /// New shared state. Starts disabled and un-homed: setpoints are not
    /// meaningful until the first homing completes.
    pub fn new(max_duty: u16) -> Self {
        Self {
            setpoint: AtomicI64::new(0),
            position: AtomicI64::new(0),
            velocity_cps: AtomicI64::new(0),
            duty_limit: AtomicU32::new(u32::from(max_duty)),
            duty_limit_default: u32::from(max_duty),
            enabled: AtomicBool::new(false),
            arrived: AtomicBool::new(false),
            homed: AtomicBool::new(false),
            reset_pending: AtomicBool::new(false),
        }
    }

    /// Issue a new setpoint. Clears `arrived` so the sequencer cannot act on
    /// feedback from the previous target before the next control tick.
    pub fn set_setpoint(&self, counts: i64) {
        self.setpoint.store(counts, Ordering::Relaxed);
        self.arrived.store(false, Ordering::Relaxed);
    }

    pub fn setpoint(&self) -> i64 {
        self.setpoint.load(Ordering::Relaxed)
    }

    /// Control-task side: publish one tick's feedback.
    pub fn publish_feedback(&self, position: i64, velocity_cps: i64, arrived: bool) {
        self.position.store(position, Ordering::Relaxed);
        self.velocity_cps.store(velocity_cps, Ordering::Relaxed);
        self.arrived.store(arrived, Ordering::Relaxed);
    }

    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn velocity_cps(&self) -> i64 {
        self.velocity_cps.load(Ordering::Relaxed)
    }

    pub fn arrived(&self) -> bool {
        self.arrived.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_duty_limit(&self, duty: u16) {
        self.duty_limit.store(u32::from(duty), Ordering::Relaxed);
    }

    /// Restore the ceiling configured at construction.
    pub fn restore_duty_limit(&self) {
        self.duty_limit.store(self.duty_limit_default, Ordering::Relaxed);
    }

    pub fn duty_limit(&self) -> u16 {
        self.duty_limit.load(Ordering::Relaxed) as u16
    }

    pub fn set_homed(&self, on: bool) {
        self.homed.store(on, Ordering::Relaxed);
    }

    pub fn homed(&self) -> bool {
        self.homed.load(Ordering::Relaxed)
    }

    /// Ask the control task to clear the controller's accumulated state
    /// before its next tick (consumed exactly once).
    pub fn request_controller_reset(&self) {
        self.reset_pending.store(true, Ordering::Relaxed);
    }

    /// Control-task side: take a pending reset request, if any.
    pub fn take_reset_request(&self) -> bool {
        self.reset_pending.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disabled_and_unhomed() {
        let s = SharedAxis::new(1400);
        assert!(!s.enabled());
        assert!(!s.homed());
        assert_eq!(s.duty_limit(), 1400);
    }

    #[test]
    fn new_setpoint_clears_arrived() {
        let s = SharedAxis::new(1400);
        s.publish_feedback(51, 0, true);
        assert!(s.arrived());
        s.set_setpoint(102);
        assert!(!s.arrived());
        assert_eq!(s.setpoint(), 102);
    }

    #[test]
    fn reset_request_is_consumed_once() {
        let s = SharedAxis::new(1400);
        assert!(!s.take_reset_request());
        s.request_controller_reset();
        assert!(s.take_reset_request());
        assert!(!s.take_reset_request());
    }

    #[test]
    fn duty_limit_lowers_and_restores() {
        let s = SharedAxis::new(1400);
        s.set_duty_limit(700);
        assert_eq!(s.duty_limit(), 700);
        s.restore_duty_limit();
        assert_eq!(s.duty_limit(), 1400);
    }
}
