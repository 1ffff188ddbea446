//! Cycle status returned from each sequencer iteration.

use crate::error::AxisError;

/// Public status of a single step of the sequencer loop.
#[derive(Debug)]
pub enum CycleStatus {
    /// Keep going; the cycle has not finished.
    Running,
    /// A full cycle finished: homed back at the reference, idle again.
    Complete,
    /// Terminal fault; actuation has been stopped. Operator intervention
    /// is required (e.g. homing never found the reference).
    Faulted(AxisError),
}
