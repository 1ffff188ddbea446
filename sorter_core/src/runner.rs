//! Orchestration: the strictly periodic control task and the free-running
//! sequencer loop.
//!
//! The control task runs on its own thread at a fixed cadence measured from
//! absolute wake times, so scheduling drift never accumulates. It performs no
//! blocking I/O inside a tick. While the homing routine owns actuation
//! (`enabled == false`) the task keeps publishing feedback but issues no
//! motor commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sorter_traits::clock::Clock;
use sorter_traits::{Encoder, MotorDriver, Sensor};

use crate::axis::Axis;
use crate::controller::PositionController;
use crate::error::{Report, Result};
use crate::sequencer::Sequencer;
use crate::status::CycleStatus;
use crate::util::velocity_cps;
use eyre::WrapErr;

/// Handle to the periodic control task; signals shutdown and joins on drop.
pub struct ControlTask {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ControlTask {
    /// Ask the task to stop after its current tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for ControlTask {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "control task panicked during shutdown");
        }
    }
}

/// Spawn the fixed-period position loop on a dedicated thread.
pub fn spawn_control_loop<E, M, C>(
    axis: Axis<E, M>,
    mut controller: PositionController,
    clock: C,
) -> ControlTask
where
    E: Encoder + Send + 'static,
    M: MotorDriver + Send + 'static,
    C: Clock + Send + Sync + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let period_ms = controller.cfg().period_ms;
    let period = Duration::from_millis(period_ms);

    let join_handle = std::thread::spawn(move || {
        let mut deadline = clock.now() + period;
        let mut last_position: Option<i64> = None;

        loop {
            if shutdown_clone.load(Ordering::Relaxed) {
                break;
            }

            match axis.read_position() {
                Ok(position) => {
                    let shared = axis.shared();
                    if shared.take_reset_request() {
                        controller.reset();
                        // The zeroing event also invalidated the delta base.
                        last_position = None;
                    }
                    let velocity = last_position
                        .map(|prev| velocity_cps(position - prev, period_ms))
                        .unwrap_or(0);
                    last_position = Some(position);

                    let setpoint = shared.setpoint();
                    shared.publish_feedback(
                        position,
                        velocity,
                        controller.arrived(setpoint - position),
                    );

                    if shared.enabled() {
                        let duty_limit = shared.duty_limit();
                        let mut motor = axis.lock_motor();
                        if let Err(e) =
                            controller.tick(setpoint, position, duty_limit, &mut *motor)
                        {
                            tracing::warn!(error = %e, "control tick failed");
                        }
                    }
                }
                Err(e) => {
                    // Hold the last command; feedback is simply stale for
                    // one period.
                    tracing::warn!(error = %e, "encoder read failed; skipping tick");
                }
            }

            // Absolute-deadline pacing.
            clock.sleep_until(deadline);
            deadline += period;
            let now = clock.now();
            if deadline <= now {
                let mut skipped = 0u32;
                while deadline <= now {
                    deadline += period;
                    skipped += 1;
                }
                tracing::warn!(skipped, "control loop overran its period; realigned");
            }
        }

        if let Err(e) = axis.halt() {
            tracing::warn!(error = %e, "failed to stop motor on control task exit");
        }
        tracing::trace!("control task exiting cleanly");
    });

    ControlTask {
        shutdown,
        join_handle: Some(join_handle),
    }
}

/// Outcome of a `run` invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Completed cycles.
    pub cycles: u32,
    /// True when the run ended on the shutdown flag rather than completion.
    pub interrupted: bool,
}

/// Drive the sequencer until `cycles` cycles complete, a fault occurs, or
/// `shutdown` is raised. `poll` paces the free-running loop; it must stay in
/// the low-millisecond range so homing's sensor polling stays responsive.
pub fn run<E, M, S>(
    sequencer: &mut Sequencer<E, M, S>,
    cycles: u32,
    poll: Duration,
    clock: &(dyn Clock + Send + Sync),
    shutdown: &AtomicBool,
) -> Result<RunSummary>
where
    E: Encoder,
    M: MotorDriver,
    S: Sensor,
{
    let mut done = 0u32;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            sequencer.halt().wrap_err("halt on shutdown")?;
            tracing::info!(cycles = done, "run interrupted");
            return Ok(RunSummary {
                cycles: done,
                interrupted: true,
            });
        }

        match sequencer.step()? {
            CycleStatus::Running => clock.sleep(poll),
            CycleStatus::Complete => {
                done += 1;
                tracing::info!(done, "cycle complete");
                if done >= cycles {
                    return Ok(RunSummary {
                        cycles: done,
                        interrupted: false,
                    });
                }
            }
            CycleStatus::Faulted(e) => {
                let _ = sequencer.halt();
                tracing::error!(error = %e, "sequence faulted");
                return Err(Report::new(e)).wrap_err("sequence faulted");
            }
        }
    }
}
