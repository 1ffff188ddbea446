//! Operator-facing status: a latest-wins event channel feeding a dedicated
//! sink thread.
//!
//! The sequencer publishes a `StatusFrame` whenever it steps; publishing
//! never blocks, surplus frames are dropped, and the thread drains to the
//! newest pending frame before rendering. The sink thread owns
//! the `StatusSink`, renders through a caller-supplied function, and refreshes
//! at a bounded rate (never faster than 100 ms) so a slow transport cannot
//! back-pressure the control side.
//!
//! The thread shuts down when the task handle drops or every publisher is
//! gone.

use crossbeam_channel as xch;
use sorter_traits::StatusSink;
use sorter_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::DisplayCfg;

/// Transport floor: refresh no faster than this regardless of config.
const MIN_REFRESH_FLOOR_MS: u64 = 100;

/// Snapshot of operator-relevant state, one per sequencer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFrame {
    /// Short state tag ("IDLE", "SEEK", ...).
    pub state: &'static str,
    pub setpoint: i64,
    pub position: i64,
    pub sensor: u16,
    pub fault: bool,
}

/// Sending side. Clone freely; publishing is wait-free for the caller.
#[derive(Clone)]
pub struct StatusPublisher {
    tx: xch::Sender<StatusFrame>,
}

impl StatusPublisher {
    /// Never blocks. A full slot means the display thread has a pending
    /// frame at most one step old; this one is simply dropped and the next
    /// publish refreshes the slot. A missing consumer drops it too.
    pub fn publish(&self, frame: StatusFrame) {
        let _ = self.tx.try_send(frame);
    }
}

/// Owns the sink thread; joins it on drop.
pub struct DisplayTask {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

/// Spawn the display thread. `render` turns a frame into the two display
/// lines; rendering stays the collaborator's concern.
pub fn spawn<D, C, R>(mut sink: D, cfg: &DisplayCfg, clock: C, render: R) -> (StatusPublisher, DisplayTask)
where
    D: StatusSink + Send + 'static,
    C: Clock + Send + Sync + 'static,
    R: Fn(&StatusFrame) -> (String, String) + Send + 'static,
{
    // Capacity 1: the channel is a mailbox for the latest frame only.
    let (tx, rx) = xch::bounded::<StatusFrame>(1);
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let refresh = Duration::from_millis(cfg.min_refresh_ms.max(MIN_REFRESH_FLOOR_MS));

    let join_handle = std::thread::spawn(move || {
        let mut last_shown: Option<StatusFrame> = None;
        loop {
            if shutdown_clone.load(Ordering::Relaxed) {
                break;
            }
            match rx.recv_timeout(refresh) {
                Ok(mut frame) => {
                    // Drain to the newest frame before rendering.
                    while let Ok(newer) = rx.try_recv() {
                        frame = newer;
                    }
                    if last_shown.as_ref() != Some(&frame) {
                        let (top, bottom) = render(&frame);
                        if let Err(e) = sink.show(&top, &bottom) {
                            tracing::warn!(error = %e, "status sink refresh failed");
                        }
                        last_shown = Some(frame);
                    }
                    // Enforce the refresh floor before accepting more work.
                    clock.sleep(refresh);
                }
                Err(xch::RecvTimeoutError::Timeout) => continue,
                Err(xch::RecvTimeoutError::Disconnected) => {
                    tracing::debug!("status publishers dropped; display thread exiting");
                    break;
                }
            }
        }
        tracing::trace!("display thread exiting cleanly");
    });

    (
        StatusPublisher { tx },
        DisplayTask {
            shutdown,
            join_handle: Some(join_handle),
        },
    )
}

impl Drop for DisplayTask {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "display thread panicked during shutdown");
        }
    }
}
