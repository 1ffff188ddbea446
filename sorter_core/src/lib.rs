#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core motion logic for the single-axis sorting mechanism (hardware-agnostic).
//!
//! All hardware interactions go through the `sorter_traits` seams:
//! `Encoder`, `MotorDriver`, `Sensor`, and `StatusSink`.
//!
//! ## Architecture
//!
//! - **Controller**: fixed-period PI position loop with deadband, anti-windup,
//!   and a static-friction kickstart floor (`controller` module)
//! - **Homing**: cooperative sensor-gated search that defines position zero
//!   (`homing` module)
//! - **Sequencer**: the cycle state machine issuing setpoints and branching on
//!   sensor readings (`sequencer` module)
//! - **Shared state**: word-sized atomics bridging the periodic control task
//!   and the free-running sequencer (`shared` module)
//! - **Runner**: spawns the periodic task and drives cycles to completion
//!   (`runner` module)
//! - **Display**: latest-wins status event channel with a rate-limited sink
//!   thread (`display` module)
//!
//! ## Units
//!
//! Positions and setpoints are signed encoder counts (`i64`). Duty is the
//! 11-bit PWM scale `0..=DUTY_MAX` (2047). Analog readings are 12-bit
//! (`0..=4095`). Time inside the state machines is milliseconds since a
//! per-run epoch, measured through the injectable `Clock`.

pub mod axis;
pub mod builder;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod display;
pub mod error;
pub mod homing;
pub mod mocks;
pub mod runner;
pub mod sequencer;
pub mod shared;
pub mod status;
pub mod util;

pub use axis::Axis;
pub use builder::{Missing, Set, Sorter, SorterBuilder};
pub use config::{ControlCfg, DisplayCfg, HomingCfg, SequenceCfg};
pub use controller::{PositionController, TickReport};
pub use display::{StatusFrame, StatusPublisher};
pub use error::{AxisError, BuildError, Result};
pub use homing::{Homing, HomingPhase, HomingStatus};
pub use runner::{ControlTask, RunSummary, spawn_control_loop};
pub use sequencer::{Fault, Goal, Resume, SeqState, Sequencer};
pub use shared::SharedAxis;
pub use status::CycleStatus;
