//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Keeps the non-blocking file appender alive for the process lifetime.
pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "sorter", version, about = "Sorting-axis controller CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/sorter.toml")]
    pub config: PathBuf,

    /// Log and report as JSON instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Which cycle profile the simulated operator triggers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Profile {
    /// Visit every sub-step of the sweep span in order.
    Sweep,
    /// Measure, branch on the reflectance reading, deliver, wait, return.
    Sort,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run sorting cycles until done or interrupted
    Run {
        /// Number of full cycles to run
        #[arg(long, default_value_t = 1)]
        cycles: u32,
        /// Cycle profile to trigger (simulator only; on hardware the operator
        /// buttons choose)
        #[arg(long, value_enum, default_value = "sweep")]
        profile: Profile,
        /// Force the simulator even when built with hardware support
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Quick health check (peripherals constructible, sensor/encoder readable)
    SelfCheck {
        /// Force the simulator even when built with hardware support
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Health check for operational monitoring
    Health,
}
