//! Hardware assembly and cycle execution: config mapping, sim-vs-hardware
//! selection, and the run/self-check entry points.

use std::sync::atomic::AtomicBool;

use eyre::WrapErr;
use sorter_core::error::Result;
use sorter_core::{RunSummary, Sorter};
use sorter_traits::{Button, Encoder, Sensor};

use crate::cli::Profile;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn hardware_available() -> bool {
    false
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn hardware_available() -> bool {
    true
}

/// Run `cycles` full cycles against the simulator or the real rig.
pub fn run_cycles(
    cfg: &sorter_config::Config,
    cycles: u32,
    profile: Profile,
    force_sim: bool,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    if force_sim || !hardware_available() {
        run_sim(cfg, cycles, profile, shutdown)
    } else {
        run_hardware(cfg, cycles, shutdown)
    }
}

fn run_sim(
    cfg: &sorter_config::Config,
    cycles: u32,
    profile: Profile,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    use sorter_hardware::sim::ConsoleDisplay;
    use sorter_hardware::{SimParams, SimulatedAxis};

    let sim = SimulatedAxis::new(SimParams::default());
    // The simulator has no operator: queue one trigger per requested cycle.
    let button = match profile {
        Profile::Sweep => Button::One,
        Profile::Sort => Button::Two,
    };
    for _ in 0..cycles {
        sim.queue_press(button);
    }
    tracing::info!(cycles, ?profile, "starting simulated run");

    let mut sorter = Sorter::builder()
        .with_encoder(sim.encoder())
        .with_motor(sim.motor())
        .with_sensor(sim.sensor())
        .with_control((&cfg.control).into())
        .with_homing((&cfg.homing).into())
        .with_sequence((&cfg.sequence).into())
        .with_display_cfg((&cfg.display).into())
        .with_display(ConsoleDisplay, |f| {
            sorter_ui::render(f.state, f.position, f.setpoint, f.sensor)
        })
        .build()
        .wrap_err("building simulated rig")?;

    sorter.run(cycles, shutdown)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn run_hardware(
    cfg: &sorter_config::Config,
    cycles: u32,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    use sorter_hardware::pi::{GroveLcd, Ls7366Encoder, PiSensor, PwmMotor};

    let pins = &cfg.pins;
    let encoder = Ls7366Encoder::new(pins.encoder_cs).wrap_err("open quadrature counter")?;
    let motor = PwmMotor::new(pins.motor_pwm_channel, pins.motor_dir, pins.dir_active_high)
        .wrap_err("open motor driver")?;
    let sensor = PiSensor::new(pins.adc_cs, pins.adc_channel, pins.button1, pins.button2)
        .wrap_err("open sensor/buttons")?;
    let lcd = GroveLcd::new().wrap_err("open status display")?;
    tracing::info!(cycles, "starting hardware run");

    let mut sorter = Sorter::builder()
        .with_encoder(encoder)
        .with_motor(motor)
        .with_sensor(sensor)
        .with_control((&cfg.control).into())
        .with_homing((&cfg.homing).into())
        .with_sequence((&cfg.sequence).into())
        .with_display_cfg((&cfg.display).into())
        .with_display(lcd, |f| {
            sorter_ui::render(f.state, f.position, f.setpoint, f.sensor)
        })
        .build()
        .wrap_err("building hardware rig")?;

    sorter.run(cycles, shutdown)
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn run_hardware(
    _cfg: &sorter_config::Config,
    _cycles: u32,
    _shutdown: &AtomicBool,
) -> Result<RunSummary> {
    eyre::bail!("built without hardware support; rebuild with --features hardware or pass --sim")
}

/// Construct the peripherals and take one reading from each; no motion.
pub fn self_check(cfg: &sorter_config::Config, force_sim: bool) -> Result<()> {
    if force_sim || !hardware_available() {
        use sorter_hardware::{SimParams, SimulatedAxis};
        let sim = SimulatedAxis::new(SimParams::default());
        let mut encoder = sim.encoder();
        let mut sensor = sim.sensor();
        let position = encoder.read().map_err(|e| eyre::eyre!("{e}"))?;
        let analog = sensor.read_analog().map_err(|e| eyre::eyre!("{e}"))?;
        tracing::info!(position, analog, "self-check (sim)");
        return Ok(());
    }
    self_check_hardware(cfg)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn self_check_hardware(cfg: &sorter_config::Config) -> Result<()> {
    use sorter_hardware::pi::{Ls7366Encoder, PiSensor};
    let pins = &cfg.pins;
    let mut encoder = Ls7366Encoder::new(pins.encoder_cs).wrap_err("open quadrature counter")?;
    let mut sensor = PiSensor::new(pins.adc_cs, pins.adc_channel, pins.button1, pins.button2)
        .wrap_err("open sensor/buttons")?;
    let position = encoder.read().map_err(|e| eyre::eyre!("{e}"))?;
    let analog = sensor.read_analog().map_err(|e| eyre::eyre!("{e}"))?;
    tracing::info!(position, analog, "self-check (hardware)");
    Ok(())
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn self_check_hardware(_cfg: &sorter_config::Config) -> Result<()> {
    eyre::bail!("built without hardware support; rebuild with --features hardware or pass --sim")
}
