//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use sorter_core::error::{AxisError, BuildError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingEncoder => {
                "What happened: No encoder was provided to the motion core.\nLikely causes: The quadrature counter failed to initialize or was not wired into the builder.\nHow to fix: Check [pins].encoder_cs and SPI wiring; pass the encoder via with_encoder(...).".to_string()
            }
            BuildError::MissingMotor => {
                "What happened: No motor driver was provided to the motion core.\nLikely causes: PWM/GPIO setup failed or was not wired into the builder.\nHow to fix: Check [pins].motor_pwm_channel and motor_dir; pass the motor via with_motor(...).".to_string()
            }
            BuildError::MissingSensor => {
                "What happened: No sensor was provided to the motion core.\nLikely causes: ADC setup failed or was not wired into the builder.\nHow to fix: Check [pins].adc_cs and adc_channel; pass the sensor via with_sensor(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ae) = err.downcast_ref::<AxisError>() {
        return match ae {
            AxisError::HomingTimeout => {
                "What happened: Homing never detected the reference marker within the search window.\nLikely causes: Marker obscured, sensor mis-aimed, threshold too high, or the axis is jammed.\nHow to fix: Clear the mechanism, check the reflectance sensor alignment, or lower homing.sensor_threshold / raise homing.timeout_ms.".to_string()
            }
            AxisError::HardwareFault(msg) => format!(
                "What happened: A peripheral timed out ({msg}).\nLikely causes: SPI/I2C wiring or power issue.\nHow to fix: Check cabling and supply, then rerun with --log-level=debug."
            ),
            AxisError::Hardware(msg) => format!(
                "What happened: A peripheral error occurred ({msg}).\nLikely causes: Wrong pin assignment or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access the GPIO/SPI devices."
            ),
            AxisError::SensorOutOfRange(v) => format!(
                "What happened: The analog sensor reported {v}, outside the expected 0..=4095 range.\nLikely causes: ADC misconfiguration or electrical noise.\nHow to fix: Verify the ADC channel and wiring."
            ),
            AxisError::State(msg) => format!(
                "What happened: Invalid operation for the current state ({msg}).\nHow to fix: This is a usage bug; rerun with --log-level=debug and report it."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config.
    // Alternate formatting includes the full context chain.
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid config") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid.\nDetail: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }
    if lower.contains("no such file") {
        return format!(
            "What happened: Config file not found.\nDetail: {msg}\nHow to fix: Pass --config <FILE> or create etc/sorter.toml."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.chain().nth(1) {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map fault kinds to stable exit codes; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use sorter_core::error::AxisError;
    if let Some(ae) = err.downcast_ref::<AxisError>() {
        return match ae {
            AxisError::HomingTimeout => 3,
            AxisError::Hardware(_) | AxisError::HardwareFault(_) => 4,
            AxisError::SensorOutOfRange(_) => 5,
            AxisError::State(_) => 6,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use sorter_core::error::AxisError;
    let kind = if let Some(ae) = err.downcast_ref::<AxisError>() {
        match ae {
            AxisError::HomingTimeout => "homing_timeout",
            AxisError::Hardware(_) => "hardware",
            AxisError::HardwareFault(_) => "hardware_fault",
            AxisError::SensorOutOfRange(_) => "sensor_out_of_range",
            AxisError::State(_) => "state",
        }
    } else {
        "error"
    };
    serde_json::json!({
        "ok": false,
        "kind": kind,
        "message": format!("{err:#}"),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}
