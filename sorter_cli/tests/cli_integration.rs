use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Config tuned so the simulator converges quickly: 10 ms control period and
/// short dwell/pause windows.
const FAST_CONFIG: &str = r#"
[pins]
encoder_cs = 0
motor_pwm_channel = 0
motor_dir = 26
adc_cs = 1
button1 = 2
button2 = 12

[control]
kp = 2.0
ki = 0.5
period_ms = 10
deadband_counts = 2
integral_clamp = 300.0
min_duty = 400
max_duty = 1400
reverse_bias = 120
arrival_tolerance_counts = 25

[homing]
sensor_threshold = 2000
search_duty = 600
timeout_ms = 2000
retries = 1

[sequence]
steps = 8
span_counts = 408
dwell_min_ms = 30
seek_timeout_ms = 500
pause_ms = 50
return_band_counts = 150
return_duty_max = 700

[display]
min_refresh_ms = 100
"#;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("sorter.toml");
    fs::write(&path, contents).expect("write config");
    path
}

fn sorter() -> Command {
    Command::cargo_bin("sorter").expect("binary")
}

#[test]
fn self_check_reports_ok() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, FAST_CONFIG);

    sorter()
        .arg("--config")
        .arg(&config)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check ok"));
}

#[test]
fn health_reports_config_summary() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, FAST_CONFIG);

    sorter()
        .arg("--config")
        .arg(&config)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("healthy"))
        .stdout(predicate::str::contains("8 steps over 408 counts"));
}

#[test]
fn run_completes_one_sweep_cycle_in_simulation() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, FAST_CONFIG);

    sorter()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg("--cycles")
        .arg("1")
        .arg("--profile")
        .arg("sweep")
        .timeout(Duration::from_secs(60))
        .assert()
        .success()
        .stdout(predicate::str::contains("completed 1 cycle(s)"));
}

#[test]
fn run_sort_cycle_reports_json_summary() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, FAST_CONFIG);

    sorter()
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .arg("run")
        .arg("--cycles")
        .arg("1")
        .arg("--profile")
        .arg("sort")
        .timeout(Duration::from_secs(60))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\":true"))
        .stdout(predicate::str::contains("\"cycles\":1"));
}

#[test]
fn invalid_config_is_rejected_with_field_name() {
    let dir = TempDir::new().unwrap();
    let bad = FAST_CONFIG.replace("period_ms = 10", "period_ms = 0");
    let config = write_config(&dir, &bad);

    sorter()
        .arg("--config")
        .arg(&config)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("period_ms"));
}

#[test]
fn missing_config_file_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("does-not-exist.toml");

    sorter()
        .arg("--config")
        .arg(&config)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading config"));
}
