//! Unit tests for TOML configuration parsing.

use std::io::Write;

use stepper_fsm::config::{load_config, SoftwareLimits, SystemConfig};

/// Test parsing a valid motor configuration from TOML.
#[test]
fn test_parse_motor_config() {
    let toml_str = r#"
[motors.stepper1]
name = "main_axis"
device = "TMCM_1"
units_per_step = 0.0025
encoder_units_per_step = 0.005
autostart = true
poll_interval_ms = 20
"#;

    let config: SystemConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    let motor = config.motor("stepper1").expect("Motor not found");

    assert_eq!(motor.name.as_str(), "main_axis");
    assert_eq!(motor.device.as_str(), "TMCM_1");
    assert_eq!(motor.units_per_step, 0.0025);
    assert_eq!(motor.encoder_units_per_step, 0.005);
    assert!(motor.autostart);
    assert_eq!(motor.poll_interval_ms, 20);
    assert_eq!(motor.software_limits(), SoftwareLimits::UNBOUNDED);
}

/// Test that partial limits keep the missing side unbounded.
#[test]
fn test_parse_partial_limits() {
    let toml_str = r#"
[motors.stepper1]
name = "main_axis"

[motors.stepper1.limits]
min_steps = -2000
enabled = true
"#;

    let config: SystemConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    let limits = config.motor("stepper1").unwrap().software_limits();

    assert_eq!(limits, SoftwareLimits::new(-2000, i32::MAX, true));
    assert!(limits.allows(1_000_000));
    assert!(!limits.allows(-2001));
}

/// Test parsing several motors and iterating their names.
#[test]
fn test_parse_multiple_motors() {
    let toml_str = r#"
[motors.x]
name = "X"

[motors.y]
name = "Y"
autostart = true
"#;

    let config: SystemConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    let mut names: Vec<&str> = config.motor_names().collect();
    names.sort_unstable();

    assert_eq!(names, vec!["x", "y"]);
    assert!(config.motor("y").unwrap().autostart);
    assert!(config.motor("z").is_none());
}

/// Test loading a configuration from a file on disk.
#[test]
fn test_load_config_from_file() {
    let path = std::env::temp_dir().join(format!("stepper-fsm-{}.toml", std::process::id()));
    {
        let mut file = std::fs::File::create(&path).expect("Failed to create file");
        writeln!(file, "[motors.slit]\nname = \"Slit\"\npoll_interval_ms = 5").unwrap();
    }

    let config = load_config(&path).expect("Failed to load config");
    std::fs::remove_file(&path).ok();

    assert_eq!(config.motor("slit").unwrap().poll_interval_ms, 5);
}
