//! Unit tests for configuration validation.

use stepper_fsm::config::{parse_config, validate_config, SystemConfig};
use stepper_fsm::error::{ConfigError, Error};

/// Test validation of a valid configuration.
#[test]
fn test_valid_config_passes_validation() {
    let toml_str = r#"
[motors.stepper1]
name = "main_axis"
units_per_step = 0.01

[motors.stepper1.limits]
min_steps = -100
max_steps = 100
enabled = true
"#;

    let config: SystemConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    assert!(validate_config(&config).is_ok());
}

/// Test validation fails for a zero units-per-step factor.
#[test]
fn test_zero_units_per_step_rejected() {
    let toml_str = r#"
[motors.stepper1]
name = "main_axis"
units_per_step = 0.0
"#;

    let config: SystemConfig = toml::from_str(toml_str).expect("Failed to parse TOML");
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidUnitsPerStep(0.0)))
    );
}

/// Test validation fails for a zero poll interval.
#[test]
fn test_zero_poll_interval_rejected() {
    let toml_str = r#"
[motors.stepper1]
name = "main_axis"
poll_interval_ms = 0
"#;

    let result = parse_config(toml_str);
    assert_eq!(
        result.unwrap_err(),
        Error::Config(ConfigError::InvalidPollInterval(0))
    );
}

/// Test validation fails for inverted software limits.
#[test]
fn test_inverted_limits_rejected() {
    let toml_str = r#"
[motors.stepper1]
name = "main_axis"

[motors.stepper1.limits]
min_steps = 100
max_steps = -100
"#;

    let result = parse_config(toml_str);
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::InvalidSoftLimits { min: 100, max: -100 }))
    ));
}

/// Test that a malformed document surfaces as a parse error.
#[test]
fn test_malformed_toml_is_parse_error() {
    let result = parse_config("[motors.stepper1\nname = ");
    assert!(matches!(result, Err(Error::Config(ConfigError::ParseError(_)))));
}
