//! Top-level configuration: every motor of a setup, keyed by name.

use heapless::{FnvIndexMap, String};
use serde::Deserialize;

use super::motor::MotorConfig;

/// Maximum number of motors in one configuration file.
pub const MAX_MOTORS: usize = 8;

/// All motors of a setup, as read from a `[motors.<key>]` table per motor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemConfig {
    /// Motor configurations by table key.
    pub motors: FnvIndexMap<String<32>, MotorConfig, MAX_MOTORS>,
}

impl SystemConfig {
    /// Look up a motor by its table key.
    pub fn motor(&self, key: &str) -> Option<&MotorConfig> {
        self.motors
            .iter()
            .find_map(|(k, motor)| (k.as_str() == key).then_some(motor))
    }

    /// Table keys of all motors, in file order.
    pub fn motor_names(&self) -> impl Iterator<Item = &str> {
        self.motors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_key_not_display_name() {
        let mut config = SystemConfig::default();
        let key = String::try_from("slit").unwrap();
        config
            .motors
            .insert(key, MotorConfig::new("Entrance slit"))
            .unwrap();

        assert_eq!(config.motor("slit").unwrap().name.as_str(), "Entrance slit");
        assert!(config.motor("Entrance slit").is_none());
        assert_eq!(config.motor_names().collect::<Vec<_>>(), vec!["slit"]);
    }
}
