//! Flight modes reachable through DO_SET_MODE.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
pub const MODE_FLAG_CUSTOM_MODE_ENABLED: u8 = 1;

/// Modes of the ArduPilot Rover firmware the dispatcher targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightMode {
    Manual,
    Auto,
    Guided,
}

impl FlightMode {
    pub const ALL: [FlightMode; 3] = [FlightMode::Manual, FlightMode::Auto, FlightMode::Guided];

    pub fn base_mode(self) -> u8 {
        MODE_FLAG_CUSTOM_MODE_ENABLED
    }

    /// Autopilot-specific custom mode number.
    pub fn custom_mode(self) -> u32 {
        match self {
            FlightMode::Manual => 0,
            FlightMode::Auto => 10,
            FlightMode::Guided => 15,
        }
    }

    /// Arguments for the catalog's `do_set_mode` entry: base mode, custom
    /// mode, custom submode.
    pub fn set_mode_args(self) -> [f64; 3] {
        [self.base_mode() as f64, self.custom_mode() as f64, 0.0]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlightMode::Manual => "manual",
            FlightMode::Auto => "auto",
            FlightMode::Guided => "guided",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(FlightMode::Manual),
            "auto" => Ok(FlightMode::Auto),
            "guided" => Ok(FlightMode::Guided),
            other => Err(format!(
                "unknown flight mode '{}' (expected manual, auto or guided)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_mode_numbers() {
        assert_eq!(FlightMode::Manual.custom_mode(), 0);
        assert_eq!(FlightMode::Auto.custom_mode(), 10);
        assert_eq!(FlightMode::Guided.custom_mode(), 15);
    }

    #[test]
    fn test_set_mode_args_enable_custom_mode() {
        assert_eq!(FlightMode::Guided.set_mode_args(), [1.0, 15.0, 0.0]);
    }

    #[test]
    fn test_parse_mode_names() {
        for mode in FlightMode::ALL {
            assert_eq!(mode.as_str().parse::<FlightMode>(), Ok(mode));
        }
        assert_eq!("GUIDED".parse::<FlightMode>(), Ok(FlightMode::Guided));
        assert!("loiter".parse::<FlightMode>().is_err());
    }
}
