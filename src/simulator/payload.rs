//! Wire encoding of readings.
//!
//! Two formats exist: a bare decimal number (`37.46`, `110.0`) and a JSON record with the
//! four fields `power`, `voltage`, `current` and `watt`. Neither is versioned.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::SimulatorError;

/// Rounds to two fraction digits, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Shortest text that reads back as the same value, always with a fraction digit.
///
/// Values are expected to be already rounded and within the simulated ranges, where the
/// `Debug` representation of `f64` never switches to exponent notation.
pub fn format_decimal(value: f64) -> String {
    format!("{:?}", round2(value))
}

/// Power flag as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl From<bool> for PowerState {
    fn from(power: bool) -> Self {
        if power {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// One power-meter sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectricalRecord {
    pub power: PowerState,
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// Kilowatts, despite the field name
    pub watt: f64,
}

impl ElectricalRecord {
    /// Parses a JSON payload produced by [`Reading::to_payload`].
    pub fn from_payload(payload: &str) -> Result<Self, SimulatorError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Value computed for a single tick; discarded once published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Degrees Celsius
    Temperature(f64),
    Electrical(ElectricalRecord),
    /// Lamp supply voltage together with the state it was derived from
    Lamp {
        voltage: f64,
        brightness: i32,
        power: PowerState,
    },
}

impl Reading {
    pub fn to_payload(&self) -> Result<String, SimulatorError> {
        match self {
            Reading::Temperature(celsius) => Ok(format_decimal(*celsius)),
            Reading::Electrical(record) => Ok(serde_json::to_string(record)?),
            Reading::Lamp { voltage, .. } => Ok(format_decimal(*voltage)),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reading::Temperature(celsius) => {
                write!(f, "Celsius: {}°C", format_decimal(*celsius))
            }
            Reading::Electrical(record) => write!(
                f,
                "Power: {} | Voltage: {} V | Current: {} A | Watt: {} kW",
                record.power,
                format_decimal(record.voltage),
                format_decimal(record.current),
                format_decimal(record.watt)
            ),
            Reading::Lamp {
                voltage,
                brightness,
                power,
            } => write!(
                f,
                "Lamp: {} | Brightness: {}% | Voltage: {} V",
                power,
                brightness,
                format_decimal(*voltage)
            ),
        }
    }
}
