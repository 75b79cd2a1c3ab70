//! # Simulated Device
//!
//! Models the ESP32 node that is being impersonated: its mutable state, the readings it
//! produces each tick and the loop that publishes them.
//!
//! ```text
//! simulator/
//! ├── error.rs      - error taxonomy shared by the crate
//! ├── generator.rs  - per-tick state evolution and reading generation
//! ├── payload.rs    - wire encoding of readings
//! └── runner.rs     - connect / generate / publish / sleep / teardown
//! ```
//!
//! The three scenarios are mutually exclusive shapes of the same device. They share the
//! state machine and differ only in the reading they derive from it, the tick at which the
//! power flag flips and the pause between two publishes.

pub mod error;
pub mod generator;
pub mod payload;
pub mod runner;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lowest brightness the lamp can be dimmed to (percent)
pub const BRIGHTNESS_MIN: i32 = 30;
/// Full brightness (percent)
pub const BRIGHTNESS_MAX: i32 = 100;
/// Brightness is nudged on every tick that is a multiple of this value
pub const BRIGHTNESS_STEP_PERIOD: u64 = 5;
/// Largest brightness change applied in one step, in either direction
pub const BRIGHTNESS_MAX_STEP: i32 = 10;

/// Mains voltage of the simulated node
pub const VOLTAGE_MAX: f64 = 220.0;
/// Upper bound of the simulated load current (A)
pub const CURRENT_MAX: f64 = 10.0;
/// Upper bound of the simulated temperature (°C)
pub const TEMPERATURE_MAX: f64 = 100.0;
/// Relative fluctuation applied to the lamp voltage
pub const VOLTAGE_FLUCTUATION: f64 = 0.02;

/// Which kind of device is simulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Thermometer publishing a bare Celsius value
    #[default]
    Temperature,
    /// Power meter publishing a JSON record
    Electrical,
    /// Dimmable lamp publishing its supply voltage
    Brightness,
}

impl Scenario {
    /// Ticks between two flips of the power flag.
    pub fn toggle_period(self) -> u64 {
        match self {
            Scenario::Temperature | Scenario::Electrical => 10,
            Scenario::Brightness => 20,
        }
    }

    /// Pause between two publishes.
    pub fn publish_interval(self) -> Duration {
        match self {
            Scenario::Temperature | Scenario::Electrical => Duration::from_secs(2),
            Scenario::Brightness => Duration::from_secs(1),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Scenario::Temperature => "temperature",
            Scenario::Electrical => "electrical",
            Scenario::Brightness => "brightness",
        };
        write!(f, "{}", name)
    }
}

/// State carried from one tick to the next.
///
/// Owned by the generator; only the foreground loop ever mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedState {
    pub tick: u64,
    pub power: bool,
    /// Lamp brightness in percent, always within [`BRIGHTNESS_MIN`, `BRIGHTNESS_MAX`]
    pub brightness: i32,
}

impl Default for SimulatedState {
    fn default() -> Self {
        Self {
            tick: 0,
            power: true,
            brightness: BRIGHTNESS_MAX,
        }
    }
}
