//! # ESP32 MQTT Simulator
//!
//! Stand-in for an ESP32 sensor/actuator node. The simulator connects to an MQTT broker,
//! publishes one synthetic reading per tick and closes the connection cleanly when it is
//! interrupted.
//!
//! ```text
//! config.rs     - CLI, environment and TOML configuration layers
//! mqtt/         - broker client abstraction and the rumqttc-backed handler
//! simulator/    - simulated device state, payload encoding and the publish loop
//! ```

pub mod config;
pub mod mqtt;
pub mod simulator;

pub use simulator::error::SimulatorError;
