//! # MQTT Integration Module
//!
//! Thin layer between the simulator and the broker. The simulator only talks to the
//! [`mqtt_handler::BrokerClient`] trait; [`mqtt_handler::MqttHandler`] implements it on top of
//! rumqttc and runs the network event loop on a background tokio task.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - broker connection settings and client id generation
//! ├── message_manager.rs  - outbound message representation
//! └── mqtt_handler.rs     - client trait, notification hooks and the rumqttc handler
//! ```
//!
//! Notifications (connect, publish, disconnect) fire on the background task. They only
//! report; the simulated device state is never touched from there.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
