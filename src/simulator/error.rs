//! Error definitions for the simulator

use thiserror::Error;

/// Failures the simulator distinguishes between.
///
/// None of these escape [`crate::simulator::runner::SimulatorLoop::run`]; the loop logs them
/// and either keeps ticking (publish failures) or moves to teardown.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// Handshake with the broker failed or timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker client refused to queue a publish
    #[error("Publish error: {0}")]
    Publish(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reading could not be encoded or decoded
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Reading the interactive topic prompt failed
    #[error("Prompt error: {0}")]
    Prompt(#[from] std::io::Error),
}
