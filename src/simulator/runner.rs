//! Connect, generate, publish, sleep, teardown.
//!
//! ```text
//! CONNECTING ──ok──▶ SETTLING ──▶ GENERATE ─▶ SERIALIZE ─▶ PUBLISH ─▶ SLEEP ─┐
//!     │                              ▲                                      │
//!     │ err                          └──────────────────────────────────────┘
//!     ▼
//! TEARDOWN ◀── interrupt (any await point) / fault
//! ```
//!
//! Teardown runs exactly once on every path out of [`SimulatorLoop::run`], including a panic
//! inside the loop, which is reported as a fault. A failed publish is reported and skipped; it
//! never stops the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use futures::FutureExt;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::SimulatorError;
use super::generator::{Generator, RandomSource, SystemRandom};
use crate::config::SimulatorConfig;
use crate::mqtt::config::{generate_client_id, BrokerSettings};
use crate::mqtt::message_manager::MQTTMessage;
use crate::mqtt::mqtt_handler::{BrokerClient, BrokerEvents, ConnectionState, ConsoleEvents};

/// Suspends the loop between ticks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// One connection of the simulated device to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub status: ConnectionState,
}

impl Session {
    pub fn new<R: Rng + ?Sized>(config: &SimulatorConfig, rng: &mut R) -> Self {
        Self {
            broker: config.broker.clone(),
            port: config.port,
            client_id: generate_client_id(rng),
            topic: config.topic.clone(),
            status: ConnectionState::Disconnected,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.broker, self.port)
    }

    pub fn console_events(&self) -> ConsoleEvents {
        ConsoleEvents::new(self.address(), self.client_id.clone(), self.topic.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitReason {
    /// Stopped by Ctrl+C or SIGTERM
    #[default]
    Interrupted,
    ConnectionFailed,
    /// Any other failure inside the loop
    Fault,
}

impl ExitReason {
    pub fn exit_code(self) -> ExitCode {
        match self {
            ExitReason::Interrupted => ExitCode::SUCCESS,
            ExitReason::ConnectionFailed | ExitReason::Fault => ExitCode::FAILURE,
        }
    }
}

/// What happened during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub published: u64,
    pub failed: u64,
    pub exit: ExitReason,
}

pub struct SimulatorLoop<B: BrokerClient> {
    config: SimulatorConfig,
    session: Session,
    broker: B,
    events: Arc<dyn BrokerEvents>,
    generator: Generator,
    random: Box<dyn RandomSource>,
    sleeper: Box<dyn Sleeper>,
    shutdown: CancellationToken,
}

impl<B: BrokerClient> SimulatorLoop<B> {
    pub fn new(
        config: SimulatorConfig,
        session: Session,
        broker: B,
        shutdown: CancellationToken,
    ) -> Self {
        let events = Arc::new(session.console_events());
        let generator = Generator::new(config.mode);
        Self {
            config,
            session,
            broker,
            events,
            generator,
            random: Box::new(SystemRandom::new()),
            sleeper: Box::new(TokioSleeper),
            shutdown,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn BrokerEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn with_random(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until interrupted or until the connection cannot be established.
    pub async fn run(mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        let exit = match AssertUnwindSafe(self.drive(&mut summary)).catch_unwind().await {
            Ok(exit) => exit,
            Err(panic) => {
                error!("✗ Error: {}", panic_message(panic.as_ref()));
                ExitReason::Fault
            }
        };
        summary.exit = exit;

        match summary.exit {
            ExitReason::Interrupted => info!("✓ Program stopped by user"),
            ExitReason::ConnectionFailed | ExitReason::Fault => {}
        }

        self.teardown().await;
        summary
    }

    async fn drive(&mut self, summary: &mut RunSummary) -> ExitReason {
        let shutdown = self.shutdown.clone();
        let settings = self.broker_settings();

        info!("Connecting to {}...", settings.address());
        self.session.status = ConnectionState::Connecting;
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return ExitReason::Interrupted,
            connected = self.broker.connect(&settings) => connected,
        };
        if let Err(e) = connected {
            self.session.status = ConnectionState::Failed;
            error!("✗ {}", e);
            return ExitReason::ConnectionFailed;
        }
        self.session.status = ConnectionState::Connected;

        if let Err(e) = self.broker.start_background_loop(self.events.clone()) {
            error!("✗ Error: {}", e);
            return ExitReason::Fault;
        }

        if !pause(&self.shutdown, self.sleeper.as_ref(), self.config.settle_delay).await {
            return ExitReason::Interrupted;
        }

        let interval = self.config.mode.publish_interval();
        info!(
            "Sending {} data every {} second(s)...",
            self.config.mode,
            interval.as_secs_f64()
        );
        info!("Press Ctrl+C to stop");

        loop {
            if shutdown.is_cancelled() {
                return ExitReason::Interrupted;
            }

            let message = match self.next_message() {
                Ok(message) => message,
                Err(e) => {
                    error!("✗ Error: {}", e);
                    return ExitReason::Fault;
                }
            };
            summary.ticks += 1;

            let published = tokio::select! {
                _ = shutdown.cancelled() => return ExitReason::Interrupted,
                published = self.broker.publish(message) => published,
            };
            match published {
                Ok(()) => summary.published += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!("  ✗ Failed to send data: {}", e);
                }
            }

            if !pause(&self.shutdown, self.sleeper.as_ref(), interval).await {
                return ExitReason::Interrupted;
            }
        }
    }

    /// Generates and serializes the reading for the next tick.
    fn next_message(&mut self) -> Result<MQTTMessage, SimulatorError> {
        let reading = self.generator.advance(self.random.as_mut());
        let payload = reading.to_payload()?;

        info!("[{}] {}", Local::now().format("%H:%M:%S"), reading);
        let message = MQTTMessage::from_topic(self.session.topic.clone(), payload);
        debug!("{}", message.render());
        Ok(message)
    }

    async fn teardown(&mut self) {
        info!("Closing connection...");
        self.broker.stop_background_loop().await;
        if let Err(e) = self.broker.disconnect().await {
            warn!("✗ {}", e);
        }
        self.session.status = ConnectionState::Disconnected;
        info!("✓ Connection closed");
    }

    fn broker_settings(&self) -> BrokerSettings {
        let mut settings = BrokerSettings::new(
            self.session.broker.clone(),
            self.session.port,
            self.session.client_id.clone(),
        );
        settings.connect_timeout = self.config.connect_timeout;
        settings.keep_alive = self.config.keep_alive;
        settings
    }
}

/// Sleeps unless interrupted first; returns `false` on interrupt.
async fn pause(shutdown: &CancellationToken, sleeper: &dyn Sleeper, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = sleeper.sleep(duration) => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
