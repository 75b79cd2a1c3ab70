use rand::Rng;
use std::time::Duration;

/// Prefix of every generated client identifier
pub const CLIENT_ID_PREFIX: &str = "esp32_simulator";

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Upper bound for the CONNECT / CONNACK exchange
    pub connect_timeout: Duration,
    /// Capacity of the request channel between client and event loop
    pub request_capacity: usize,
}

impl BrokerSettings {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(60),
            request_capacity: 100,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builds a client id that is unique enough per process run, e.g. `esp32_simulator_4821`.
pub fn generate_client_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}_{}", CLIENT_ID_PREFIX, rng.gen_range(1000..=9999))
}
