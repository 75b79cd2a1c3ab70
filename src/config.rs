//! # Configuration
//!
//! Builds the [`SimulatorConfig`] once at startup. Each setting is taken from the first
//! layer that provides it:
//!
//! ```text
//! --topic flag
//!   ↓
//! interactive prompt (--interactive, blank input keeps the fallback)
//!   ↓
//! environment: MQTT_BROKER, MQTT_PORT, MQTT_TOPIC
//!   ↓
//! simulator.toml ($SIMULATOR_CONFIG, ./simulator.toml, ~/.config/esp32-mqtt-simulator/)
//!   ↓
//! built-in defaults
//! ```
//!
//! A missing TOML file is fine; a malformed one or an unparsable port is a configuration
//! error and stops the program before it connects.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::simulator::error::SimulatorError;
use crate::simulator::Scenario;

pub const DEFAULT_BROKER: &str = "mqtt.ichibot.id";
pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC: &str = "default/topic";

pub const ENV_BROKER: &str = "MQTT_BROKER";
pub const ENV_PORT: &str = "MQTT_PORT";
pub const ENV_TOPIC: &str = "MQTT_TOPIC";
pub const ENV_CONFIG_FILE: &str = "SIMULATOR_CONFIG";

const CONFIG_FILE: &str = "simulator.toml";
const CONFIG_DIR: &str = ".config/esp32-mqtt-simulator";

/// Command line of the simulator.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "esp32-mqtt-simulator",
    version,
    about = "Publishes synthetic ESP32 telemetry to an MQTT broker"
)]
pub struct Cli {
    /// Topic to publish to, skips the prompt
    #[arg(long)]
    pub topic: Option<String>,

    /// Ask for the topic at startup
    #[arg(long)]
    pub interactive: bool,

    /// Kind of device to simulate
    #[arg(long, value_enum)]
    pub mode: Option<Scenario>,
}

/// Settings read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub broker: Option<String>,
    pub port: Option<String>,
    pub topic: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            broker: read(ENV_BROKER),
            port: read(ENV_PORT),
            topic: read(ENV_TOPIC),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub topic: Option<String>,
    pub mode: Option<Scenario>,
}

/// Contents of `simulator.toml`.
///
/// ```toml
/// [broker]
/// host = "localhost"
/// port = 1883
///
/// [publish]
/// topic = "home/livingroom/lamp"
/// mode = "brightness"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub broker: BrokerSection,
    pub publish: PublishSection,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self, SimulatorError> {
        toml::from_str(content)
            .map_err(|e| SimulatorError::Config(format!("invalid TOML: {}", e)))
    }

    pub async fn load(path: &Path) -> Result<Self, SimulatorError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SimulatorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| SimulatorError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Loads the first config file found, or the empty config if there is none.
    ///
    /// A path given through `SIMULATOR_CONFIG` must exist.
    pub async fn discover() -> Result<Self, SimulatorError> {
        if let Some(path) = explicit_config_path(|key| std::env::var(key).ok()) {
            info!("Loading configuration from {}", path.display());
            return Self::load(&path).await;
        }

        for path in candidate_paths() {
            match tokio::fs::try_exists(&path).await {
                Ok(true) => {
                    info!("Loading configuration from {}", path.display());
                    return Self::load(&path).await;
                }
                Ok(false) => debug!("No configuration at {}", path.display()),
                Err(e) => warn!("Unable to check {}: {}", path.display(), e),
            }
        }

        Ok(Self::default())
    }
}

/// Path named by `SIMULATOR_CONFIG`; a blank value counts as unset.
fn explicit_config_path<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(ENV_CONFIG_FILE)
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    match dirs::home_dir() {
        Some(mut home) => {
            home.push(CONFIG_DIR);
            home.push(CONFIG_FILE);
            paths.push(home);
        }
        None => warn!("Could not determine home directory, skipping user configuration"),
    }
    paths
}

/// Everything the simulator loop needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub mode: Scenario,
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    /// Wait after connecting so the CONNACK notification lands before the first tick
    pub settle_delay: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            port: DEFAULT_PORT,
            topic: DEFAULT_TOPIC.to_string(),
            mode: Scenario::default(),
            connect_timeout: Duration::from_secs(60),
            keep_alive: Duration::from_secs(60),
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl SimulatorConfig {
    /// Merges all configuration layers. `prompt` is only called for `--interactive` without
    /// `--topic`, and receives the topic that would be used otherwise.
    pub fn resolve<P>(
        cli: &Cli,
        env: &EnvConfig,
        file: &FileConfig,
        prompt: P,
    ) -> Result<Self, SimulatorError>
    where
        P: FnOnce(&str) -> Result<String, SimulatorError>,
    {
        let defaults = Self::default();

        let broker = env
            .broker
            .clone()
            .or_else(|| file.broker.host.clone())
            .unwrap_or(defaults.broker);

        let port = match &env.port {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                SimulatorError::Config(format!(
                    "{} must be a port number, got {:?}: {}",
                    ENV_PORT, raw, e
                ))
            })?,
            None => file.broker.port.unwrap_or(defaults.port),
        };

        let fallback_topic = env
            .topic
            .clone()
            .or_else(|| file.publish.topic.clone())
            .unwrap_or(defaults.topic);

        let topic = match (&cli.topic, cli.interactive) {
            (Some(topic), _) => topic.clone(),
            (None, true) => prompt(&fallback_topic)?,
            (None, false) => fallback_topic,
        };

        let mode = cli.mode.or(file.publish.mode).unwrap_or(defaults.mode);

        Ok(Self {
            broker,
            port,
            topic,
            mode,
            ..defaults
        })
    }
}

/// Asks for a topic; blank input keeps `fallback`.
pub fn prompt_topic<R, W>(
    input: &mut R,
    output: &mut W,
    fallback: &str,
) -> Result<String, SimulatorError>
where
    R: BufRead,
    W: Write,
{
    write!(output, "Enter MQTT topic [{}]: ", fallback)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let topic = line.trim();
    if topic.is_empty() {
        Ok(fallback.to_string())
    } else {
        Ok(topic.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;

    fn no_prompt(_: &str) -> Result<String, SimulatorError> {
        panic!("prompt must not be shown")
    }

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_configured() {
        let config = SimulatorConfig::resolve(
            &Cli::default(),
            &EnvConfig::default(),
            &FileConfig::default(),
            no_prompt,
        )
        .unwrap();

        assert_eq!(config.broker, "mqtt.ichibot.id");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic, "default/topic");
        assert_eq!(config.mode, Scenario::Temperature);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
        assert_eq!(config.settle_delay, Duration::from_secs(2));
    }

    #[test]
    fn topic_flag_beats_prompt_and_environment() {
        let cli = Cli {
            topic: Some("flag/topic".to_string()),
            interactive: true,
            mode: None,
        };
        let env = env(&[("MQTT_TOPIC", "env/topic")]);

        let config =
            SimulatorConfig::resolve(&cli, &env, &FileConfig::default(), no_prompt).unwrap();

        assert_eq!(config.topic, "flag/topic");
    }

    #[test]
    fn prompt_sees_the_environment_topic_as_fallback() {
        let cli = Cli {
            interactive: true,
            ..Cli::default()
        };
        let env = env(&[("MQTT_TOPIC", "env/topic")]);

        let config = SimulatorConfig::resolve(&cli, &env, &FileConfig::default(), |fallback| {
            assert_eq!(fallback, "env/topic");
            Ok("typed/topic".to_string())
        })
        .unwrap();

        assert_eq!(config.topic, "typed/topic");
    }

    #[test]
    fn environment_beats_config_file() {
        let file = FileConfig::parse(
            r#"
            [broker]
            host = "file.example"
            port = 8883

            [publish]
            topic = "file/topic"
            mode = "electrical"
            "#,
        )
        .unwrap();
        let env = env(&[("MQTT_BROKER", "env.example"), ("MQTT_PORT", " ")]);

        let config = SimulatorConfig::resolve(&Cli::default(), &env, &file, no_prompt).unwrap();

        assert_eq!(config.broker, "env.example");
        assert_eq!(config.port, 8883);
        assert_eq!(config.topic, "file/topic");
        assert_eq!(config.mode, Scenario::Electrical);
    }

    #[test]
    fn mode_flag_beats_config_file() {
        let file = FileConfig::parse("[publish]\nmode = \"electrical\"\n").unwrap();
        let cli = Cli {
            mode: Some(Scenario::Brightness),
            ..Cli::default()
        };

        let config =
            SimulatorConfig::resolve(&cli, &EnvConfig::default(), &file, no_prompt).unwrap();

        assert_eq!(config.mode, Scenario::Brightness);
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let env = env(&[("MQTT_PORT", "eighteen")]);

        let err =
            SimulatorConfig::resolve(&Cli::default(), &env, &FileConfig::default(), no_prompt)
                .unwrap_err();

        assert!(matches!(err, SimulatorError::Config(_)));
    }

    #[test]
    fn blank_config_path_falls_back_to_discovery() {
        assert_eq!(explicit_config_path(|_| Some(String::new())), None);
        assert_eq!(explicit_config_path(|_| Some("  ".to_string())), None);
        assert_eq!(explicit_config_path(|_| None), None);

        let path = explicit_config_path(|key| {
            (key == ENV_CONFIG_FILE).then(|| "/etc/sim.toml".to_string())
        });
        assert_eq!(path, Some(PathBuf::from("/etc/sim.toml")));
    }

    #[test]
    fn malformed_file_is_rejected() {
        let err = FileConfig::parse("[broker]\nport = \"not a number\"\n").unwrap_err();
        assert!(matches!(err, SimulatorError::Config(_)));
    }

    #[test]
    fn blank_prompt_input_keeps_the_fallback() {
        let mut input = Cursor::new("   \n");
        let mut output = Vec::new();

        let topic = prompt_topic(&mut input, &mut output, "default/topic").unwrap();

        assert_eq!(topic, "default/topic");
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Enter MQTT topic [default/topic]: "
        );
    }

    #[test]
    fn prompt_input_is_trimmed() {
        let mut input = Cursor::new("  home/lamp \n");
        let mut output = Vec::new();

        let topic = prompt_topic(&mut input, &mut output, "default/topic").unwrap();

        assert_eq!(topic, "home/lamp");
    }

    #[test]
    fn cli_accepts_mode_names() {
        let cli = Cli::try_parse_from([
            "esp32-mqtt-simulator",
            "--mode",
            "brightness",
            "--interactive",
        ])
        .unwrap();

        assert_eq!(cli.mode, Some(Scenario::Brightness));
        assert!(cli.interactive);
        assert!(cli.topic.is_none());
        assert!(Cli::try_parse_from(["esp32-mqtt-simulator", "--mode", "humidity"]).is_err());
    }
}
