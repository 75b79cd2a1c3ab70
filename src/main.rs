use clap::Parser;
use color_eyre::Result;
use esp32_mqtt_simulator::config::{prompt_topic, Cli, EnvConfig, FileConfig, SimulatorConfig};
use esp32_mqtt_simulator::mqtt::mqtt_handler::MqttHandler;
use esp32_mqtt_simulator::simulator::runner::{Session, SimulatorLoop};
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    setup()?;

    let cli = Cli::parse();
    let file = FileConfig::discover().await?;
    let env = EnvConfig::from_env();
    let config = SimulatorConfig::resolve(&cli, &env, &file, |fallback| {
        let stdin = std::io::stdin();
        prompt_topic(&mut stdin.lock(), &mut std::io::stdout(), fallback)
    })?;

    info!("{}", "=".repeat(50));
    info!("ESP32 MQTT Simulator ({} mode)", config.mode);
    info!("{}", "=".repeat(50));

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_interrupt(shutdown.clone()));

    let session = Session::new(&config, &mut rand::thread_rng());
    let summary = SimulatorLoop::new(config, session, MqttHandler::new(), shutdown)
        .run()
        .await;

    info!(
        "{} ticks, {} published, {} failed",
        summary.ticks, summary.published, summary.failed
    );
    Ok(summary.exit.exit_code())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .without_time()
        .init();
}

/// Cancels `shutdown` on Ctrl+C, or SIGTERM on unix.
async fn listen_for_interrupt(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }

    shutdown.cancel();
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}
