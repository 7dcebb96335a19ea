use anyhow::{Context, Result};
use helios::Config;
use helios::logging::{get_logger, init_logging};
use helios::provider::mqtt::MqttClient;
use helios::setup::build_runtime;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("Helios {} starting up", env!("APP_VERSION"));

    let mqtt = match &config.mqtt {
        Some(mqtt) => Some(MqttClient::connect(mqtt, get_logger("mqtt"))?),
        None => None,
    };

    let runtime = build_runtime(&config, mqtt.as_ref())
        .await
        .context("Failed to set up load points")?;

    runtime
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;

    if let Some(mqtt) = &mqtt {
        mqtt.shutdown().await;
    }
    info!("Shutdown complete");
    Ok(())
}
