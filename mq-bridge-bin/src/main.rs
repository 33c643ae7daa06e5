mod provider;

use clap::Parser;
use mq_bridge_common::Logger;
use mq_bridge_core::BridgeConnector;
use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{constants::DEFAULT_CONFIG_FILE_NAME, Settings};
use mq_bridge_mqtt::{BrokerOptions, MqttConnection, RetryPolicy};
use mq_bridge_platform::PlatformClient;
use mq_bridge_repository::DeviceRepository;
use provider::FileDescriptionProvider;
use std::{env::current_dir, path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

/// mq-bridge - MQTT device connector
///
/// Bridges arbitrary upstream MQTT topics into the management platform's
/// topic-based RPC protocol: telemetry becomes device events, platform
/// commands become upstream publishes with correlated responses.
#[derive(Parser)]
#[command(name = "mq-bridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "mq-bridge", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, the connector looks for 'mq-bridge.toml' in the
    /// current working directory.
    #[arg(short, long, env = "MQBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> BridgeResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| BridgeError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };

    let settings = Settings::new(&config_path.to_string_lossy())?;

    let mut logger = Logger::new(Some(if settings.debug {
        Level::DEBUG
    } else {
        Level::INFO
    }));
    logger.initialize()?;

    let cancel = CancellationToken::new();

    // broker links: one platform connection, two upstream connections so
    // command/response traffic and event traffic stay in separate
    // ordering domains
    let platform_conn = MqttConnection::connect(
        BrokerOptions::new(
            settings.platform.broker_url.clone(),
            settings.platform.client_id.clone(),
        )
        .with_credentials(
            settings.platform.user.clone(),
            settings.platform.password.clone(),
        ),
        RetryPolicy::unlimited(),
        cancel.clone(),
    )
    .await?;
    let command_conn = MqttConnection::connect(
        BrokerOptions::new(
            settings.upstream.broker_url.clone(),
            settings.upstream.command_client_id.clone(),
        )
        .with_credentials(
            settings.upstream.user.clone(),
            settings.upstream.password.clone(),
        ),
        RetryPolicy::unlimited(),
        cancel.clone(),
    )
    .await?;
    let event_conn = MqttConnection::connect(
        BrokerOptions::new(
            settings.upstream.broker_url.clone(),
            settings.upstream.event_client_id.clone(),
        )
        .with_credentials(
            settings.upstream.user.clone(),
            settings.upstream.password.clone(),
        ),
        RetryPolicy::unlimited(),
        cancel.clone(),
    )
    .await?;

    let platform = Arc::new(PlatformClient::new(
        platform_conn,
        settings.connector_id.clone(),
        settings.debug,
    ));
    let repo = Arc::new(DeviceRepository::new(&settings.device_repo)?);
    let provider = Arc::new(FileDescriptionProvider::new(
        settings.device_descriptions_file.clone(),
    ));

    let _connector = BridgeConnector::start(
        settings.clone(),
        provider,
        platform,
        command_conn,
        event_conn,
        repo,
        cancel.clone(),
    )
    .await?;

    info!("mq-bridge started");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| BridgeError::from(format!("unable to listen for shutdown signal: {e}")))?;
    info!("shutdown signal received");
    cancel.cancel();
    Ok(())
}
