use crate::topics::Topics;
use async_trait::async_trait;
use dashmap::DashMap;
use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{
    Command, CommandHandler, DeviceInfo, DeviceInfoUpdate, DeviceState, MqttPort, PlatformPort,
    RefreshHandler, UpdateMethod,
};
use mq_bridge_mqtt::MqttConnection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Platform-facing client.
///
/// Device registration, events, command responses and the error channels
/// all ride the platform broker connection; command subscriptions are
/// tracked per device so they can be torn down on device removal.
pub struct PlatformClient {
    connector_id: String,
    conn: Arc<MqttConnection>,
    debug: bool,
    /// device_local_id -> registered command subscription filter
    command_listeners: DashMap<String, String>,
}

impl PlatformClient {
    pub fn new(conn: Arc<MqttConnection>, connector_id: impl Into<String>, debug: bool) -> Self {
        Self {
            connector_id: connector_id.into(),
            conn,
            debug,
            command_listeners: DashMap::new(),
        }
    }

    async fn send_device_update(&self, update: DeviceInfoUpdate) -> BridgeResult<()> {
        let topic = Topics::device_manager(&self.connector_id);
        let payload = serde_json::to_vec(&update)?;
        if self.debug {
            debug!("publish {topic} {}", String::from_utf8_lossy(&payload));
        }
        self.conn.publish(&topic, payload).await
    }

    /// Best-effort error publish; a failed delivery is only logged.
    async fn publish_error(&self, topic: &str, message: &str) {
        if let Err(e) = self
            .conn
            .publish(topic, message.as_bytes().to_vec())
            .await
        {
            warn!(error = %e, "unable to deliver error message on {topic}");
        }
    }
}

#[async_trait]
impl PlatformPort for PlatformClient {
    /// Every message on the refresh topic triggers the notifier regardless
    /// of payload.
    async fn listen_to_refresh(&self, notifier: RefreshHandler) -> BridgeResult<()> {
        self.conn
            .subscribe(
                &Topics::refresh(),
                Arc::new(move |_topic, _retained, _payload| {
                    let notifier = Arc::clone(&notifier);
                    Box::pin(async move {
                        notifier().await;
                    }) as mq_bridge_models::ports::BoxFuture
                }),
            )
            .await
    }

    async fn listen_to_device_commands(
        &self,
        device_id: &str,
        handler: CommandHandler,
    ) -> BridgeResult<()> {
        let filter = Topics::device_commands_sub(device_id);
        let message_handler = {
            let handler = Arc::clone(&handler);
            Arc::new(move |topic: String, _retained: bool, payload: Vec<u8>| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let Some((device_id, service_id)) = Topics::parse_command_topic(&topic) else {
                        warn!("got command on unexpected topic {topic}");
                        return;
                    };
                    let command: Command = match serde_json::from_slice(&payload) {
                        Ok(command) => command,
                        Err(e) => {
                            warn!(error = %e, "unable to decode command on {topic}");
                            return;
                        }
                    };
                    handler(device_id.to_string(), service_id.to_string(), command).await;
                }) as mq_bridge_models::ports::BoxFuture
            })
        };
        self.conn.subscribe(&filter, message_handler).await?;
        self.command_listeners
            .insert(device_id.to_string(), filter);
        Ok(())
    }

    async fn stop_listen_to_device_commands(&self, device_id: &str) -> BridgeResult<()> {
        let Some((_, filter)) = self.command_listeners.remove(device_id) else {
            return Ok(());
        };
        self.conn.unsubscribe(&filter).await
    }

    async fn set_device(
        &self,
        device_id: &str,
        name: &str,
        device_type_id: &str,
        state: DeviceState,
    ) -> BridgeResult<()> {
        self.send_device_update(DeviceInfoUpdate {
            method: UpdateMethod::Set,
            device_id: device_id.to_string(),
            data: Some(DeviceInfo {
                name: name.to_string(),
                state,
                device_type: device_type_id.to_string(),
            }),
        })
        .await
    }

    async fn remove_device(&self, device_id: &str) -> BridgeResult<()> {
        self.send_device_update(DeviceInfoUpdate {
            method: UpdateMethod::Delete,
            device_id: device_id.to_string(),
            data: None,
        })
        .await
    }

    async fn send_event(
        &self,
        device_id: &str,
        service_id: &str,
        payload: Vec<u8>,
    ) -> BridgeResult<()> {
        self.conn
            .publish(&Topics::event(device_id, service_id), payload)
            .await
            .map_err(|e| BridgeError::Platform(format!("send event: {e}")))
    }

    async fn respond(
        &self,
        device_id: &str,
        service_id: &str,
        response: Command,
    ) -> BridgeResult<()> {
        let payload = serde_json::to_vec(&response)?;
        self.conn
            .publish(&Topics::response(device_id, service_id), payload)
            .await
            .map_err(|e| BridgeError::Platform(format!("send response: {e}")))
    }

    async fn send_client_error(&self, message: &str) {
        self.publish_error(&Topics::client_error(), message).await;
    }

    async fn send_device_error(&self, device_id: &str, message: &str) {
        self.publish_error(&Topics::device_error(device_id), message)
            .await;
    }

    async fn send_command_error(&self, correlation_id: &str, message: &str) {
        self.publish_error(&Topics::command_error(correlation_id), message)
            .await;
    }
}
