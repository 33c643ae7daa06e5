//! Capability traits at the seams of the bridging core.
//!
//! The adapter crates implement these; the core only ever talks through
//! them, which keeps broker and repository internals out of the core and
//! lets component tests substitute recording mocks.

use crate::{metadata::Service, platform::Command, platform::DeviceState};
use async_trait::async_trait;
use mq_bridge_error::BridgeResult;
use std::{future::Future, pin::Pin, sync::Arc};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback invoked for every message on a subscribed upstream topic:
/// `(topic, retained, payload)`.
pub type MessageHandler = Arc<dyn Fn(String, bool, Vec<u8>) -> BoxFuture + Send + Sync>;

/// Callback invoked for every platform command addressed to a listened
/// device: `(device_local_id, service_local_id, command)`.
pub type CommandHandler = Arc<dyn Fn(String, String, Command) -> BoxFuture + Send + Sync>;

/// Callback invoked for every refresh signal from the platform.
pub type RefreshHandler = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

/// Upstream broker capabilities. All traffic is QoS 2; publishes are
/// non-retained.
#[async_trait]
pub trait MqttPort: Send + Sync {
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> BridgeResult<()>;
    async fn unsubscribe(&self, topic: &str) -> BridgeResult<()>;
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()>;
}

/// Downstream platform capabilities.
///
/// The error channels are fire-and-forget: a failure to deliver an error
/// message is itself only logged.
#[async_trait]
pub trait PlatformPort: Send + Sync {
    /// Subscribe to the platform refresh signal; any message fires the
    /// notifier.
    async fn listen_to_refresh(&self, notifier: RefreshHandler) -> BridgeResult<()>;
    async fn listen_to_device_commands(
        &self,
        device_id: &str,
        handler: CommandHandler,
    ) -> BridgeResult<()>;
    async fn stop_listen_to_device_commands(&self, device_id: &str) -> BridgeResult<()>;
    async fn set_device(
        &self,
        device_id: &str,
        name: &str,
        device_type_id: &str,
        state: DeviceState,
    ) -> BridgeResult<()>;
    async fn remove_device(&self, device_id: &str) -> BridgeResult<()>;
    async fn send_event(
        &self,
        device_id: &str,
        service_id: &str,
        payload: Vec<u8>,
    ) -> BridgeResult<()>;
    async fn respond(
        &self,
        device_id: &str,
        service_id: &str,
        response: Command,
    ) -> BridgeResult<()>;

    async fn send_client_error(&self, message: &str);
    async fn send_device_error(&self, device_id: &str, message: &str);
    async fn send_command_error(&self, correlation_id: &str, message: &str);
}

/// Read access to device-type metadata, backed by the device repository
/// and its cache.
#[async_trait]
pub trait MetadataRepo: Send + Sync {
    async fn get_service(
        &self,
        device_type_id: &str,
        local_service_id: &str,
    ) -> BridgeResult<Service>;
}

/// Source of the desired topic description set, queried once per
/// reconciliation pass.
#[async_trait]
pub trait DescriptionProvider: Send + Sync {
    async fn descriptions(&self) -> BridgeResult<Vec<crate::topic::TopicDescription>>;
}
