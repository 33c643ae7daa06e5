//! Shared recording mocks for the core component tests.

use async_trait::async_trait;
use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{
    settings::{Inner, OnlineCheckSettings},
    Command, CommandHandler, DescriptionProvider, DeviceState, MessageHandler, MetadataRepo,
    MqttPort, PlatformPort, RefreshHandler, Service, Settings, TopicDescription,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

/// Upstream broker mock: records calls and lets tests inject messages into
/// subscribed handlers.
#[derive(Default)]
pub struct MockMqtt {
    handlers: Mutex<HashMap<String, MessageHandler>>,
    pub subscribed: Mutex<Vec<String>>,
    pub unsubscribed: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail_publish: AtomicBool,
    pub fail_subscribe: AtomicBool,
}

impl MockMqtt {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Topics with a live subscription right now.
    pub fn live_subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.lock().unwrap().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Inject an upstream message; panics when nothing is subscribed.
    pub async fn deliver(&self, topic: &str, retained: bool, payload: &[u8]) {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .unwrap_or_else(|| panic!("no subscription for topic {topic}"));
        handler(topic.to_string(), retained, payload.to_vec()).await;
    }

    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl MqttPort for MockMqtt {
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> BridgeResult<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BridgeError::Mqtt("subscribe refused".into()));
        }
        self.subscribed.lock().unwrap().push(topic.to_string());
        self.handlers
            .lock()
            .unwrap()
            .insert(topic.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> BridgeResult<()> {
        self.unsubscribed.lock().unwrap().push(topic.to_string());
        self.handlers.lock().unwrap().remove(topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BridgeError::Mqtt("publish refused".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// Recorded `set_device` call: (device_id, name, device_type, state).
pub type SetDeviceCall = (String, String, String, DeviceState);

/// Platform mock: records every outbound call and lets tests inject
/// commands into registered listeners.
#[derive(Default)]
pub struct MockPlatform {
    listeners: Mutex<HashMap<String, CommandHandler>>,
    refresh_notifier: Mutex<Option<RefreshHandler>>,
    pub set_devices: Mutex<Vec<SetDeviceCall>>,
    pub removed_devices: Mutex<Vec<String>>,
    pub stopped_listeners: Mutex<Vec<String>>,
    pub events: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub responses: Mutex<Vec<(String, String, Command)>>,
    pub client_errors: Mutex<Vec<String>>,
    pub device_errors: Mutex<Vec<(String, String)>>,
    pub command_errors: Mutex<Vec<(String, String)>>,
    pub fail_set_device: AtomicBool,
    pub fail_send_event: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn listened_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.listeners.lock().unwrap().keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Inject a platform command for a listened device.
    pub async fn send_command(&self, device_id: &str, service_id: &str, command: Command) {
        let handler = self
            .listeners
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| panic!("no command listener for device {device_id}"));
        handler(device_id.to_string(), service_id.to_string(), command).await;
    }

    /// Fire the refresh signal the coordinator subscribed to.
    pub async fn trigger_refresh(&self) {
        let notifier = self
            .refresh_notifier
            .lock()
            .unwrap()
            .clone()
            .expect("no refresh notifier registered");
        notifier().await;
    }
}

#[async_trait]
impl PlatformPort for MockPlatform {
    async fn listen_to_refresh(&self, notifier: RefreshHandler) -> BridgeResult<()> {
        *self.refresh_notifier.lock().unwrap() = Some(notifier);
        Ok(())
    }

    async fn listen_to_device_commands(
        &self,
        device_id: &str,
        handler: CommandHandler,
    ) -> BridgeResult<()> {
        self.listeners
            .lock()
            .unwrap()
            .insert(device_id.to_string(), handler);
        Ok(())
    }

    async fn stop_listen_to_device_commands(&self, device_id: &str) -> BridgeResult<()> {
        self.stopped_listeners
            .lock()
            .unwrap()
            .push(device_id.to_string());
        self.listeners.lock().unwrap().remove(device_id);
        Ok(())
    }

    async fn set_device(
        &self,
        device_id: &str,
        name: &str,
        device_type_id: &str,
        state: DeviceState,
    ) -> BridgeResult<()> {
        if self.fail_set_device.load(Ordering::SeqCst) {
            return Err(BridgeError::Platform("set_device refused".into()));
        }
        self.set_devices.lock().unwrap().push((
            device_id.to_string(),
            name.to_string(),
            device_type_id.to_string(),
            state,
        ));
        Ok(())
    }

    async fn remove_device(&self, device_id: &str) -> BridgeResult<()> {
        self.removed_devices
            .lock()
            .unwrap()
            .push(device_id.to_string());
        Ok(())
    }

    async fn send_event(
        &self,
        device_id: &str,
        service_id: &str,
        payload: Vec<u8>,
    ) -> BridgeResult<()> {
        if self.fail_send_event.load(Ordering::SeqCst) {
            return Err(BridgeError::Platform("send_event refused".into()));
        }
        self.events.lock().unwrap().push((
            device_id.to_string(),
            service_id.to_string(),
            payload,
        ));
        Ok(())
    }

    async fn respond(
        &self,
        device_id: &str,
        service_id: &str,
        response: Command,
    ) -> BridgeResult<()> {
        self.responses.lock().unwrap().push((
            device_id.to_string(),
            service_id.to_string(),
            response,
        ));
        Ok(())
    }

    async fn send_client_error(&self, message: &str) {
        self.client_errors.lock().unwrap().push(message.to_string());
    }

    async fn send_device_error(&self, device_id: &str, message: &str) {
        self.device_errors
            .lock()
            .unwrap()
            .push((device_id.to_string(), message.to_string()));
    }

    async fn send_command_error(&self, correlation_id: &str, message: &str) {
        self.command_errors
            .lock()
            .unwrap()
            .push((correlation_id.to_string(), message.to_string()));
    }
}

/// Metadata repository mock serving a static service table.
#[derive(Default)]
pub struct MockRepo {
    services: Mutex<HashMap<(String, String), Service>>,
}

impl MockRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, device_type_id: &str, local_service_id: &str, service: Service) {
        self.services.lock().unwrap().insert(
            (device_type_id.to_string(), local_service_id.to_string()),
            service,
        );
    }
}

#[async_trait]
impl MetadataRepo for MockRepo {
    async fn get_service(
        &self,
        device_type_id: &str,
        local_service_id: &str,
    ) -> BridgeResult<Service> {
        self.services
            .lock()
            .unwrap()
            .get(&(device_type_id.to_string(), local_service_id.to_string()))
            .cloned()
            .ok_or_else(|| BridgeError::Repository("service not found".into()))
    }
}

/// Provider serving a swappable in-memory description list.
#[derive(Default)]
pub struct StaticProvider {
    descriptions: Mutex<Vec<TopicDescription>>,
    pub calls: Mutex<usize>,
}

impl StaticProvider {
    pub fn new(descriptions: Vec<TopicDescription>) -> Arc<Self> {
        Arc::new(Self {
            descriptions: Mutex::new(descriptions),
            calls: Mutex::new(0),
        })
    }

    pub fn set(&self, descriptions: Vec<TopicDescription>) {
        *self.descriptions.lock().unwrap() = descriptions;
    }
}

#[async_trait]
impl DescriptionProvider for StaticProvider {
    async fn descriptions(&self) -> BridgeResult<Vec<TopicDescription>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.descriptions.lock().unwrap().clone())
    }
}

/// Settings with the tracker disabled and no periodic tick.
pub fn test_settings() -> Settings {
    Inner {
        connector_id: "test".into(),
        max_correlation_id_age: "1m".into(),
        ..Default::default()
    }
    .into()
}

/// Settings with a custom correlation TTL.
pub fn test_settings_with_correlation_age(age: &str) -> Settings {
    Inner {
        connector_id: "test".into(),
        max_correlation_id_age: age.into(),
        ..Default::default()
    }
    .into()
}

/// Settings with the online tracker enabled.
pub fn test_settings_with_tracker() -> Settings {
    Inner {
        connector_id: "test".into(),
        max_correlation_id_age: "1m".into(),
        online_check: OnlineCheckSettings {
            enabled: true,
            function_id: "urn:fn:online".into(),
            boolean_characteristic_id: "urn:char:bool".into(),
            protocol_data_field: "data".into(),
        },
        ..Default::default()
    }
    .into()
}

pub fn event_desc(device: &str, service: &str, topic: &str) -> TopicDescription {
    TopicDescription {
        event_topic: topic.into(),
        device_local_id: device.into(),
        device_name: format!("{device} name"),
        device_type_id: format!("{device}-type"),
        service_local_id: service.into(),
        ..Default::default()
    }
}

pub fn cmd_desc(device: &str, service: &str, cmd: &str, resp: &str) -> TopicDescription {
    TopicDescription {
        cmd_topic: cmd.into(),
        resp_topic: resp.into(),
        device_local_id: device.into(),
        device_name: format!("{device} name"),
        device_type_id: format!("{device}-type"),
        service_local_id: service.into(),
        ..Default::default()
    }
}
