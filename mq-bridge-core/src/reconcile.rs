//! One reconciliation pass: diff the desired description set against the
//! live registries and drive both brokers to converge with minimum churn.
//!
//! The pass runs under the coordinator lock. Any adapter failure aborts
//! it; the next pass starts over from the fresh provider snapshot.

use crate::{
    command::{command_handler, CommandContext},
    correlation::CorrelationStore,
    event::{event_handler, EventContext},
    registry::SharedRegistry,
    response::{response_handler, ResponseContext},
    tracker::OnlineTracker,
    validation,
};
use mq_bridge_error::BridgeResult;
use mq_bridge_models::{DeviceState, MqttPort, PlatformPort, TopicDescription};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{debug, error, info};

#[derive(Clone)]
pub(crate) struct ReconcileContext {
    pub events: SharedRegistry<TopicDescription>,
    pub responses: SharedRegistry<TopicDescription>,
    pub commands: SharedRegistry<TopicDescription>,
    pub correlations: CorrelationStore,
    pub tracker: OnlineTracker,
    pub platform: Arc<dyn PlatformPort>,
    pub command_mqtt: Arc<dyn MqttPort>,
    pub event_mqtt: Arc<dyn MqttPort>,
    pub delete_devices: bool,
    pub debug: bool,
}

impl ReconcileContext {
    fn event_context(&self) -> EventContext {
        EventContext {
            events: self.events.clone(),
            platform: Arc::clone(&self.platform),
            tracker: self.tracker.clone(),
            debug: self.debug,
        }
    }

    fn response_context(&self) -> ResponseContext {
        ResponseContext {
            responses: self.responses.clone(),
            correlations: self.correlations.clone(),
            platform: Arc::clone(&self.platform),
            debug: self.debug,
        }
    }

    fn command_context(&self) -> CommandContext {
        CommandContext {
            commands: self.commands.clone(),
            correlations: self.correlations.clone(),
            mqtt: Arc::clone(&self.command_mqtt),
            platform: Arc::clone(&self.platform),
            debug: self.debug,
        }
    }
}

pub(crate) async fn reconcile(
    ctx: &ReconcileContext,
    descriptions: Vec<TopicDescription>,
) -> BridgeResult<()> {
    let descriptions = validation::validate(descriptions)?;

    // index new services before any of their events can fire
    ctx.tracker.preprocess(&descriptions).await?;

    let events: Vec<&TopicDescription> = descriptions
        .iter()
        .filter(|d| !d.event_topic.is_empty())
        .collect();
    let commands: Vec<&TopicDescription> = descriptions
        .iter()
        .filter(|d| !d.cmd_topic.is_empty())
        .collect();
    let responses: Vec<&TopicDescription> = commands
        .iter()
        .copied()
        .filter(|d| !d.resp_topic.is_empty())
        .collect();

    let old_events = ctx.events.get_all();
    let old_responses = ctx.responses.get_all();
    let old_commands = ctx.commands.get_all();

    let mut old_devices: HashMap<String, TopicDescription> = HashMap::new();
    let mut used_devices: HashMap<String, TopicDescription> = HashMap::new();

    // events
    let mut used_events: HashSet<&str> = HashSet::new();
    for desc in &events {
        used_events.insert(desc.event_topic.as_str());
        used_devices.insert(desc.device_local_id.clone(), (*desc).clone());
        match old_events.get(&desc.event_topic) {
            None => add_event(ctx, desc).await?,
            Some(old) if old != *desc => update_event(ctx, desc).await?,
            Some(_) => {}
        }
    }
    for (topic, desc) in &old_events {
        old_devices.insert(desc.device_local_id.clone(), desc.clone());
        if !used_events.contains(topic.as_str()) {
            remove_event(ctx, topic).await?;
        }
    }

    // responses
    let mut used_responses: HashSet<&str> = HashSet::new();
    for desc in &responses {
        used_responses.insert(desc.resp_topic.as_str());
        used_devices.insert(desc.device_local_id.clone(), (*desc).clone());
        match old_responses.get(&desc.resp_topic) {
            None => add_response(ctx, desc).await?,
            Some(old) if old != *desc => update_response(ctx, desc).await?,
            Some(_) => {}
        }
    }
    for (topic, desc) in &old_responses {
        old_devices.insert(desc.device_local_id.clone(), desc.clone());
        if !used_responses.contains(topic.as_str()) {
            remove_response(ctx, topic).await?;
        }
    }

    // commands are not subscribed, only indexed
    let mut used_commands: HashSet<String> = HashSet::new();
    for desc in &commands {
        used_devices.insert(desc.device_local_id.clone(), (*desc).clone());
        let key = desc.command_key();
        used_commands.insert(key.clone());
        ctx.commands.set(key, (*desc).clone());
    }
    for (key, desc) in &old_commands {
        old_devices.insert(desc.device_local_id.clone(), desc.clone());
        if !used_commands.contains(key) {
            ctx.commands.remove(key);
        }
    }

    // retire devices no description references anymore
    for (device_id, old_desc) in &old_devices {
        if !used_devices.contains_key(device_id) {
            remove_device(ctx, old_desc).await?;
        }
    }

    // announce the current device set
    for (device_id, desc) in &used_devices {
        let state = ctx
            .tracker
            .load_state(desc)
            .unwrap_or(DeviceState::Online);
        if let Err(e) = ctx
            .platform
            .set_device(device_id, &desc.device_name, &desc.device_type_id, state)
            .await
        {
            error!(error = %e, "unable to send device info to platform");
            ctx.platform
                .send_client_error(&format!("unable to send device info to platform: {e}"))
                .await;
            return Err(e);
        }
        if !old_devices.contains_key(device_id) {
            add_device_command_listener(ctx, desc).await?;
        }
    }

    Ok(())
}

async fn add_event(ctx: &ReconcileContext, desc: &TopicDescription) -> BridgeResult<()> {
    ctx.event_mqtt
        .subscribe(&desc.event_topic, event_handler(ctx.event_context()))
        .await?;
    ctx.events.set(desc.event_topic.clone(), desc.clone());
    Ok(())
}

/// Unsubscribe-then-resubscribe so the new handler captures the new
/// description.
async fn update_event(ctx: &ReconcileContext, desc: &TopicDescription) -> BridgeResult<()> {
    remove_event(ctx, &desc.event_topic).await?;
    add_event(ctx, desc).await
}

async fn remove_event(ctx: &ReconcileContext, topic: &str) -> BridgeResult<()> {
    if ctx.events.get(topic).is_none() {
        return Ok(());
    }
    ctx.event_mqtt.unsubscribe(topic).await?;
    ctx.events.remove(topic);
    Ok(())
}

async fn add_response(ctx: &ReconcileContext, desc: &TopicDescription) -> BridgeResult<()> {
    ctx.command_mqtt
        .subscribe(&desc.resp_topic, response_handler(ctx.response_context()))
        .await?;
    ctx.responses.set(desc.resp_topic.clone(), desc.clone());
    Ok(())
}

async fn update_response(ctx: &ReconcileContext, desc: &TopicDescription) -> BridgeResult<()> {
    remove_response(ctx, &desc.resp_topic).await?;
    add_response(ctx, desc).await
}

async fn remove_response(ctx: &ReconcileContext, topic: &str) -> BridgeResult<()> {
    if ctx.responses.get(topic).is_none() {
        return Ok(());
    }
    ctx.command_mqtt.unsubscribe(topic).await?;
    ctx.responses.remove(topic);
    Ok(())
}

async fn add_device_command_listener(
    ctx: &ReconcileContext,
    desc: &TopicDescription,
) -> BridgeResult<()> {
    if ctx.debug {
        debug!("add device command listener: {}", desc.log_summary());
    }
    if let Err(e) = ctx
        .platform
        .listen_to_device_commands(&desc.device_local_id, command_handler(ctx.command_context()))
        .await
    {
        error!(error = %e, "unable to subscribe to device commands");
        ctx.platform
            .send_client_error(&format!("unable to subscribe to device commands: {e}"))
            .await;
        return Err(e);
    }
    Ok(())
}

async fn remove_device(ctx: &ReconcileContext, desc: &TopicDescription) -> BridgeResult<()> {
    if ctx.debug {
        debug!("remove device: {}", desc.log_summary());
    }
    ctx.platform
        .stop_listen_to_device_commands(&desc.device_local_id)
        .await?;
    if ctx.delete_devices {
        info!(
            "delete device {} ({})",
            desc.device_name, desc.device_local_id
        );
        ctx.platform.remove_device(&desc.device_local_id).await?;
    } else {
        info!(
            "topic description has been removed but device deletion is disabled: {} ({})",
            desc.device_name, desc.device_local_id
        );
    }
    ctx.tracker.forget_device(&desc.device_local_id);
    Ok(())
}
