//! Platform commands: publish to the device's command topic, keep the
//! correlation id around while a response is expected, synthesize the
//! reply for fire-and-forget commands.

use crate::{correlation::CorrelationStore, registry::SharedRegistry, transform};
use mq_bridge_models::{
    command_key, ports::BoxFuture, Command, CommandHandler, MqttPort, PlatformPort,
    TopicDescription, TransformationKind,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub(crate) struct CommandContext {
    pub commands: SharedRegistry<TopicDescription>,
    pub correlations: CorrelationStore,
    pub mqtt: Arc<dyn MqttPort>,
    pub platform: Arc<dyn PlatformPort>,
    pub debug: bool,
}

/// Build the platform command callback for a listened device.
pub(crate) fn command_handler(ctx: CommandContext) -> CommandHandler {
    Arc::new(
        move |device_id: String, service_id: String, command: Command| {
            let ctx = ctx.clone();
            Box::pin(async move {
                handle_command(ctx, device_id, service_id, command).await;
            }) as BoxFuture
        },
    )
}

async fn handle_command(
    ctx: CommandContext,
    device_id: String,
    service_id: String,
    command: Command,
) {
    let key = command_key(&device_id, &service_id);
    let Some(desc) = ctx.commands.get(&key) else {
        warn!("got command for unknown device description: {key}");
        return;
    };
    if ctx.debug {
        debug!("command {} for {key}: {}", command.command_id, command.data);
    }

    // store before publishing so an early response cannot miss its id
    let expects_device_response = !desc.resp_topic.is_empty();
    if expects_device_response {
        ctx.correlations.store(&key, &command.command_id);
    }

    let payload = match transform::apply(
        &desc,
        TransformationKind::JsonUnwrapInput,
        command.data.as_bytes(),
    ) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "unable to transform command payload");
            if expects_device_response {
                ctx.correlations.remove(&key, &command.command_id);
            }
            ctx.platform
                .send_command_error(
                    &command.command_id,
                    &format!("unable to transform command payload: {e}"),
                )
                .await;
            return;
        }
    };

    if let Err(e) = ctx.mqtt.publish(&desc.cmd_topic, payload).await {
        error!(error = %e, "unable to publish command upstream");
        if expects_device_response {
            ctx.correlations.remove(&key, &command.command_id);
        }
        ctx.platform
            .send_command_error(
                &command.command_id,
                &format!("unable to publish command upstream: {e}"),
            )
            .await;
        return;
    }

    // request/reply still holds for fire-and-forget commands
    if !expects_device_response {
        if let Err(e) = ctx
            .platform
            .respond(
                &device_id,
                &service_id,
                Command {
                    command_id: command.command_id.clone(),
                    data: String::new(),
                },
            )
            .await
        {
            error!(error = %e, "unable to send empty response to platform");
        }
    }
}
