//! Asynchronous device responses: match them back to the oldest pending
//! command of their (device, service) pair and relay downstream.

use crate::{correlation::CorrelationStore, registry::SharedRegistry, transform};
use mq_bridge_models::{
    ports::BoxFuture, Command, MessageHandler, PlatformPort, TopicDescription, TransformationKind,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub(crate) struct ResponseContext {
    pub responses: SharedRegistry<TopicDescription>,
    pub correlations: CorrelationStore,
    pub platform: Arc<dyn PlatformPort>,
    pub debug: bool,
}

/// Build the upstream subscription callback for response topics.
pub(crate) fn response_handler(ctx: ResponseContext) -> MessageHandler {
    Arc::new(move |topic: String, _retained: bool, payload: Vec<u8>| {
        let ctx = ctx.clone();
        Box::pin(async move {
            handle_response(ctx, topic, payload).await;
        }) as BoxFuture
    })
}

async fn handle_response(ctx: ResponseContext, topic: String, payload: Vec<u8>) {
    let Some(desc) = ctx.responses.get(&topic) else {
        warn!("got response for unknown topic description: {topic}");
        return;
    };
    if ctx.debug {
        debug!("response on {topic}: {}", String::from_utf8_lossy(&payload));
    }

    let payload = match transform::apply(&desc, TransformationKind::JsonUnwrapOutput, &payload) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "unable to transform response payload");
            ctx.platform
                .send_device_error(
                    &desc.device_local_id,
                    &format!("unable to transform response payload: {e}"),
                )
                .await;
            return;
        }
    };

    let Some(correlation_id) = ctx.correlations.pop(&desc.command_key()) else {
        // legitimate after a command's correlation entry expired
        debug!("got response without pending correlation id on {topic}");
        return;
    };

    if let Err(e) = ctx
        .platform
        .respond(
            &desc.device_local_id,
            &desc.service_local_id,
            Command {
                command_id: correlation_id,
                data: String::from_utf8_lossy(&payload).into_owned(),
            },
        )
        .await
    {
        error!(error = %e, "unable to send response to platform");
    }
}
