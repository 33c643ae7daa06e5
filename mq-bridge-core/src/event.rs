//! Inbound upstream events: forward the payload downstream and feed the
//! online-state tracker. The two concerns run as independent tasks.

use crate::{registry::SharedRegistry, tracker::OnlineTracker, transform};
use mq_bridge_models::{
    ports::BoxFuture, MessageHandler, PlatformPort, TopicDescription, TransformationKind,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub(crate) struct EventContext {
    pub events: SharedRegistry<TopicDescription>,
    pub platform: Arc<dyn PlatformPort>,
    pub tracker: OnlineTracker,
    pub debug: bool,
}

/// Build the upstream subscription callback for event topics.
pub(crate) fn event_handler(ctx: EventContext) -> MessageHandler {
    Arc::new(move |topic: String, retained: bool, payload: Vec<u8>| {
        let ctx = ctx.clone();
        Box::pin(async move {
            handle_event(ctx, topic, retained, payload).await;
        }) as BoxFuture
    })
}

async fn handle_event(ctx: EventContext, topic: String, retained: bool, payload: Vec<u8>) {
    let Some(desc) = ctx.events.get(&topic) else {
        warn!("got event for unknown topic description: {topic}");
        return;
    };
    if ctx.debug {
        debug!(
            "event on {topic} (retained: {retained}): {}",
            String::from_utf8_lossy(&payload)
        );
    }

    let forward = {
        let desc = desc.clone();
        let platform = Arc::clone(&ctx.platform);
        let payload = payload.clone();
        tokio::spawn(async move { forward_event(desc, platform, payload).await })
    };
    let track = {
        let platform = Arc::clone(&ctx.platform);
        let tracker = ctx.tracker.clone();
        tokio::spawn(async move { track_state(desc, tracker, platform, retained, payload).await })
    };
    let _ = forward.await;
    let _ = track.await;
}

async fn forward_event(desc: TopicDescription, platform: Arc<dyn PlatformPort>, payload: Vec<u8>) {
    let payload = match transform::apply(&desc, TransformationKind::JsonUnwrapOutput, &payload) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "unable to transform event payload");
            platform
                .send_device_error(
                    &desc.device_local_id,
                    &format!("unable to transform event payload: {e}"),
                )
                .await;
            return;
        }
    };
    if let Err(e) = platform
        .send_event(&desc.device_local_id, &desc.service_local_id, payload)
        .await
    {
        error!(error = %e, "unable to send event to platform");
        platform
            .send_device_error(
                &desc.device_local_id,
                &format!("unable to send event to platform: {e}"),
            )
            .await;
    }
}

/// Run the tracker and announce the device state when it changed.
async fn track_state(
    desc: TopicDescription,
    tracker: OnlineTracker,
    platform: Arc<dyn PlatformPort>,
    retained: bool,
    payload: Vec<u8>,
) {
    let previous = tracker.load_state(&desc);
    let Some(new_state) = tracker.check_and_store(&desc, retained, &payload) else {
        return;
    };
    if previous == Some(new_state) {
        return;
    }
    if let Err(e) = platform
        .set_device(
            &desc.device_local_id,
            &desc.device_name,
            &desc.device_type_id,
            new_state,
        )
        .await
    {
        error!(error = %e, "unable to send device state update to platform");
        platform
            .send_device_error(
                &desc.device_local_id,
                &format!("unable to send device state update: {e}"),
            )
            .await;
    }
}
