//! The bridge coordinator: owns the reconciliation lock, the periodic
//! tick and the platform refresh signal.

use crate::{
    correlation::CorrelationStore, reconcile, reconcile::ReconcileContext, registry::SharedRegistry,
    tracker::OnlineTracker,
};
use mq_bridge_error::BridgeResult;
use mq_bridge_models::{
    ports::BoxFuture, DescriptionProvider, MetadataRepo, MqttPort, PlatformPort, Settings,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct BridgeConnector {
    ctx: ReconcileContext,
    provider: Arc<dyn DescriptionProvider>,
    update_lock: Mutex<()>,
}

impl BridgeConnector {
    /// Wire the core, start the periodic tick and the refresh-signal
    /// listener, and run the first reconciliation pass.
    ///
    /// A failing first pass is reported like any later one and does not
    /// abort construction; only adapter construction failures are fatal
    /// to the process.
    pub async fn start(
        settings: Settings,
        provider: Arc<dyn DescriptionProvider>,
        platform: Arc<dyn PlatformPort>,
        command_mqtt: Arc<dyn MqttPort>,
        event_mqtt: Arc<dyn MqttPort>,
        repo: Arc<dyn MetadataRepo>,
        cancel: CancellationToken,
    ) -> BridgeResult<Arc<Self>> {
        let correlations = CorrelationStore::new(settings.max_correlation_id_age_duration()?);
        let tracker = OnlineTracker::new(settings.online_check.clone(), repo);
        let ctx = ReconcileContext {
            events: SharedRegistry::new(),
            responses: SharedRegistry::new(),
            commands: SharedRegistry::new(),
            correlations,
            tracker,
            platform: Arc::clone(&platform),
            command_mqtt,
            event_mqtt,
            delete_devices: settings.delete_devices,
            debug: settings.debug,
        };
        let connector = Arc::new(Self {
            ctx,
            provider,
            update_lock: Mutex::new(()),
        });

        if let Some(period) = settings.update_period_duration()? {
            let ticker_connector = Arc::clone(&connector);
            let ticker_cancel = cancel.clone();
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut ticker = tokio::time::interval_at(start, period);
                loop {
                    tokio::select! {
                        _ = ticker_cancel.cancelled() => {
                            info!("periodic topic registry update stopped");
                            return;
                        }
                        _ = ticker.tick() => {
                            ticker_connector.refresh().await;
                        }
                    }
                }
            });
        }

        let refresh_connector = Arc::clone(&connector);
        platform
            .listen_to_refresh(Arc::new(move || {
                let connector = Arc::clone(&refresh_connector);
                Box::pin(async move {
                    connector.refresh().await;
                }) as BoxFuture
            }))
            .await?;

        connector.refresh().await;
        Ok(connector)
    }

    /// Run one reconciliation pass. Callable from any task; concurrent
    /// callers queue on the update lock. Failures are reported to the
    /// platform and logged, never propagated.
    pub async fn refresh(&self) {
        if let Err(e) = self.update_topics().await {
            error!(error = %e, "unable to update topic registry");
            self.ctx
                .platform
                .send_client_error(&format!("unable to update topic registry: {e}"))
                .await;
        }
    }

    async fn update_topics(&self) -> BridgeResult<()> {
        let _guard = self.update_lock.lock().await;
        let descriptions = self.provider.descriptions().await?;
        reconcile::reconcile(&self.ctx, descriptions).await
    }
}
