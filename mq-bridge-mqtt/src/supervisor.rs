use crate::{
    client::{BrokerOptions, QOS},
    retry::{build_exponential_backoff, RetryPolicy},
    router::SubscriptionRouter,
    state::ConnectionState,
};
use arc_swap::ArcSwapOption;
use backoff::backoff::Backoff;
use rumqttc::{AsyncClient, Event, EventLoop, Packet};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared client slot, swapped atomically by the supervisor on
/// connect/disconnect so callers read it lock-free.
pub(crate) struct ClientEntry {
    pub client: ArcSwapOption<AsyncClient>,
    pub healthy: AtomicBool,
}

impl ClientEntry {
    pub fn new_empty() -> Self {
        Self {
            client: ArcSwapOption::from(None),
            healthy: AtomicBool::new(false),
        }
    }
}

pub(crate) type SharedClient = Arc<ClientEntry>;

/// Owns the rumqttc event loop: connects, dispatches, reconnects with
/// exponential backoff and replays subscriptions after every reconnect.
pub(crate) struct ConnectionSupervisor {
    options: BrokerOptions,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    router: Arc<SubscriptionRouter>,
    shared_client: SharedClient,
}

impl ConnectionSupervisor {
    pub fn new(
        options: BrokerOptions,
        retry_policy: RetryPolicy,
        cancel: CancellationToken,
        state_tx: watch::Sender<ConnectionState>,
        router: Arc<SubscriptionRouter>,
        shared_client: SharedClient,
    ) -> Self {
        Self {
            options,
            retry_policy,
            cancel,
            state_tx,
            router,
            shared_client,
        }
    }

    /// Run the supervisor loop on its own task.
    pub fn run(self) {
        let name = self.options.client_id.clone();
        tokio::spawn(async move {
            let mut bo = build_exponential_backoff(&self.retry_policy);
            let mut attempt: u32 = 0;

            let should_retry = |current_attempt: u32| -> bool {
                match self.retry_policy.max_attempts {
                    None | Some(0) => true,
                    Some(max) => current_attempt < max,
                }
            };

            loop {
                if self.cancel.is_cancelled() {
                    let _ = self.state_tx.send(ConnectionState::Disconnected);
                    info!("mqtt supervisor [{name}] cancelled");
                    break;
                }

                if !should_retry(attempt) {
                    let _ = self.state_tx.send(ConnectionState::Failed(format!(
                        "max retry attempts ({:?}) exhausted",
                        self.retry_policy.max_attempts
                    )));
                    warn!("mqtt supervisor [{name}] exhausted retry attempts");
                    break;
                }

                attempt += 1;
                let _ = self.state_tx.send(ConnectionState::Connecting);
                debug!(attempt, "mqtt supervisor [{name}] attempting connection");

                let (client, event_loop) = self.options.build_client();
                let seen_active = Self::run_event_loop(
                    client,
                    event_loop,
                    &name,
                    Arc::clone(&self.router),
                    self.cancel.clone(),
                    self.state_tx.clone(),
                    Arc::clone(&self.shared_client),
                )
                .await;

                if seen_active {
                    bo.reset();
                    attempt = 0;
                }

                if self.cancel.is_cancelled() {
                    let _ = self.state_tx.send(ConnectionState::Disconnected);
                    info!("mqtt supervisor [{name}] cancelled after event loop");
                    break;
                }

                match bo.next_backoff() {
                    Some(delay) => {
                        let _ = self.state_tx.send(ConnectionState::Reconnecting);
                        info!(
                            delay_ms = delay.as_millis() as u64,
                            "mqtt supervisor [{name}] reconnect backoff"
                        );
                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                let _ = self.state_tx.send(ConnectionState::Disconnected);
                                break;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        warn!("mqtt supervisor [{name}] backoff time exhausted");
                        let _ = self
                            .state_tx
                            .send(ConnectionState::Failed("backoff time exhausted".into()));
                        break;
                    }
                }
            }

            info!("mqtt supervisor [{name}] loop terminated");
        });
    }

    /// Poll the event loop until disconnection or cancellation. Returns
    /// whether the connection was ever established.
    async fn run_event_loop(
        client: AsyncClient,
        mut event_loop: EventLoop,
        name: &str,
        router: Arc<SubscriptionRouter>,
        cancel: CancellationToken,
        state_tx: watch::Sender<ConnectionState>,
        shared_client: SharedClient,
    ) -> bool {
        let mut seen_active = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("mqtt event loop [{name}] cancelled, disconnecting");
                    shared_client.client.store(None);
                    shared_client.healthy.store(false, Ordering::Release);
                    let _ = state_tx.send(ConnectionState::Disconnected);
                    let _ = client.disconnect().await;
                    break;
                }
                result = event_loop.poll() => {
                    match result {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("mqtt connection [{name}] established");
                            seen_active = true;
                            shared_client.client.store(Some(Arc::new(client.clone())));
                            shared_client.healthy.store(true, Ordering::Release);
                            let _ = state_tx.send(ConnectionState::Connected);
                            Self::resubscribe(&client, &router, name).await;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            router
                                .route(&publish.topic, publish.retain, publish.payload.to_vec())
                                .await;
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            warn!("mqtt broker [{name}] sent disconnect");
                            shared_client.client.store(None);
                            shared_client.healthy.store(false, Ordering::Release);
                            let _ = state_tx.send(ConnectionState::Disconnected);
                            break;
                        }
                        Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                        Err(e) => {
                            warn!(error = %e, "mqtt event loop [{name}] error");
                            shared_client.client.store(None);
                            shared_client.healthy.store(false, Ordering::Release);
                            let _ = state_tx.send(ConnectionState::Failed(e.to_string()));
                            break;
                        }
                    }
                }
            }
        }

        seen_active
    }

    /// Replay the registered subscription set after a (re)connect.
    async fn resubscribe(client: &AsyncClient, router: &SubscriptionRouter, name: &str) {
        for filter in router.filters().await {
            debug!("mqtt connection [{name}] resubscribing to {filter}");
            if let Err(e) = client.subscribe(filter.as_str(), QOS).await {
                warn!(error = %e, "mqtt connection [{name}] failed to resubscribe to {filter}");
            }
        }
    }
}
