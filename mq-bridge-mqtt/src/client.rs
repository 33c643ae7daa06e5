use crate::{
    retry::RetryPolicy,
    router::SubscriptionRouter,
    state::ConnectionState,
    supervisor::{ClientEntry, ConnectionSupervisor, SharedClient},
};
use async_trait::async_trait;
use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{settings::parse_broker_addr, MessageHandler, MqttPort};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS, TlsConfiguration, Transport};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// All bridge traffic rides QoS 2.
pub const QOS: QoS = QoS::ExactlyOnce;

/// Time allowed for the initial broker handshake at construction.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters for one broker link.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub broker_url: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl BrokerOptions {
    pub fn new(broker_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        Self {
            broker_url: broker_url.into(),
            client_id: if client_id.is_empty() {
                generated_client_id()
            } else {
                client_id
            },
            username: String::new(),
            password: String::new(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub(crate) fn build_client(&self) -> (AsyncClient, EventLoop) {
        let (host, port) = parse_broker_addr(&self.broker_url);
        let mut options = MqttOptions::new(self.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);
        if !self.username.is_empty() {
            options.set_credentials(self.username.clone(), self.password.clone());
        }
        if self.broker_url.starts_with("ssl://") || self.broker_url.starts_with("mqtts://") {
            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca: Vec::new(),
                alpn: None,
                client_auth: None,
            }));
        }
        AsyncClient::new(options, 100)
    }
}

fn generated_client_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("mq-bridge-{}", &suffix[..8])
}

/// One supervised broker link implementing [`MqttPort`].
pub struct MqttConnection {
    name: String,
    router: Arc<SubscriptionRouter>,
    shared_client: SharedClient,
    state_rx: watch::Receiver<ConnectionState>,
}

impl MqttConnection {
    /// Spawn the supervisor and wait for the first successful handshake.
    ///
    /// A failed or timed-out first connect is the only fatal condition of
    /// this crate; once connected the supervisor retries forever (or per
    /// the given policy).
    pub async fn connect(
        options: BrokerOptions,
        retry_policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> BridgeResult<Arc<Self>> {
        let name = options.client_id.clone();
        let router = Arc::new(SubscriptionRouter::new());
        let shared_client: SharedClient = Arc::new(ClientEntry::new_empty());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let supervisor_cancel = cancel.child_token();
        ConnectionSupervisor::new(
            options,
            retry_policy,
            supervisor_cancel.clone(),
            state_tx,
            Arc::clone(&router),
            Arc::clone(&shared_client),
        )
        .run();

        let connection = Arc::new(Self {
            name,
            router,
            shared_client,
            state_rx,
        });

        if let Err(e) = connection.wait_connected().await {
            supervisor_cancel.cancel();
            return Err(e);
        }
        info!("mqtt connection [{}] ready", connection.name);
        Ok(connection)
    }

    async fn wait_connected(&self) -> BridgeResult<()> {
        let mut state_rx = self.state_rx.clone();
        let wait = async {
            loop {
                let state = state_rx.borrow().clone();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Failed(reason) => {
                        return Err(BridgeError::Mqtt(format!(
                            "unable to connect [{}]: {reason}",
                            self.name
                        )))
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(BridgeError::Mqtt(format!(
                        "mqtt supervisor [{}] terminated before connecting",
                        self.name
                    )));
                }
            }
        };
        tokio::time::timeout(CONNECT_TIMEOUT, wait)
            .await
            .map_err(|_| {
                BridgeError::Mqtt(format!("timeout connecting to broker [{}]", self.name))
            })?
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    fn client(&self) -> BridgeResult<Arc<AsyncClient>> {
        self.shared_client
            .client
            .load_full()
            .ok_or(BridgeError::NotConnected)
    }
}

#[async_trait]
impl MqttPort for MqttConnection {
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> BridgeResult<()> {
        let client = self.client()?;
        client
            .subscribe(topic, QOS)
            .await
            .map_err(|e| BridgeError::Mqtt(format!("subscribe {topic}: {e}")))?;
        self.router.register(topic, handler).await;
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> BridgeResult<()> {
        let client = self.client()?;
        client
            .unsubscribe(topic)
            .await
            .map_err(|e| BridgeError::Mqtt(format!("unsubscribe {topic}: {e}")))?;
        self.router.unregister(topic).await;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()> {
        let client = self.client()?;
        client
            .publish(topic, QOS, false, payload)
            .await
            .map_err(|e| BridgeError::Mqtt(format!("publish {topic}: {e}")))
    }
}
