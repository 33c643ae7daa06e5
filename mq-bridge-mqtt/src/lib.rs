//! Supervised MQTT connection shared by the upstream broker adapters and
//! the platform client.
//!
//! The supervisor owns the rumqttc event loop, reconnects with exponential
//! backoff and replays the subscription set after every reconnect; consumers
//! only see the [`MqttPort`](mq_bridge_models::MqttPort) capability surface.

pub mod client;
pub mod retry;
pub mod router;
pub mod state;
mod supervisor;

pub use client::{BrokerOptions, MqttConnection, QOS};
pub use retry::{build_exponential_backoff, RetryPolicy};
pub use state::ConnectionState;
