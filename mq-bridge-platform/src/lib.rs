//! Downstream platform client: the fixed topic-based RPC protocol the
//! management plane speaks, implemented over a supervised MQTT connection.

pub mod client;
pub mod topics;

pub use client::PlatformClient;
pub use topics::Topics;
