//! The bridging core: reconciles topic descriptions against the two broker
//! adapters, correlates platform commands with asynchronous device
//! responses, tracks per-device liveness and applies payload
//! transformations.
//!
//! Everything here talks to the outside world exclusively through the port
//! traits in `mq_bridge_models::ports`.

pub mod bridge;
pub mod command;
pub mod correlation;
pub mod event;
pub mod reconcile;
pub mod registry;
pub mod response;
pub mod tracker;
pub mod transform;
pub mod validation;

pub use bridge::BridgeConnector;
pub use correlation::CorrelationStore;
pub use registry::SharedRegistry;
pub use tracker::OnlineTracker;
