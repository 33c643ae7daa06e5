//! Subscription registry and message dispatch.
//!
//! The registry doubles as the resubscribe set: after a reconnect the
//! supervisor replays every registered filter so handlers survive broker
//! restarts.

use mq_bridge_models::MessageHandler;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct SubscriptionRouter {
    routes: RwLock<Vec<(String, MessageHandler)>>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler for a topic filter, replacing a previous handler
    /// on the same filter.
    pub async fn register(&self, filter: impl Into<String>, handler: MessageHandler) {
        let filter = filter.into();
        let mut routes = self.routes.write().await;
        routes.retain(|(existing, _)| *existing != filter);
        routes.push((filter, handler));
    }

    pub async fn unregister(&self, filter: &str) {
        let mut routes = self.routes.write().await;
        routes.retain(|(existing, _)| existing != filter);
    }

    /// Snapshot of all registered filters, used for resubscription.
    pub async fn filters(&self) -> Vec<String> {
        self.routes
            .read()
            .await
            .iter()
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    /// Dispatch a message to the first matching handler. Each delivery runs
    /// in its own task so one slow handler cannot stall the event loop.
    pub async fn route(&self, topic: &str, retained: bool, payload: Vec<u8>) {
        let routes = self.routes.read().await;
        for (filter, handler) in routes.iter() {
            if topic_matches(filter, topic) {
                let future = handler(topic.to_string(), retained, payload);
                tokio::spawn(future);
                return;
            }
        }
        warn!("no handler registered for topic {topic}");
        debug!("{} filters registered", routes.len());
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if an MQTT topic matches a filter.
///
/// Supports MQTT-style wildcards: `+` matches exactly one topic level,
/// `#` matches zero or more trailing levels.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if filter == topic {
        return true;
    }
    if filter == "#" {
        return true;
    }

    let filter_parts: Vec<&str> = filter.split('/').collect();
    let topic_parts: Vec<&str> = topic.split('/').collect();

    let multi_level = filter_parts.last() == Some(&"#");
    let fixed_len = if multi_level {
        filter_parts.len() - 1
    } else {
        filter_parts.len()
    };

    if multi_level {
        if topic_parts.len() < fixed_len {
            return false;
        }
    } else if topic_parts.len() != fixed_len {
        return false;
    }

    filter_parts[..fixed_len]
        .iter()
        .zip(topic_parts.iter())
        .all(|(f, t)| *f == "+" || f == t)
}
