use async_trait::async_trait;
use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{DescriptionProvider, TopicDescription};
use std::path::PathBuf;

/// Minimal built-in provider: a JSON file holding the full description
/// list, re-read on every reconciliation pass. Richer sources (directory
/// loaders, registry-driven generation) plug in through the same trait.
pub struct FileDescriptionProvider {
    path: PathBuf,
}

impl FileDescriptionProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DescriptionProvider for FileDescriptionProvider {
    async fn descriptions(&self) -> BridgeResult<Vec<TopicDescription>> {
        let path = self.path.clone();
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            BridgeError::Msg(format!(
                "unable to read topic descriptions from {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            BridgeError::Msg(format!(
                "unable to parse topic descriptions from {}: {e}",
                path.display()
            ))
        })
    }
}
