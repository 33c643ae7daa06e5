use chrono::{DateTime, Utc};
use mq_bridge_error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, path::PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FallbackEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
}

/// JSON file holding the last successfully fetched value per key, used when
/// the repository is unreachable.
pub(crate) struct FallbackStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, FallbackEntry>>,
}

impl FallbackStore {
    pub fn open(path: impl Into<PathBuf>) -> BridgeResult<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BridgeError::Init(format!(
                    "unable to parse fallback file {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub async fn get(&self, key: &str) -> Option<FallbackEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Store a value and persist the whole map; persistence failures are
    /// logged, the in-memory entry stays usable.
    pub async fn set(&self, key: &str, value: Value) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            FallbackEntry {
                value,
                stored_at: Utc::now(),
            },
        );
        match serde_json::to_vec_pretty(&*entries) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&self.path, bytes) {
                    warn!(error = %e, "unable to write fallback file {}", self.path.display());
                }
            }
            Err(e) => warn!(error = %e, "unable to serialize fallback entries"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_through_file() {
        let dir = std::env::temp_dir().join("mq-bridge-fallback-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fallback.json");
        let _ = std::fs::remove_file(&path);

        let store = FallbackStore::open(&path).unwrap();
        store.set("device-types.dt1", json!({"id": "dt1"})).await;

        let reopened = FallbackStore::open(&path).unwrap();
        let entry = reopened.get("device-types.dt1").await.unwrap();
        assert_eq!(entry.value, json!({"id": "dt1"}));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let path = std::env::temp_dir().join("mq-bridge-fallback-missing.json");
        let _ = std::fs::remove_file(&path);
        let store = FallbackStore::open(&path).unwrap();
        assert!(store.get("anything").await.is_none());
    }
}
