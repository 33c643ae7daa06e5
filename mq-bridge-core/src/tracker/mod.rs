//! Per-device liveness derived from event payloads.
//!
//! Devices whose device type declares a connection-status function get
//! their state decoded out of the matching service's payloads; all other
//! services of such a device count as implicit liveness proof. Known
//! states survive reconciliation passes, the indices are rebuilt on every
//! pass.

mod marshal;
mod serialize;

use mq_bridge_error::BridgeResult;
use mq_bridge_models::{
    settings::OnlineCheckSettings, DeviceState, MetadataRepo, Service, TopicDescription,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};
use tracing::error;

#[derive(Default)]
struct TrackerState {
    known_states: HashMap<String, DeviceState>,
    known_services: HashMap<String, Service>,
    indicator_services: HashSet<String>,
    indicator_devices: HashSet<String>,
}

#[derive(Clone)]
pub struct OnlineTracker {
    config: OnlineCheckSettings,
    repo: Arc<dyn MetadataRepo>,
    state: Arc<Mutex<TrackerState>>,
}

impl OnlineTracker {
    pub fn new(config: OnlineCheckSettings, repo: Arc<dyn MetadataRepo>) -> Self {
        Self {
            config,
            repo,
            state: Arc::new(Mutex::new(TrackerState::default())),
        }
    }

    /// Rebuild the service and device indices for a fresh description set.
    ///
    /// Runs before any event of the pass can fire so new services are
    /// already indexed. Known states are preserved; indicator-using
    /// devices without a known state start as offline.
    pub async fn preprocess(&self, descriptions: &[TopicDescription]) -> BridgeResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        // fetch outside the state lock; the pass runs under the
        // coordinator lock anyway
        let mut fetched: HashMap<String, Service> = HashMap::new();
        for desc in descriptions {
            let key = service_key(&desc.device_type_id, &desc.service_local_id);
            if fetched.contains_key(&key) {
                continue;
            }
            let service = self
                .repo
                .get_service(&desc.device_type_id, &desc.service_local_id)
                .await?;
            fetched.insert(key, service);
        }

        let mut state = self.state.lock().unwrap();
        state.known_services.clear();
        state.indicator_services.clear();
        state.indicator_devices.clear();
        for desc in descriptions {
            let key = service_key(&desc.device_type_id, &desc.service_local_id);
            let Some(service) = fetched.get(&key) else {
                continue;
            };
            state.known_services.insert(key.clone(), service.clone());
            let carries_indicator = service
                .outputs
                .iter()
                .any(|output| output.content_variable.contains_function(&self.config.function_id));
            if carries_indicator {
                state.indicator_services.insert(key);
                state
                    .indicator_devices
                    .insert(desc.device_local_id.clone());
                state
                    .known_states
                    .entry(desc.device_local_id.clone())
                    .or_insert(DeviceState::Offline);
            }
        }
        Ok(())
    }

    /// Last known state of the description's device. With the tracker
    /// disabled everything counts as online.
    pub fn load_state(&self, desc: &TopicDescription) -> Option<DeviceState> {
        if !self.config.enabled {
            return Some(DeviceState::Online);
        }
        let state = self.state.lock().unwrap();
        state.known_states.get(&desc.device_local_id).copied()
    }

    /// Payload-driven transition function. `None` means the message does
    /// not influence the device's state.
    pub fn check_and_store(
        &self,
        desc: &TopicDescription,
        retained: bool,
        payload: &[u8],
    ) -> Option<DeviceState> {
        if !self.config.enabled {
            return None;
        }
        if !self.device_uses_indicator(desc) {
            return None;
        }
        if !self.service_carries_indicator(desc) {
            // any fresh message proves liveness; replayed history does not
            if retained {
                return None;
            }
            self.store(desc, DeviceState::Online);
            return Some(DeviceState::Online);
        }

        let service = match self.get_service(desc) {
            Some(service) => service,
            None => {
                error!(
                    "service {} not found in tracker index",
                    service_key(&desc.device_type_id, &desc.service_local_id)
                );
                return None;
            }
        };

        let message =
            match serialize::serialize(&service, payload, &self.config.protocol_data_field) {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "unable to serialize payload for online check");
                    return None;
                }
            };

        let online = match marshal::unmarshal_bool(
            &service,
            &self.config.function_id,
            &self.config.boolean_characteristic_id,
            &message,
        ) {
            Ok(online) => online,
            Err(e) => {
                error!(error = %e, "unable to decode online state");
                return None;
            }
        };

        let new_state = if online {
            DeviceState::Online
        } else {
            DeviceState::Offline
        };
        self.store(desc, new_state);
        Some(new_state)
    }

    /// Drop the known state of a removed device.
    pub fn forget_device(&self, device_local_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.known_states.remove(device_local_id);
    }

    fn get_service(&self, desc: &TopicDescription) -> Option<Service> {
        let state = self.state.lock().unwrap();
        state
            .known_services
            .get(&service_key(&desc.device_type_id, &desc.service_local_id))
            .cloned()
    }

    fn store(&self, desc: &TopicDescription, new_state: DeviceState) {
        let mut state = self.state.lock().unwrap();
        state
            .known_states
            .insert(desc.device_local_id.clone(), new_state);
    }

    fn service_carries_indicator(&self, desc: &TopicDescription) -> bool {
        let state = self.state.lock().unwrap();
        state
            .indicator_services
            .contains(&service_key(&desc.device_type_id, &desc.service_local_id))
    }

    fn device_uses_indicator(&self, desc: &TopicDescription) -> bool {
        let state = self.state.lock().unwrap();
        state.indicator_devices.contains(&desc.device_local_id)
    }
}

fn service_key(device_type_id: &str, service_local_id: &str) -> String {
    format!("{device_type_id}.{service_local_id}")
}
