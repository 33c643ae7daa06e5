//! Device-repository client: REST fetch of device types with a TTL
//! read-through cache and an optional file fallback for offline starts.

mod fallback;

use async_trait::async_trait;
use fallback::FallbackStore;
use moka::future::Cache;
use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{settings::DeviceRepoSettings, DeviceType, MetadataRepo, Service};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::time::Duration;
use tracing::warn;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeviceRepository {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    cache: Cache<String, DeviceType>,
    fallback: Option<FallbackStore>,
}

impl DeviceRepository {
    pub fn new(settings: &DeviceRepoSettings) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Init(format!("unable to build http client: {e}")))?;
        let cache = Cache::builder()
            .time_to_live(settings.cache_duration_parsed()?)
            .build();
        let fallback = match &settings.fallback_file {
            Some(path) if !path.is_empty() => Some(FallbackStore::open(path)?),
            _ => None,
        };
        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            auth_token: settings.auth_token.clone(),
            cache,
            fallback,
        })
    }

    pub async fn get_device_type(&self, id: &str) -> BridgeResult<DeviceType> {
        if let Some(device_type) = self.cache.get(id).await {
            return Ok(device_type);
        }

        let device_type = match self.fetch_device_type(id).await {
            Ok(device_type) => {
                if let Some(fallback) = &self.fallback {
                    match serde_json::to_value(&device_type) {
                        Ok(value) => fallback.set(&fallback_key(id), value).await,
                        Err(e) => warn!(error = %e, "unable to store device type in fallback"),
                    }
                }
                device_type
            }
            Err(e) => self.device_type_from_fallback(id, e).await?,
        };

        self.cache
            .insert(id.to_string(), device_type.clone())
            .await;
        Ok(device_type)
    }

    async fn device_type_from_fallback(
        &self,
        id: &str,
        fetch_err: BridgeError,
    ) -> BridgeResult<DeviceType> {
        let Some(fallback) = &self.fallback else {
            return Err(fetch_err);
        };
        let Some(entry) = fallback.get(&fallback_key(id)).await else {
            return Err(fetch_err);
        };
        warn!(
            "serving device type {id} from fallback (stored {}), repository said: {fetch_err}",
            entry.stored_at
        );
        serde_json::from_value(entry.value)
            .map_err(|e| BridgeError::Repository(format!("invalid fallback entry for {id}: {e}")))
    }

    async fn fetch_device_type(&self, id: &str) -> BridgeResult<DeviceType> {
        if self.base_url.is_empty() {
            return Err(BridgeError::Repository(
                "device repository url is not configured".into(),
            ));
        }
        let url = format!(
            "{}/device-types/{}",
            self.base_url,
            utf8_percent_encode(id, NON_ALPHANUMERIC)
        );
        let mut request = self.http.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }
        let response = request.send().await?;
        let response = response
            .error_for_status()
            .map_err(|e| BridgeError::Repository(format!("device type {id}: {e}")))?;
        Ok(response.json::<DeviceType>().await?)
    }
}

fn fallback_key(device_type_id: &str) -> String {
    format!("device-types.{device_type_id}")
}

#[async_trait]
impl MetadataRepo for DeviceRepository {
    async fn get_service(
        &self,
        device_type_id: &str,
        local_service_id: &str,
    ) -> BridgeResult<Service> {
        let device_type = self.get_device_type(device_type_id).await?;
        device_type
            .services
            .into_iter()
            .find(|service| service.local_id == local_service_id)
            .ok_or_else(|| {
                BridgeError::Repository(format!(
                    "service {local_service_id} not found in device type {device_type_id}"
                ))
            })
    }
}
