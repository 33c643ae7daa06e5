use crate::constants::ENV_PREFIX;
use config::{Config, File};
use mq_bridge_error::{BridgeError, BridgeResult};
use serde::Deserialize;
use std::{ops::Deref, sync::Arc, time::Duration};

/// Cheap-to-clone settings handle shared across all components.
#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    pub fn new(config_path: &str) -> BridgeResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

impl From<Inner> for Settings {
    fn from(inner: Inner) -> Self {
        Self(Arc::new(inner))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Inner {
    /// Identity segment appended to the platform device-manager topic.
    #[serde(default)]
    pub connector_id: String,
    /// Reconciliation tick period; empty or "-" disables the periodic tick.
    #[serde(default)]
    pub update_period: String,
    /// TTL for pending command correlation ids.
    #[serde(default = "Inner::max_correlation_id_age_default")]
    pub max_correlation_id_age: String,
    /// When false a removed description leaves the platform device record in
    /// place; the command subscription is dropped either way.
    #[serde(default)]
    pub delete_devices: bool,
    /// Verbose per-message logging.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub platform: PlatformSettings,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub online_check: OnlineCheckSettings,
    #[serde(default)]
    pub device_repo: DeviceRepoSettings,
    /// Path of the JSON file holding the topic description list served by
    /// the built-in provider.
    #[serde(default)]
    pub device_descriptions_file: String,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            connector_id: String::new(),
            update_period: String::new(),
            max_correlation_id_age: Inner::max_correlation_id_age_default(),
            delete_devices: false,
            debug: false,
            platform: PlatformSettings::default(),
            upstream: UpstreamSettings::default(),
            online_check: OnlineCheckSettings::default(),
            device_repo: DeviceRepoSettings::default(),
            device_descriptions_file: String::new(),
        }
    }
}

impl Inner {
    fn max_correlation_id_age_default() -> String {
        "90s".into()
    }

    /// `None` when the periodic tick is disabled.
    pub fn update_period_duration(&self) -> BridgeResult<Option<Duration>> {
        if self.update_period.is_empty() || self.update_period == "-" {
            return Ok(None);
        }
        humantime::parse_duration(&self.update_period)
            .map(Some)
            .map_err(|e| BridgeError::Init(format!("unable to parse update_period: {e}")))
    }

    pub fn max_correlation_id_age_duration(&self) -> BridgeResult<Duration> {
        humantime::parse_duration(&self.max_correlation_id_age)
            .map_err(|e| BridgeError::Init(format!("unable to parse max_correlation_id_age: {e}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformSettings {
    #[serde(default = "PlatformSettings::broker_url_default")]
    pub broker_url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub client_id: String,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        PlatformSettings {
            broker_url: Self::broker_url_default(),
            user: String::new(),
            password: String::new(),
            client_id: String::new(),
        }
    }
}

impl PlatformSettings {
    fn broker_url_default() -> String {
        "tcp://localhost:1883".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    #[serde(default = "UpstreamSettings::broker_url_default")]
    pub broker_url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Client id of the connection carrying commands and responses.
    #[serde(default)]
    pub command_client_id: String,
    /// Client id of the connection carrying events.
    #[serde(default)]
    pub event_client_id: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        UpstreamSettings {
            broker_url: Self::broker_url_default(),
            user: String::new(),
            password: String::new(),
            command_client_id: String::new(),
            event_client_id: String::new(),
        }
    }
}

impl UpstreamSettings {
    fn broker_url_default() -> String {
        "tcp://localhost:1883".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnlineCheckSettings {
    /// Master switch for the online-state tracker.
    #[serde(default)]
    pub enabled: bool,
    /// Function id marking an output variable as the connection-status value.
    #[serde(default)]
    pub function_id: String,
    /// Target characteristic of the extracted boolean.
    #[serde(default)]
    pub boolean_characteristic_id: String,
    /// Protocol segment the raw payload is placed under before decoding.
    #[serde(default = "OnlineCheckSettings::protocol_data_field_default")]
    pub protocol_data_field: String,
}

impl Default for OnlineCheckSettings {
    fn default() -> Self {
        OnlineCheckSettings {
            enabled: false,
            function_id: String::new(),
            boolean_characteristic_id: String::new(),
            protocol_data_field: Self::protocol_data_field_default(),
        }
    }
}

impl OnlineCheckSettings {
    fn protocol_data_field_default() -> String {
        "data".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRepoSettings {
    #[serde(default)]
    pub url: String,
    /// Static bearer token sent with repository requests, if any.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "DeviceRepoSettings::cache_duration_default")]
    pub cache_duration: String,
    /// Optional JSON file consulted when the repository is unreachable and
    /// refreshed on every successful fetch.
    #[serde(default)]
    pub fallback_file: Option<String>,
}

impl Default for DeviceRepoSettings {
    fn default() -> Self {
        DeviceRepoSettings {
            url: String::new(),
            auth_token: None,
            cache_duration: Self::cache_duration_default(),
            fallback_file: None,
        }
    }
}

impl DeviceRepoSettings {
    fn cache_duration_default() -> String {
        "30m".into()
    }

    pub fn cache_duration_parsed(&self) -> BridgeResult<Duration> {
        humantime::parse_duration(&self.cache_duration).map_err(|e| {
            BridgeError::Init(format!("unable to parse device_repo.cache_duration: {e}"))
        })
    }
}

/// Split a `tcp://host:port` style broker url into host and port.
///
/// Schemes are stripped, a missing port falls back to 1883.
pub fn parse_broker_addr(url: &str) -> (String, u16) {
    let stripped = url
        .strip_prefix("tcp://")
        .or_else(|| url.strip_prefix("mqtt://"))
        .or_else(|| url.strip_prefix("ssl://"))
        .or_else(|| url.strip_prefix("mqtts://"))
        .unwrap_or(url);
    match stripped.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (stripped.to_string(), 1883),
        },
        None => (stripped.to_string(), 1883),
    }
}
