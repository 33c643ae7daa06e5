//! Wire types of the downstream platform protocol.

use serde::{Deserialize, Serialize};

/// Device liveness as reported to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "offline")]
    Offline,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Online => write!(f, "online"),
            DeviceState::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateMethod {
    #[serde(rename = "set")]
    Set,
    #[serde(rename = "delete")]
    Delete,
}

/// Payload of `<device-manager-topic>/<connector_id>` publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfoUpdate {
    pub method: UpdateMethod,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DeviceInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub state: DeviceState,
    pub device_type: String,
}

/// A platform command or its reply; `data` stays an opaque string end to
/// end, the platform does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    #[serde(default)]
    pub data: String,
}
