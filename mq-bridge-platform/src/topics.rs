//! Platform MQTT topic constants and builders.

pub const DEVICE_MANAGER: &str = "device-manager/device";
pub const REFRESH: &str = "device-manager/refresh";
pub const COMMAND: &str = "command";
pub const RESPONSE: &str = "response";
pub const EVENT: &str = "event";
pub const ERROR_CLIENT: &str = "error/client";
pub const ERROR_DEVICE: &str = "error/device";
pub const ERROR_COMMAND: &str = "error/command";
pub const SUB_TOPIC: &str = "+";

/// Topic builder for dynamic topic construction.
pub struct Topics;

impl Topics {
    /// Device registration / deregistration channel of one connector.
    pub fn device_manager(connector_id: &str) -> String {
        format!("{}/{}", DEVICE_MANAGER, connector_id)
    }

    pub fn refresh() -> String {
        REFRESH.to_string()
    }

    /// Subscription filter matching all commands for one device.
    pub fn device_commands_sub(device_id: &str) -> String {
        format!("{}/{}/{}", COMMAND, device_id, SUB_TOPIC)
    }

    pub fn response(device_id: &str, service_id: &str) -> String {
        format!("{}/{}/{}", RESPONSE, device_id, service_id)
    }

    pub fn event(device_id: &str, service_id: &str) -> String {
        format!("{}/{}/{}", EVENT, device_id, service_id)
    }

    pub fn client_error() -> String {
        ERROR_CLIENT.to_string()
    }

    pub fn device_error(device_id: &str) -> String {
        format!("{}/{}", ERROR_DEVICE, device_id)
    }

    pub fn command_error(correlation_id: &str) -> String {
        format!("{}/{}", ERROR_COMMAND, correlation_id)
    }

    /// Split a `command/<device>/<service>` topic into its ids.
    pub fn parse_command_topic(topic: &str) -> Option<(&str, &str)> {
        let rest = topic.strip_prefix(COMMAND)?.strip_prefix('/')?;
        rest.rsplit_once('/')
    }
}
