use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::TopicDescription;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate a description set and return it with exact duplicates
/// coalesced.
///
/// Violations that make the set unusable reject it as a whole; the broker
/// state is left untouched by the caller in that case. Suspicious but
/// workable constellations only log a warning.
pub fn validate(descriptions: Vec<TopicDescription>) -> BridgeResult<Vec<TopicDescription>> {
    let descriptions = drop_duplicates(descriptions);

    let mut event_topic_used: HashSet<String> = HashSet::new();
    let mut resp_topic_used: HashSet<String> = HashSet::new();
    let mut cmd_topic_used: HashSet<String> = HashSet::new();
    let mut cmd_key_used: HashSet<String> = HashSet::new();

    let mut device_to_name: HashMap<String, String> = HashMap::new();
    let mut device_to_type: HashMap<String, String> = HashMap::new();

    for desc in &descriptions {
        let event = desc.event_topic.as_str();
        let cmd = desc.cmd_topic.as_str();
        let resp = desc.resp_topic.as_str();
        let device_id = desc.device_local_id.as_str();

        // exactly one of event and command topic
        if cmd == event || (!cmd.is_empty() && !event.is_empty()) {
            return Err(BridgeError::Validation(format!(
                "expect either event or command topic: {}",
                desc.log_summary()
            )));
        }
        if !resp.is_empty() && cmd.is_empty() {
            warn!(
                "response topic will not be used if command topic is not set {}",
                desc.log_summary()
            );
        }

        // name redefinition
        match device_to_name.get(device_id) {
            Some(known) if known != &desc.device_name => {
                return Err(BridgeError::Validation(format!(
                    "device {device_id} has multiple name assignments: {known} and {}",
                    desc.device_name
                )));
            }
            _ => {
                device_to_name.insert(device_id.to_string(), desc.device_name.clone());
            }
        }

        // device-type redefinition
        match device_to_type.get(device_id) {
            Some(known) if known != &desc.device_type_id => {
                return Err(BridgeError::Validation(format!(
                    "device {device_id} has multiple device-type-id assignments: {known} and {}",
                    desc.device_type_id
                )));
            }
            _ => {
                device_to_type.insert(device_id.to_string(), desc.device_type_id.clone());
            }
        }

        // response topic reuse for commands
        if !cmd.is_empty() {
            cmd_topic_used.insert(cmd.to_string());
        }
        if !resp.is_empty() && cmd_topic_used.contains(resp) {
            return Err(BridgeError::Validation(format!(
                "collision between command and response topic: {resp}"
            )));
        }

        // device-id + service-id reuse in commands
        if !cmd.is_empty() {
            let key = desc.command_key();
            if !cmd_key_used.insert(key.clone()) {
                return Err(BridgeError::Validation(format!(
                    "reused device-id/service-id: {key}"
                )));
            }
        }

        // event topic reuse
        if !event.is_empty() && !event_topic_used.insert(event.to_string()) {
            return Err(BridgeError::Validation(format!(
                "reused event topic: {event}"
            )));
        }

        // event/response collisions are suspicious but tolerated
        if !resp.is_empty() {
            resp_topic_used.insert(resp.to_string());
            if event_topic_used.contains(resp) {
                warn!("response topic is also used as event topic: {resp}");
            }
        }
        if !event.is_empty() && resp_topic_used.contains(event) {
            warn!("event topic is also used as response topic: {event}");
        }
    }

    Ok(descriptions)
}

/// Coalesce exact duplicates, keeping the first occurrence.
fn drop_duplicates(descriptions: Vec<TopicDescription>) -> Vec<TopicDescription> {
    let mut result: Vec<TopicDescription> = Vec::with_capacity(descriptions.len());
    for desc in descriptions {
        if result.iter().any(|kept| kept == &desc) {
            warn!("found duplicate topic description: {}", desc.log_summary());
            continue;
        }
        result.push(desc);
    }
    result
}
