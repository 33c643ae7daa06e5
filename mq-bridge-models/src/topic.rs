use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Binds one logical service of one logical device to its upstream topics.
///
/// Exactly one of `event_topic` and `cmd_topic` is expected to be non-empty;
/// `resp_topic` is only meaningful alongside `cmd_topic`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq)]
pub struct TopicDescription {
    #[serde(default)]
    pub cmd_topic: String,
    #[serde(default)]
    pub event_topic: String,
    #[serde(default)]
    pub resp_topic: String,
    #[serde(default)]
    pub device_type_id: String,
    #[serde(default)]
    pub device_local_id: String,
    #[serde(default)]
    pub service_local_id: String,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Transformation {
    pub path: String,
    #[serde(rename = "transformation")]
    pub kind: TransformationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransformationKind {
    #[serde(rename = "json-unwrap-input")]
    JsonUnwrapInput,
    #[serde(rename = "json-unwrap-output")]
    JsonUnwrapOutput,
}

impl TopicDescription {
    /// The upstream topic this description is anchored on.
    pub fn topic(&self) -> &str {
        if !self.event_topic.is_empty() {
            &self.event_topic
        } else {
            &self.cmd_topic
        }
    }

    pub fn has_transformations(&self) -> bool {
        !self.transformations.is_empty()
    }

    /// Paths of all transformations of the given kind, in declaration order.
    pub fn transformation_paths(&self, kind: TransformationKind) -> Vec<&str> {
        self.transformations
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.path.as_str())
            .collect()
    }

    /// Correlation key of this description, see [`command_key`].
    pub fn command_key(&self) -> String {
        command_key(&self.device_local_id, &self.service_local_id)
    }

    /// Compact single-line form for log output.
    pub fn log_summary(&self) -> String {
        format!(
            "{{d: {}, n: {}, dt: {}, s: {}, e: {}, c: {}, r: {}}}",
            self.device_local_id,
            self.device_name,
            self.device_type_id,
            self.service_local_id,
            self.event_topic,
            self.cmd_topic,
            self.resp_topic
        )
    }
}

impl PartialEq for TopicDescription {
    /// Field-wise equality with `transformations` compared as a set.
    fn eq(&self, other: &Self) -> bool {
        self.cmd_topic == other.cmd_topic
            && self.event_topic == other.event_topic
            && self.resp_topic == other.resp_topic
            && self.device_type_id == other.device_type_id
            && self.device_local_id == other.device_local_id
            && self.service_local_id == other.service_local_id
            && self.device_name == other.device_name
            && self.transformations.iter().collect::<BTreeSet<_>>()
                == other.transformations.iter().collect::<BTreeSet<_>>()
    }
}

/// Correlation map key: url-escaped device and service local ids joined
/// with a slash.
pub fn command_key(device_local_id: &str, service_local_id: &str) -> String {
    format!(
        "{}/{}",
        encode_topic_component(device_local_id),
        encode_topic_component(service_local_id)
    )
}

fn encode_topic_component(component: &str) -> String {
    utf8_percent_encode(component, NON_ALPHANUMERIC).to_string()
}
