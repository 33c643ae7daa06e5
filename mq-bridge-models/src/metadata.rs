//! Device-type metadata as served by the device repository. Only the
//! fields the online-state tracker consumes are modeled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceType {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub local_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub outputs: Vec<Content>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content_variable: ContentVariable,
    #[serde(default)]
    pub serialization: Serialization,
    #[serde(default)]
    pub protocol_segment_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentVariable {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub characteristic_id: String,
    #[serde(default)]
    pub function_id: String,
    #[serde(default)]
    pub sub_content_variables: Vec<ContentVariable>,
}

impl ContentVariable {
    /// True when this variable or any nested variable carries the function.
    pub fn contains_function(&self, function_id: &str) -> bool {
        if !function_id.is_empty() && self.function_id == function_id {
            return true;
        }
        self.sub_content_variables
            .iter()
            .any(|sub| sub.contains_function(function_id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Serialization {
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "plain-text")]
    PlainText,
    #[serde(rename = "xml")]
    Xml,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_function_recurses() {
        let variable = ContentVariable {
            name: "root".into(),
            sub_content_variables: vec![ContentVariable {
                name: "online".into(),
                function_id: "urn:fn:online".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(variable.contains_function("urn:fn:online"));
        assert!(!variable.contains_function("urn:fn:other"));
        assert!(!variable.contains_function(""));
    }

    #[test]
    fn test_serialization_wire_names() {
        let service: Service = serde_json::from_str(
            r#"{
                "local_id": "lwt",
                "outputs": [{
                    "content_variable": {"name": "status", "function_id": "urn:fn:online"},
                    "serialization": "plain-text",
                    "protocol_segment_id": "data"
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(service.outputs[0].serialization, Serialization::PlainText);
    }
}
