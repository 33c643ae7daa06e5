//! JSON-path unwrap transformations.
//!
//! A transformation path is a dot-separated sequence of object keys and
//! array indices; the literal token `*` matches any array index. Every
//! string leaf whose path is configured gets JSON-parsed in place.

use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{TopicDescription, TransformationKind};
use serde_json::Value;

/// Apply all transformations of the given kind declared on the
/// description. Without matching declarations the payload passes through
/// unparsed.
pub fn apply(
    desc: &TopicDescription,
    kind: TransformationKind,
    payload: &[u8],
) -> BridgeResult<Vec<u8>> {
    let paths = desc.transformation_paths(kind);
    if paths.is_empty() {
        return Ok(payload.to_vec());
    }
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| BridgeError::Transform(format!("payload is not valid json: {e}")))?;
    let value = unwrap_recursive(value, &paths, &mut Vec::new())?;
    Ok(serde_json::to_vec(&value)?)
}

/// Walk the value tracking the current path. Arrays are visited twice per
/// level, first with `*` bound to the index and then with the numeric
/// index, so both spellings of a path address the same leaf; the second
/// pass sees the values the first pass produced.
fn unwrap_recursive(
    value: Value,
    paths: &[&str],
    current_path: &mut Vec<String>,
) -> BridgeResult<Value> {
    match value {
        Value::Array(mut items) => {
            for item in items.iter_mut() {
                current_path.push("*".to_string());
                *item = unwrap_recursive(item.take(), paths, current_path)?;
                current_path.pop();
            }
            for (i, item) in items.iter_mut().enumerate() {
                current_path.push(i.to_string());
                *item = unwrap_recursive(item.take(), paths, current_path)?;
                current_path.pop();
            }
            Ok(Value::Array(items))
        }
        Value::Object(mut map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                if let Some(slot) = map.get_mut(&key) {
                    current_path.push(key.clone());
                    *slot = unwrap_recursive(slot.take(), paths, current_path)?;
                    current_path.pop();
                }
            }
            Ok(Value::Object(map))
        }
        Value::String(s) => {
            if paths.contains(&current_path.join(".").as_str()) {
                serde_json::from_str(&s).map_err(|e| {
                    BridgeError::Transform(format!(
                        "value at {} is not valid json: {e}",
                        current_path.join(".")
                    ))
                })
            } else {
                Ok(Value::String(s))
            }
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mq_bridge_models::Transformation;

    fn desc_with_paths(kind: TransformationKind, paths: &[&str]) -> TopicDescription {
        TopicDescription {
            event_topic: "d1/event".into(),
            device_local_id: "d1".into(),
            service_local_id: "s1".into(),
            transformations: paths
                .iter()
                .map(|p| Transformation {
                    path: p.to_string(),
                    kind,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn apply_str(desc: &TopicDescription, kind: TransformationKind, payload: &str) -> String {
        String::from_utf8(apply(desc, kind, payload.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_no_paths_passes_through_unparsed() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &[]);
        let out = apply(&desc, TransformationKind::JsonUnwrapOutput, b"not json").unwrap();
        assert_eq!(out, b"not json");
    }

    #[test]
    fn test_field_unwrap() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["i", "f", "b"]);
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"{"ignore":"foobar","i":"42","f":"1.3","b":"true"}"#,
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({"ignore": "foobar", "i": 42, "f": 1.3, "b": true})
        );
    }

    #[test]
    fn test_sub_field_unwrap() {
        let desc = desc_with_paths(
            TransformationKind::JsonUnwrapOutput,
            &["sub.i", "sub.f", "sub.b"],
        );
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"{"ignore1":"foobar","sub":{"ignore2":"foobar","i":"42","f":"1.3","b":"true"}}"#,
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({"ignore1":"foobar","sub":{"ignore2":"foobar","i":42,"f":1.3,"b":true}})
        );
    }

    #[test]
    fn test_root_path_unwraps_bare_string() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &[""]);
        assert_eq!(
            apply_str(&desc, TransformationKind::JsonUnwrapOutput, r#""42""#),
            "42"
        );
        assert_eq!(
            apply_str(
                &desc,
                TransformationKind::JsonUnwrapOutput,
                r#""{\"name\":\"test\"}""#
            ),
            r#"{"name":"test"}"#
        );
    }

    #[test]
    fn test_star_matches_any_index() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["*"]);
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"["42", "true", "{\"name\":\"test\"}"]"#,
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!([42, true, {"name": "test"}]));
    }

    #[test]
    fn test_numeric_index_paths() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["0", "2"]);
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"["42", "name", "true"]"#,
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!([42, "name", true]));
    }

    #[test]
    fn test_star_and_numeric_paths_through_objects() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["*.i"]);
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"[{"i":"42","ignore":"ignore"},{"i":"1.3","ignore":"ignore"}]"#,
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!([{"i":42,"ignore":"ignore"},{"i":1.3,"ignore":"ignore"}])
        );

        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["i.*"]);
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"{"i":["42","true"],"ignore":"ignore"}"#,
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!({"i":[42,true],"ignore":"ignore"}));
    }

    #[test]
    fn test_star_then_index_single_unwrap() {
        // both spellings address index 0; the * pass unwraps first and the
        // numeric pass then sees a non-string leaf and leaves it alone
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["*", "0"]);
        let out = apply_str(&desc, TransformationKind::JsonUnwrapOutput, r#"["\"x\""]"#);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!(["x"]));
    }

    #[test]
    fn test_non_string_leaf_is_left_alone() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["i"]);
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"{"i": 42}"#,
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!({"i": 42}));
    }

    #[test]
    fn test_idempotent_on_already_unwrapped_payloads() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["i", "f", "b"]);
        let payload = r#"{"b":true,"f":1.3,"i":42}"#;
        let once = apply_str(&desc, TransformationKind::JsonUnwrapOutput, payload);
        let twice = apply_str(&desc, TransformationKind::JsonUnwrapOutput, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_invalid_json_at_matched_path_fails() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["i"]);
        let result = apply(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            br#"{"i": "not json"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_payload_fails_when_paths_configured() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapOutput, &["i"]);
        assert!(apply(&desc, TransformationKind::JsonUnwrapOutput, b"no json").is_err());
    }

    #[test]
    fn test_kinds_are_independent() {
        let desc = desc_with_paths(TransformationKind::JsonUnwrapInput, &["i"]);
        // no output transformations declared -> payload untouched
        let out = apply_str(
            &desc,
            TransformationKind::JsonUnwrapOutput,
            r#"{"i":"42"}"#,
        );
        assert_eq!(out, r#"{"i":"42"}"#);
    }
}
