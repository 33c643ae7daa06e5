use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{ContentVariable, Service};
use serde_json::{Map, Value};
use tracing::warn;

/// Extract the connection-status boolean from a serialized message.
///
/// The path to the value is found by searching the service's output
/// variables for the configured function id; the first declared path wins
/// and multiple hits only warn.
pub(super) fn unmarshal_bool(
    service: &Service,
    function_id: &str,
    characteristic_id: &str,
    message: &Map<String, Value>,
) -> BridgeResult<bool> {
    if function_id.is_empty() {
        return Err(BridgeError::Decode(
            "missing online-check function id".into(),
        ));
    }

    let mut paths: Vec<Vec<&str>> = Vec::new();
    for output in &service.outputs {
        collect_paths(&output.content_variable, function_id, &mut Vec::new(), &mut paths);
    }
    if paths.is_empty() {
        return Err(BridgeError::Decode(
            "no output path found for online-check function".into(),
        ));
    }
    if paths.len() > 1 {
        warn!("found multiple paths for online-check function, only the first is used");
    }
    let path = &paths[0];

    let mut value = message
        .get(path[0])
        .ok_or_else(|| BridgeError::Decode(format!("message is missing segment {}", path[0])))?;
    for key in &path[1..] {
        value = value.get(key).ok_or_else(|| {
            BridgeError::Decode(format!("message is missing field {key} on path {path:?}"))
        })?;
    }

    cast_bool(value, characteristic_id)
}

/// Depth-first collection of name paths to variables carrying the
/// function.
fn collect_paths<'a>(
    variable: &'a ContentVariable,
    function_id: &str,
    current: &mut Vec<&'a str>,
    paths: &mut Vec<Vec<&'a str>>,
) {
    current.push(&variable.name);
    if variable.function_id == function_id {
        paths.push(current.clone());
    }
    for sub in &variable.sub_content_variables {
        collect_paths(sub, function_id, current, paths);
    }
    current.pop();
}

/// Permissive cast of the extracted value to a boolean characteristic.
fn cast_bool(value: &Value, characteristic_id: &str) -> BridgeResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "online" => Ok(true),
            "false" | "0" | "off" | "offline" => Ok(false),
            other => Err(BridgeError::Decode(format!(
                "unable to interpret {other:?} as boolean characteristic {characteristic_id}"
            ))),
        },
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        other => Err(BridgeError::Decode(format!(
            "unable to interpret {other} as boolean characteristic {characteristic_id}"
        ))),
    }
}
