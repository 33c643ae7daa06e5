use mq_bridge_error::{BridgeError, BridgeResult};
use mq_bridge_models::{Serialization, Service};
use serde_json::{Map, Value};

/// Decode a raw payload into a message map keyed by output variable name.
///
/// The payload is bound to the configured protocol data segment; every
/// output declared on that segment is decoded according to its declared
/// serialization. Unknown serializations fall back to a JSON parse.
pub(super) fn serialize(
    service: &Service,
    payload: &[u8],
    data_field: &str,
) -> BridgeResult<Map<String, Value>> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| BridgeError::Decode(format!("payload is not valid utf-8: {e}")))?;

    let mut result = Map::new();
    for output in &service.outputs {
        if output.protocol_segment_id != data_field {
            continue;
        }
        let value = match output.serialization {
            Serialization::PlainText => Value::String(text.to_string()),
            Serialization::Json | Serialization::Xml => {
                serde_json::from_str::<Value>(text).map_err(|e| {
                    BridgeError::Decode(format!(
                        "unable to decode output {}: {e}",
                        output.content_variable.name
                    ))
                })?
            }
        };
        result.insert(output.content_variable.name.clone(), value);
    }
    Ok(result)
}
