//! Event forwarding and liveness tracking over recording mocks.

mod common;

use common::*;
use mq_bridge_core::BridgeConnector;
use mq_bridge_models::{
    Content, ContentVariable, DeviceState, Serialization, Service, Transformation,
    TransformationKind,
};
use std::sync::{atomic::Ordering, Arc};
use tokio_util::sync::CancellationToken;

struct Fixture {
    platform: Arc<MockPlatform>,
    event_mqtt: Arc<MockMqtt>,
}

async fn fixture(
    settings: mq_bridge_models::Settings,
    descriptions: Vec<mq_bridge_models::TopicDescription>,
    repo: Arc<MockRepo>,
) -> Fixture {
    let platform = MockPlatform::new();
    let event_mqtt = MockMqtt::new();
    BridgeConnector::start(
        settings,
        StaticProvider::new(descriptions),
        Arc::clone(&platform) as Arc<dyn mq_bridge_models::PlatformPort>,
        MockMqtt::new(),
        Arc::clone(&event_mqtt) as Arc<dyn mq_bridge_models::MqttPort>,
        repo,
        CancellationToken::new(),
    )
    .await
    .expect("connector start");
    Fixture {
        platform,
        event_mqtt,
    }
}

fn lwt_service() -> Service {
    Service {
        local_id: "lwt".into(),
        outputs: vec![Content {
            content_variable: ContentVariable {
                name: "status".into(),
                function_id: "urn:fn:online".into(),
                ..Default::default()
            },
            serialization: Serialization::PlainText,
            protocol_segment_id: "data".into(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_event_is_forwarded_raw() {
    let f = fixture(
        test_settings(),
        vec![event_desc("d1", "s1", "d1/event")],
        MockRepo::new(),
    )
    .await;

    f.event_mqtt.deliver("d1/event", false, b"23.5").await;

    let events = f.platform.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "d1");
    assert_eq!(events[0].1, "s1");
    assert_eq!(events[0].2, b"23.5".to_vec());
}

#[tokio::test]
async fn test_output_transformation_unwraps_fields() {
    let mut desc = event_desc("d1", "s1", "d1/event");
    desc.transformations = ["i", "f", "b"]
        .iter()
        .map(|p| Transformation {
            path: p.to_string(),
            kind: TransformationKind::JsonUnwrapOutput,
        })
        .collect();
    let f = fixture(test_settings(), vec![desc], MockRepo::new()).await;

    f.event_mqtt
        .deliver(
            "d1/event",
            false,
            br#"{"ignore":"foobar","i":"42","f":"1.3","b":"true"}"#,
        )
        .await;

    let events = f.platform.events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    let value: serde_json::Value = serde_json::from_slice(&events[0].2).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"ignore": "foobar", "i": 42, "f": 1.3, "b": true})
    );
}

#[tokio::test]
async fn test_transformation_failure_reports_device_error() {
    let mut desc = event_desc("d1", "s1", "d1/event");
    desc.transformations = vec![Transformation {
        path: "i".into(),
        kind: TransformationKind::JsonUnwrapOutput,
    }];
    let f = fixture(test_settings(), vec![desc], MockRepo::new()).await;

    f.event_mqtt.deliver("d1/event", false, b"not json").await;

    assert!(f.platform.events.lock().unwrap().is_empty());
    let errors = f.platform.device_errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "d1");
}

#[tokio::test]
async fn test_forward_failure_reports_device_error() {
    let f = fixture(
        test_settings(),
        vec![event_desc("d1", "s1", "d1/event")],
        MockRepo::new(),
    )
    .await;

    f.platform.fail_send_event.store(true, Ordering::SeqCst);
    f.event_mqtt.deliver("d1/event", false, b"x").await;

    let errors = f.platform.device_errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "d1");
}

#[tokio::test]
async fn test_lwt_payloads_flip_device_state() {
    let repo = MockRepo::new();
    repo.insert("d1-type", "lwt", lwt_service());
    let f = fixture(
        test_settings_with_tracker(),
        vec![event_desc("d1", "lwt", "d1/lwt")],
        repo,
    )
    .await;

    // the initial announcement reported offline
    assert_eq!(f.platform.set_devices.lock().unwrap().len(), 1);

    f.event_mqtt.deliver("d1/lwt", false, b"online").await;
    f.event_mqtt.deliver("d1/lwt", false, b"offline").await;

    let set_devices = f.platform.set_devices.lock().unwrap().clone();
    assert_eq!(set_devices.len(), 3);
    assert_eq!(set_devices[1].3, DeviceState::Online);
    assert_eq!(set_devices[2].3, DeviceState::Offline);
}

#[tokio::test]
async fn test_unchanged_state_is_not_reannounced() {
    let repo = MockRepo::new();
    repo.insert("d1-type", "lwt", lwt_service());
    let f = fixture(
        test_settings_with_tracker(),
        vec![event_desc("d1", "lwt", "d1/lwt")],
        repo,
    )
    .await;

    f.event_mqtt.deliver("d1/lwt", false, b"online").await;
    // a retained replay of the same state changes nothing
    f.event_mqtt.deliver("d1/lwt", true, b"online").await;

    let set_devices = f.platform.set_devices.lock().unwrap().clone();
    assert_eq!(set_devices.len(), 2);
    assert_eq!(set_devices[1].3, DeviceState::Online);
}

#[tokio::test]
async fn test_implicit_liveness_from_sibling_service() {
    let repo = MockRepo::new();
    repo.insert("d1-type", "lwt", lwt_service());
    repo.insert(
        "d1-type",
        "telemetry",
        Service {
            local_id: "telemetry".into(),
            outputs: vec![Content {
                content_variable: ContentVariable {
                    name: "value".into(),
                    ..Default::default()
                },
                serialization: Serialization::Json,
                protocol_segment_id: "data".into(),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    let f = fixture(
        test_settings_with_tracker(),
        vec![
            event_desc("d1", "lwt", "d1/lwt"),
            event_desc("d1", "telemetry", "d1/telemetry"),
        ],
        repo,
    )
    .await;

    // a retained historical message proves nothing
    f.event_mqtt.deliver("d1/telemetry", true, b"{}").await;
    assert_eq!(f.platform.set_devices.lock().unwrap().len(), 1);

    // fresh telemetry flips the device online
    f.event_mqtt.deliver("d1/telemetry", false, b"{}").await;
    let set_devices = f.platform.set_devices.lock().unwrap().clone();
    assert_eq!(set_devices.len(), 2);
    assert_eq!(set_devices[1].3, DeviceState::Online);
}
