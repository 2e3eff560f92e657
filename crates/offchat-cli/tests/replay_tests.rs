//! Integration tests for scripted replay

use offchat_cli::{
    demo_script, parse_script, AppConfig, CommandDispatcher, ReplayRecord, ScriptRunner,
};
use offchat_core::{GattChannel, LifecycleState};

fn pushes_in_step(records: &[ReplayRecord], step: usize) -> Vec<(String, GattChannel)> {
    let mut pushes: Vec<(String, GattChannel)> = records
        .iter()
        .filter_map(|record| match record {
            ReplayRecord::Push {
                step: s,
                notification,
            } if *s == step => Some((
                notification.device_id.to_string(),
                notification.channel,
            )),
            _ => None,
        })
        .collect();
    pushes.sort();
    pushes
}

fn listener_events(records: &[ReplayRecord]) -> Vec<&str> {
    records
        .iter()
        .filter_map(|record| match record {
            ReplayRecord::Listener { event, .. } => Some(event.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_demo_scenario() {
    let records = ScriptRunner::new(AppConfig::default())
        .unwrap()
        .run(&demo_script())
        .await
        .unwrap();

    assert_eq!(
        listener_events(&records),
        vec![
            "deviceConnected",
            "deviceConnected",
            "deviceConnected",
            "messageReceived",
            "deviceDisconnected",
        ]
    );

    // Discovery subscribe of the third peer pushes one announcement to it
    assert_eq!(
        pushes_in_step(&records, 8),
        vec![("AA:AA:AA:AA:AA:03".to_string(), GattChannel::Discovery)]
    );

    // The write from the second peer reaches the other two only
    assert_eq!(
        pushes_in_step(&records, 9),
        vec![
            ("AA:AA:AA:AA:AA:01".to_string(), GattChannel::Message),
            ("AA:AA:AA:AA:AA:03".to_string(), GattChannel::Message),
        ]
    );
    assert!(records.contains(&ReplayRecord::WriteAck {
        step: 9,
        data: Some(r#"{"type":"message","text":"hello nearby"}"#.to_string()),
    }));

    let status = records
        .iter()
        .find_map(|record| match record {
            ReplayRecord::Status { status, .. } => Some(status.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(status.state, LifecycleState::Advertising);
    assert_eq!(status.connected_peers.len(), 2);
    assert_eq!(status.message_subscribers.len(), 2);
}

#[tokio::test]
async fn test_rejected_commands_are_recorded() {
    let steps = parse_script(
        r#"[
            {"op": "start", "username": "alice"},
            {"op": "start"},
            {"op": "advertise_result", "success": false, "error_code": 2},
            {"op": "connect", "device": "A"},
            {"op": "status"}
        ]"#,
    )
    .unwrap();

    let records = ScriptRunner::new(AppConfig::default())
        .unwrap()
        .run(&steps)
        .await
        .unwrap();

    match &records[0] {
        ReplayRecord::Error { step, message } => {
            assert_eq!(*step, 1);
            assert!(message.contains("starting"));
        }
        other => panic!("expected error record, got {:?}", other),
    }

    // The connect arrived while stopped and was ignored
    assert!(listener_events(&records).is_empty());
    match records.last().unwrap() {
        ReplayRecord::Status { status, .. } => {
            assert_eq!(status.state, LifecycleState::Stopped);
            assert_eq!(status.last_error_code.map(|code| code.code()), Some(2));
        }
        other => panic!("expected status record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reads_and_raw_descriptors() {
    let steps = parse_script(
        r#"[
            {"op": "start", "user_id": "u-9", "username": "zoe"},
            {"op": "advertise_result", "success": true},
            {"op": "connect", "device": "A", "name_unavailable": true},
            {"op": "read", "device": "A", "channel": "discovery"},
            {"op": "descriptor", "device": "A",
             "characteristic": "19b10002-e8f2-537e-4f6c-d104768a1214", "value": [1, 0]},
            {"op": "descriptor", "device": "A",
             "characteristic": "19b10009-e8f2-537e-4f6c-d104768a1214", "value": [1, 0]}
        ]"#,
    )
    .unwrap();

    let records = ScriptRunner::new(AppConfig::default())
        .unwrap()
        .run(&steps)
        .await
        .unwrap();

    let connected = records
        .iter()
        .find_map(|record| match record {
            ReplayRecord::Listener { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(connected["name"], "Unknown");

    let read = records
        .iter()
        .find_map(|record| match record {
            ReplayRecord::ReadValue { data, .. } => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    let announcement: serde_json::Value = serde_json::from_str(&read).unwrap();
    assert_eq!(announcement["type"], "discovery");
    assert_eq!(announcement["userId"], "u-9");
    assert_eq!(announcement["username"], "zoe");

    assert_eq!(
        pushes_in_step(&records, 4),
        vec![("A".to_string(), GattChannel::Discovery)]
    );
    assert!(records
        .iter()
        .any(|record| matches!(record, ReplayRecord::Error { step: 5, .. })));
}

#[test]
fn test_invalid_script_rejected() {
    assert!(parse_script(r#"[{"op": "teleport"}]"#).is_err());
    assert!(parse_script(r#"{"op": "stop"}"#).is_err());
}

#[test]
fn test_records_written_as_json_lines() {
    let records = vec![
        ReplayRecord::WriteAck {
            step: 3,
            data: None,
        },
        ReplayRecord::Error {
            step: 4,
            message: "nope".to_string(),
        },
    ];

    let mut out = Vec::new();
    CommandDispatcher::write_records(&mut out, &records).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(
        text,
        "{\"kind\":\"write_ack\",\"step\":3,\"data\":null}\n{\"kind\":\"error\",\"step\":4,\"message\":\"nope\"}\n"
    );
}
