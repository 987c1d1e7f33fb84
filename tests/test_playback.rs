use stagehand::{play, play_json, Event, Manager, NodeType};

const STAGE: &str = r#"{
    "name": "kitchen_sink",
    "scripts": {
        "rise": "fn run() { ease(\"ease_in_out\", time / duration) * height }",
        "reveal": "fn preprocess() { duration }\nfn run() { grapheme_prefix(text, (time / duration * grapheme_count(text).to_float()).floor().to_int()) }"
    },
    "actors": {
        "balloon": {
            "actor_type": "sprite",
            "id": "balloon",
            "attributes": { "y": { "type": "float", "data": 0.0 } }
        }
    },
    "actions": {
        "rise": {
            "kind": "modifier",
            "attribute": "y",
            "value_kind": "float",
            "script": "rise",
            "parameters": { "height": { "type": "float", "data": 4.0 } }
        }
    },
    "beats": [
        {
            "dialog": { "speaker": "narrator", "text": "Up it goes." },
            "activities": {
                "1": {
                    "actor": "balloon",
                    "timeline": { "tracks": [ { "keyframes": [
                        { "time": 0.0, "duration": 1.0, "action": "rise" }
                    ] } ] }
                }
            }
        },
        {
            "dialog": {
                "text": "Gone.",
                "transition": { "script": "reveal", "duration": 0.5 }
            }
        }
    ]
}"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_play_runs_every_beat() {
    init_tracing();
    let (manager, playback) = play_json(STAGE, 0.1, 10.0).unwrap();

    assert!(playback.finished);
    assert_eq!(playback.beats, 2);
    assert!(
        playback.end_time > 1.3 && playback.end_time < 1.8,
        "ended at {}",
        playback.end_time
    );
    assert_eq!(manager.beat_index(), Some(1));
    assert_eq!(manager.dialog_text(), Some("Gone."));
    // The balloon left with the first beat.
    assert!(manager.actor_attributes(&[1]).is_none());
}

#[test]
fn test_play_event_stream() {
    init_tracing();
    let (_, playback) = play_json(STAGE, 0.1, 10.0).unwrap();

    match playback.events.first() {
        Some(Event::NodeConstructed { node_type, parent, .. }) => {
            assert_eq!(*node_type, NodeType::Stage);
            assert_eq!(*parent, None);
        }
        other => panic!("unexpected first event: {:?}", other),
    }
    assert!(!playback
        .events
        .iter()
        .any(|e| matches!(e, Event::NodeFailure { .. })));

    // The balloon reached its full height before the beat ended.
    let final_y = playback
        .events
        .iter()
        .filter_map(|e| match e {
            Event::NodeAttributesDirty { changes, .. } => {
                changes.iter().find(|c| c.key == "y").and_then(|c| c.value.clone())
            }
            _ => None,
        })
        .last()
        .and_then(|v| v.as_float())
        .unwrap();
    assert!((final_y - 4.0).abs() < 1e-3, "final y {}", final_y);

    // Every event serializes to one JSON line.
    for event in &playback.events {
        let line = serde_json::to_string(event).unwrap();
        assert!(!line.contains('\n'));
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(json["event"].is_string());
    }
}

#[test]
fn test_play_stops_at_until() {
    init_tracing();
    let (_, playback) = play_json(STAGE, 0.1, 0.5).unwrap();
    assert!(!playback.finished);
    assert_eq!(playback.beats, 1);
    assert!(playback.end_time <= 0.5);
}

#[test]
fn test_play_rejects_bad_input() {
    let mut manager = Manager::default();
    assert!(play(&mut manager, 0.1, 1.0).is_err());
    assert!(play_json(STAGE, 0.0, 1.0).is_err());
    assert!(play_json("{ not json", 0.1, 1.0).is_err());
}
