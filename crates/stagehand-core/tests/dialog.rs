//! Dialog Tests
//!
//! Text regions: transition pacing, attributes and visibility edges.

use serde_json::json;
use stagehand_core::{EngineConfig, Event, Manager, NodeType, StageData, Value};

fn load(stage: serde_json::Value) -> Manager {
    let stage: StageData = serde_json::from_value(stage).unwrap();
    let mut manager = Manager::new(EngineConfig::default());
    manager.load_stage(stage).unwrap();
    manager
}

const TYPEWRITER: &str = r#"
fn preprocess() { grapheme_count(text).to_float() / rate }
fn run() { grapheme_prefix(text, (time * rate).floor().to_int()) }
"#;

fn typewriter_stage(text: &str) -> serde_json::Value {
    json!({
        "name": "letters",
        "scripts": { "typewriter": TYPEWRITER },
        "beats": [ {
            "dialog": {
                "speaker": "narrator",
                "text": text,
                "attachments": ["portrait"],
                "transition": { "script": "typewriter", "rate": 10.0 }
            }
        } ]
    })
}

/// Validates: a transition reveals the text at its own pace and reports the
/// time left until the reveal completes.
#[test]
fn typewriter_reveals_text() {
    let mut manager = load(typewriter_stage("Hello there"));
    let duration = manager
        .stage()
        .and_then(|s| s.scene().dialog().region())
        .and_then(|r| r.transition_duration())
        .unwrap();
    assert!((duration - 1.1).abs() < 1e-9);
    assert_eq!(manager.dialog_text(), Some(""));

    let remaining = manager.update(0.5).unwrap();
    assert_eq!(manager.dialog_text(), Some("Hello"));
    assert!((remaining - 0.6).abs() < 1e-9);

    let remaining = manager.update(2.0).unwrap();
    assert_eq!(manager.dialog_text(), Some("Hello there"));
    assert!(remaining < 0.0);
}

/// Validates: pacing counts grapheme clusters, not bytes.
#[test]
fn typewriter_counts_graphemes() {
    let mut manager = load(typewriter_stage("héllo wörld"));
    manager.update(0.3).unwrap();
    assert_eq!(manager.dialog_text(), Some("hél"));
}

/// Validates: speaker and attachments are published as region attributes.
#[test]
fn region_publishes_speaker_and_attachments() {
    let mut manager = load(typewriter_stage("Hi"));
    manager.update(0.0).unwrap();
    let attributes = manager.dialog_attributes().unwrap();
    assert_eq!(attributes["speaker"], Value::text("narrator"));
    assert_eq!(
        attributes["attachments"],
        Value::Array(vec![Value::text("portrait")])
    );
    assert_eq!(attributes["visible"], Value::Bool(true));
}

/// Validates: visibility changes driven by the region's timeline are
/// reported once per edge.
#[test]
fn visibility_edges_are_reported() {
    let mut manager = load(json!({
        "name": "blink",
        "scripts": { "blink": "fn run() { time < 1.0 }" },
        "actions": {
            "blink": { "kind": "modifier", "attribute": "visible", "value_kind": "bool", "script": "blink" }
        },
        "beats": [ {
            "dialog": {
                "text": "Now you see me",
                "timeline": { "tracks": [ { "keyframes": [
                    { "time": 0.0, "duration": 2.0, "action": "blink" }
                ] } ] }
            }
        } ]
    }));
    manager.drain_events();

    let mut edges = Vec::new();
    for t in [0.5, 1.5, 2.5, 3.0] {
        manager.update(t).unwrap();
        for event in manager.drain_events() {
            if let Event::NodeVisibilityChanged { handle, visible } = event {
                assert_eq!(manager.node_type(handle), Some(NodeType::TextRegion));
                edges.push((t, visible));
            }
        }
    }
    assert_eq!(edges, vec![(1.5, false)]);
    let region = manager
        .stage()
        .and_then(|s| s.scene().dialog().region())
        .unwrap();
    assert!(!region.is_visible());
}

/// Validates: the next beat replaces the dialog's text region.
#[test]
fn next_beat_replaces_region() {
    let mut manager = load(json!({
        "name": "lines",
        "beats": [
            { "dialog": { "speaker": "a", "text": "First." } },
            { "dialog": { "text": "Second." } }
        ]
    }));
    assert_eq!(manager.dialog_text(), Some("First."));
    manager.update(0.0).unwrap();
    manager.advance().unwrap();
    assert_eq!(manager.dialog_text(), Some("Second."));
    assert!(manager
        .dialog_attributes()
        .map(|a| !a.contains_key("speaker"))
        .unwrap());
}
