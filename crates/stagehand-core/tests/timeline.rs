//! Action Timeline Tests
//!
//! Drives timelines directly through a `Context`, without a stage or manager.

use serde_json::json;
use stagehand_core::attributes::{AttributeMap, AttributeStack};
use stagehand_core::data::{ActionTimelineData, StageData};
use stagehand_core::timeline::ActionTimeline;
use stagehand_core::{Context, EngineConfig, Event, NodeType, Value};
use std::sync::Arc;

fn stage() -> Arc<StageData> {
    let stage: StageData = serde_json::from_value(json!({
        "name": "timelines",
        "scripts": {
            "ramp": "fn run() { base + time / duration }",
            "constant": "fn run() { value }",
            "elapsed": "fn run() { time }",
            "span": "fn run() { duration }",
            "slide": "fn run() { let t = time / duration; [prev[0] + t, prev[1] + 2.0 * t] }",
            "bump": "fn run() { orig + 1.0 }"
        },
        "actions": {
            "ramp": {
                "kind": "modifier", "attribute": "x", "value_kind": "float", "script": "ramp",
                "parameters": { "base": { "type": "float", "data": 0.0 } }
            },
            "constant": {
                "kind": "modifier", "attribute": "x", "value_kind": "float", "script": "constant",
                "parameters": { "value": { "type": "float", "data": 0.0 } }
            },
            "elapsed": { "kind": "modifier", "attribute": "x", "value_kind": "float", "script": "elapsed" },
            "span": { "kind": "modifier", "attribute": "x", "value_kind": "float", "script": "span" },
            "slide": { "kind": "modifier", "attribute": "pos", "value_kind": "vector2", "script": "slide" },
            "bump": { "kind": "modifier", "attribute": "x", "value_kind": "float", "script": "bump" },
            "sweep": {
                "kind": "composite",
                "timeline": { "tracks": [ { "keyframes": [
                    { "time": 0.0, "duration": 1.0, "action": "ramp" },
                    { "time": 1.0, "duration": 1.0, "action": "ramp",
                      "parameters": { "base": { "type": "float", "data": 1.0 } } }
                ] } ] }
            },
            "loop": {
                "kind": "composite",
                "timeline": { "tracks": [ { "keyframes": [
                    { "time": 0.0, "duration": 1.0, "action": "loop" }
                ] } ] }
            }
        }
    }))
    .unwrap();
    Arc::new(stage)
}

fn build(ctx: &mut Context, stage: &Arc<StageData>, data: serde_json::Value) -> ActionTimeline {
    let data: ActionTimelineData = serde_json::from_value(data).unwrap();
    let owner = ctx.construct(NodeType::Activity, None, "owner");
    ActionTimeline::init(ctx, owner, stage, &[Arc::new(data)], None, 1).unwrap()
}

fn initial() -> AttributeMap {
    let mut map = AttributeMap::new();
    map.insert("x".into(), Value::Float(0.0));
    map.insert("pos".into(), Value::vec2(0.0, 0.0));
    map
}

fn float(map: &AttributeMap, key: &str) -> f64 {
    map.get(key).and_then(Value::as_float).unwrap()
}

fn layered() -> serde_json::Value {
    json!({
        "effective_duration": 6.0,
        "tracks": [
            { "keyframes": [
                { "time": 0.0, "duration": 2.0, "action": "ramp" },
                { "time": 3.0, "duration": -1.0, "action": "ramp",
                  "parameters": { "base": { "type": "float", "data": 10.0 } } }
            ] },
            { "keyframes": [
                { "time": 0.5, "duration": 1.0, "action": "slide" },
                { "time": 2.0, "duration": 2.0, "action": "slide" }
            ] }
        ]
    })
}

/// Sweeps a timeline continuously and compares against one random-access update.
///
/// Validates: folding finished keyframes tick by tick ends in the same state
/// as replaying everything at once, both mid-window and past the end.
#[test]
fn continuous_sweep_matches_random_access() {
    let stage = stage();
    let stack = AttributeStack::new();

    for last_step in [35, 80] {
        let mut ctx = Context::new(EngineConfig::default());
        let mut swept = build(&mut ctx, &stage, layered());
        let mut state = initial();
        let mut end = 0.0;
        for i in 0..=last_step {
            end = i as f64 * 0.1;
            state = swept.update(&mut ctx, end, &state, &stack, true, false);
        }

        let mut direct = build(&mut ctx, &stage, layered());
        let once = direct.update(&mut ctx, end, &initial(), &stack, false, false);

        for key in ["x", "pos"] {
            assert!(
                state[key].approx_eq(&once[key]),
                "{} differs at t={}: {} vs {}",
                key,
                end,
                state[key],
                once[key]
            );
        }
    }
}

/// Past the end every keyframe is folded at its final time.
#[test]
fn finished_timeline_reaches_final_values() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());
    let mut timeline = build(&mut ctx, &stage, layered());

    let out = timeline.update(&mut ctx, 8.0, &initial(), &stack, false, false);
    // Lingering ramp lasts until the bound at 6.0: base 10 + 3 / 3.
    assert!((float(&out, "x") - 11.0).abs() < 1e-9);
    assert!(out["pos"].approx_eq(&Value::vec2(2.0, 4.0)));
    assert_eq!(timeline.cursors(), vec![2, 2]);
    assert!((timeline.remaining_time(8.0) + 2.0).abs() < 1e-9);
}

/// Validates: `sample(t)` and a random-access `update(t)` pick the same keyframe.
#[test]
fn sample_matches_update_selection() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());
    let mut timeline = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [
            { "keyframes": [
                { "time": 0.0, "duration": 1.0, "action": "constant" },
                { "time": 2.0, "duration": 1.0, "action": "constant" },
                { "time": 2.0, "duration": 0.5, "action": "constant" },
                { "time": 5.0, "duration": -1.0, "action": "constant" }
            ] },
            { "keyframes": [
                { "time": 1.0, "duration": 3.0, "action": "slide" }
            ] }
        ] }),
    );

    for t in [-1.0, 0.0, 0.5, 1.0, 1.5, 2.0, 2.25, 3.0, 4.9, 5.0, 9.0] {
        timeline.update(&mut ctx, t, &initial(), &stack, false, false);
        let mut expected = vec![None; timeline.track_count()];
        for (track, keyframe) in timeline.sample(t) {
            expected[track] = Some(keyframe);
        }
        assert_eq!(timeline.selected(), expected, "selection at t={}", t);
    }
}

/// Validates: within one tick a later track overrides an earlier one.
#[test]
fn later_tracks_override_earlier_tracks() {
    let stage = stage();
    let stack = AttributeStack::new();
    let constant = |value: f64| {
        json!({ "keyframes": [ { "time": 0.0, "duration": 5.0, "action": "constant",
            "parameters": { "value": { "type": "float", "data": value } } } ] })
    };

    let mut ctx = Context::new(EngineConfig::default());
    let mut forward = build(&mut ctx, &stage, json!({ "tracks": [constant(1.0), constant(2.0)] }));
    let out = forward.update(&mut ctx, 1.0, &initial(), &stack, true, false);
    assert_eq!(out["x"], Value::Float(2.0));

    let mut reversed = build(&mut ctx, &stage, json!({ "tracks": [constant(2.0), constant(1.0)] }));
    let out = reversed.update(&mut ctx, 1.0, &initial(), &stack, true, false);
    assert_eq!(out["x"], Value::Float(1.0));
}

/// Validates: `duration` is the preferred duration capped by the next keyframe,
/// and a final lingering keyframe runs until the timeline bound.
#[test]
fn scripts_see_effective_duration() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());

    let mut capped = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [ { "keyframes": [
            { "time": 0.0, "duration": 10.0, "action": "span" },
            { "time": 4.0, "duration": 1.0, "action": "constant" }
        ] } ] }),
    );
    let out = capped.update(&mut ctx, 1.0, &initial(), &stack, true, false);
    assert_eq!(out["x"], Value::Float(4.0));

    let mut lingering = build(
        &mut ctx,
        &stage,
        json!({ "effective_duration": 6.0, "tracks": [ { "keyframes": [
            { "time": 0.0, "duration": -1.0, "action": "elapsed" }
        ] } ] }),
    );
    let out = lingering.update(&mut ctx, 2.5, &initial(), &stack, true, false);
    assert_eq!(out["x"], Value::Float(2.5));
    let out = lingering.update(&mut ctx, 100.0, &out, &stack, true, false);
    assert_eq!(out["x"], Value::Float(6.0));
}

/// Validates: `prev` is the value left by earlier keyframes on the same track.
#[test]
fn prev_folds_earlier_keyframes_on_the_track() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());
    let mut timeline = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [ { "keyframes": [
            { "time": 0.0, "duration": 1.0, "action": "slide" },
            { "time": 1.0, "duration": 1.0, "action": "slide" }
        ] } ] }),
    );

    let out = timeline.update(&mut ctx, 1.5, &initial(), &stack, true, false);
    assert!(out["pos"].approx_eq(&Value::vec2(1.5, 3.0)));
    assert_eq!(
        timeline.get_prev_value(&mut ctx, 0, 1, &stack),
        Value::vec2(1.0, 2.0)
    );
    assert_eq!(
        timeline.get_base_value(&mut ctx, 2.0, "pos", None, &stack),
        Some(Value::vec2(2.0, 4.0))
    );
}

/// Validates: `get_base_value` stops before the named keyframe on its track
/// and leaves the next update to replay from scratch.
#[test]
fn base_value_stops_before_keyframe() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());
    let mut timeline = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [
            { "keyframes": [
                { "time": 0.0, "duration": 1.0, "action": "slide" },
                { "time": 1.0, "duration": 1.0, "action": "slide" }
            ] },
            { "keyframes": [
                { "time": 0.0, "duration": 1.0, "action": "elapsed" }
            ] }
        ] }),
    );
    timeline.update(&mut ctx, 0.0, &initial(), &stack, true, false);

    assert_eq!(
        timeline.get_base_value(&mut ctx, 3.0, "pos", Some((0, 1)), &stack),
        Some(Value::vec2(1.0, 2.0))
    );
    assert_eq!(
        timeline.get_base_value(&mut ctx, 3.0, "pos", Some((0, 0)), &stack),
        Some(Value::vec2(0.0, 0.0))
    );
    // Other tracks still play up to `t`.
    assert_eq!(
        timeline.get_base_value(&mut ctx, 3.0, "x", Some((0, 0)), &stack),
        Some(Value::Float(1.0))
    );

    let out = timeline.update(&mut ctx, 1.5, &initial(), &stack, true, false);
    assert!(out["pos"].approx_eq(&Value::vec2(1.5, 3.0)));
}

/// Validates: stepping back in time replays from the initial attributes, so a
/// script relative to `orig` is not applied on top of its own earlier result.
#[test]
fn rewind_replays_from_initial_attributes() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());
    let mut timeline = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [ { "keyframes": [
            { "time": 0.0, "duration": 1.0, "action": "bump" },
            { "time": 4.0, "duration": 1.0, "action": "constant",
              "parameters": { "value": { "type": "float", "data": 7.0 } } }
        ] } ] }),
    );

    let mut state = timeline.update(&mut ctx, 0.0, &initial(), &stack, true, false);
    assert_eq!(state["x"], Value::Float(1.0));
    state = timeline.update(&mut ctx, 6.0, &state, &stack, true, false);
    assert_eq!(state["x"], Value::Float(7.0));

    state = timeline.update(&mut ctx, 2.0, &state, &stack, true, false);
    assert_eq!(state["x"], Value::Float(1.0));
    assert_eq!(timeline.cursors(), vec![1]);
}

/// Validates: a composite keyframe runs its nested timeline on its own clock
/// and drains it when the keyframe finishes.
#[test]
fn composite_runs_nested_timeline_on_local_clock() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());
    let mut timeline = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [ { "keyframes": [
            { "time": 2.0, "duration": 2.0, "action": "sweep" }
        ] } ] }),
    );

    let mut state = initial();
    for (t, expected) in [(1.0, 0.0), (2.5, 0.5), (3.5, 1.5), (5.0, 2.0)] {
        state = timeline.update(&mut ctx, t, &state, &stack, true, false);
        assert!(
            (float(&state, "x") - expected).abs() < 1e-9,
            "x at t={} was {}",
            t,
            float(&state, "x")
        );
    }
    assert_eq!(timeline.cursors(), vec![1]);
}

/// Validates: modifiers leave an absent target attribute absent.
#[test]
fn absent_target_attribute_is_untouched() {
    let stage = stage();
    let stack = AttributeStack::new();
    let mut ctx = Context::new(EngineConfig::default());
    let mut timeline = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [ { "keyframes": [
            { "time": 0.0, "duration": 1.0, "action": "ramp" }
        ] } ] }),
    );
    let out = timeline.update(&mut ctx, 0.5, &AttributeMap::new(), &stack, true, false);
    assert!(out.is_empty());
}

/// Validates: runaway composite nesting fails the innermost action instead of
/// recursing without bound.
#[test]
fn composite_nesting_is_bounded() {
    let stage = stage();
    let stack = AttributeStack::new();
    let config = EngineConfig {
        max_timeline_depth: 3,
        ..Default::default()
    };
    let mut ctx = Context::new(config);
    let mut timeline = build(
        &mut ctx,
        &stage,
        json!({ "tracks": [ { "keyframes": [
            { "time": 0.0, "duration": 1.0, "action": "loop" }
        ] } ] }),
    );

    let out = timeline.update(&mut ctx, 0.5, &initial(), &stack, true, false);
    assert_eq!(out, initial());
    let failures: Vec<String> = ctx
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::NodeFailure { message, .. } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("nesting exceeds 3"), "{}", failures[0]);
}
