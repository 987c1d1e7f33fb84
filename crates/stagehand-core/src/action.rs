//! # Action Module
//!
//! Live actions bound to a keyframe occurrence.
//!
//! ## Key Types
//! - `Action`: closed union over the action kinds.
//! - `ModifierAction`: runs a script's `run()` to rewrite one attribute.
//! - `CompositeAction`: owns a nested [`ActionTimeline`] on the keyframe's
//!   local clock.
//!
//! ## Script Properties
//! While `run()` executes, a modifier script sees:
//! - `time`: seconds since the keyframe started, clamped to its preferred duration
//! - `duration`: the smaller of the preferred and effective durations
//! - `orig`: the attribute's current value
//! - `prev`: the attribute's value before this keyframe's track reached it
//! - every keyframe and action parameter by name

use crate::attributes::{AttributeMap, AttributeStack};
use crate::data::{ActionData, CompositeActionData, ModifierActionData, StageData};
use crate::errors::{ScriptError, StageError};
use crate::manager::Context;
use crate::node::{Node, NodeHandle, NodeType};
use crate::scripting::ScriptEngine;
use crate::timeline::ActionTimeline;
use crate::value::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Properties rebound before every `run()`.
const TICK_PROPERTIES: [&str; 4] = ["time", "duration", "orig", "prev"];

/// Timing of one application of an action.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ActionTiming {
    /// Seconds since the keyframe started.
    pub elapsed: f64,
    /// Authored duration; infinite for linger keyframes.
    pub preferred: f64,
    /// Length of the keyframe's active window.
    pub effective: f64,
}

impl ActionTiming {
    /// `elapsed` clamped to the preferred duration.
    pub fn time(&self) -> f64 {
        self.elapsed.min(self.preferred).max(0.0)
    }

    pub fn duration(&self) -> f64 {
        self.preferred.min(self.effective)
    }
}

pub enum Action {
    Modifier(ModifierAction),
    Composite(CompositeAction),
}

impl Node for Action {
    fn handle(&self) -> NodeHandle {
        match self {
            Action::Modifier(a) => a.handle,
            Action::Composite(a) => a.handle,
        }
    }

    fn node_type(&self) -> NodeType {
        NodeType::Action
    }
}

impl Action {
    /// Constructs and initializes the action `action_id` for one keyframe.
    ///
    /// An action that fails to initialize is still returned, in state
    /// `Failed`, so the failure stays attached to its node.
    pub fn create(
        ctx: &mut Context,
        parent: NodeHandle,
        stage: &Arc<StageData>,
        action_id: &str,
        overrides: &AttributeMap,
        depth: usize,
    ) -> Action {
        let handle = ctx.construct(
            NodeType::Action,
            Some(parent),
            format!("action[{}]", action_id),
        );
        let result = match stage.actions.get(action_id).map(|a| a.as_ref()) {
            Some(ActionData::Modifier(data)) => {
                ModifierAction::init(ctx, handle, stage, action_id, data, overrides)
                    .map(Action::Modifier)
            }
            Some(ActionData::Composite(data)) => {
                CompositeAction::init(ctx, handle, stage, data, depth).map(Action::Composite)
            }
            None => Err(StageError::MissingAction(action_id.to_string())),
        };
        match result {
            Ok(action) => {
                ctx.mark_ready(handle);
                action
            }
            Err(err) => {
                ctx.fail(handle, &err);
                Action::Modifier(ModifierAction::failed(handle, action_id))
            }
        }
    }

    pub fn as_modifier(&self) -> Option<&ModifierAction> {
        match self {
            Action::Modifier(a) => Some(a),
            Action::Composite(_) => None,
        }
    }

    pub fn fina(&mut self, ctx: &mut Context) {
        if let Action::Composite(c) = self {
            c.timeline.fina(ctx);
        }
        ctx.release(self.handle());
    }
}

pub struct ModifierAction {
    handle: NodeHandle,
    action_id: String,
    data: Option<ModifierActionData>,
    engine: Option<ScriptEngine>,
    /// Parameter name to the attribute it refers to.
    references: Vec<(String, String)>,
}

impl ModifierAction {
    fn failed(handle: NodeHandle, action_id: &str) -> Self {
        Self {
            handle,
            action_id: action_id.to_string(),
            data: None,
            engine: None,
            references: Vec::new(),
        }
    }

    /// Binds parameters and evaluates the script once.
    ///
    /// Keyframe overrides are bound before action defaults and the first
    /// binding of a name wins. Attribute reference parameters are resolved on
    /// every `modify` instead.
    fn init(
        ctx: &mut Context,
        handle: NodeHandle,
        stage: &StageData,
        action_id: &str,
        data: &ModifierActionData,
        overrides: &AttributeMap,
    ) -> Result<Self, StageError> {
        let source = stage
            .scripts
            .get(&data.script)
            .ok_or_else(|| StageError::MissingScript(data.script.clone()))?;

        let mut engine = ctx.runtime().create_engine();
        let mut bound = BTreeSet::new();
        let mut references = Vec::new();
        for (name, value) in overrides.iter().chain(data.parameters.iter()) {
            if !bound.insert(name.as_str()) {
                continue;
            }
            match value {
                Value::AttributeRef(attribute) => {
                    references.push((name.clone(), attribute.clone()));
                }
                other => engine.set_property(name, other),
            }
        }
        for name in TICK_PROPERTIES {
            if engine.has_property(name) {
                warn!(action = action_id, parameter = name, "Parameter is overwritten on every tick");
            }
        }

        engine
            .evaluate(source)
            .map_err(|e| e.context(script_context(action_id, &data.script)))?;
        forward_logs(ctx, &mut engine);
        debug!(action = action_id, script = %data.script, "Modifier action ready");

        Ok(Self {
            handle,
            action_id: action_id.to_string(),
            data: Some(data.clone()),
            engine: Some(engine),
            references,
        })
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// Attribute this action rewrites.
    pub fn attribute(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.attribute.as_str())
    }

    /// Rewrites the target attribute in `attributes`, if present.
    pub fn apply_modifier(
        &mut self,
        ctx: &mut Context,
        timing: ActionTiming,
        prev: &Value,
        attributes: &mut AttributeMap,
        stack: &AttributeStack,
    ) -> Result<(), ScriptError> {
        let Some(attribute) = self.attribute().map(str::to_string) else {
            return Ok(());
        };
        let Some(orig) = attributes.get(&attribute) else {
            return Ok(());
        };
        let value = self.modify(ctx, timing, orig.clone(), prev, stack)?;
        attributes.insert(attribute, value);
        Ok(())
    }

    /// Computes a new value from the script's `run()`.
    pub fn modify(
        &mut self,
        ctx: &mut Context,
        timing: ActionTiming,
        orig: Value,
        prev: &Value,
        stack: &AttributeStack,
    ) -> Result<Value, ScriptError> {
        let (Some(data), Some(engine)) = (self.data.as_ref(), self.engine.as_mut()) else {
            return Ok(orig);
        };
        let context = script_context(&self.action_id, &data.script);

        engine.set_property("time", &Value::Float(timing.time()));
        engine.set_property("duration", &Value::Float(timing.duration()));
        engine.set_property("orig", &orig);
        engine.set_property("prev", prev);
        for (name, attribute) in &self.references {
            let resolved = stack
                .resolve(attribute)
                .ok_or_else(|| ScriptError::UnresolvedReference(attribute.clone()))
                .map_err(|e| e.context(context.clone()))?;
            engine.set_property(name, resolved);
        }

        let result = engine.invoke("run", &[], data.value_kind);
        forward_logs(ctx, engine);
        let value = result.map_err(|e| e.context(context))?;
        trace!(action = %self.action_id, time = timing.time(), value = %value, "modify");
        Ok(value)
    }
}

pub struct CompositeAction {
    handle: NodeHandle,
    timeline: ActionTimeline,
}

impl CompositeAction {
    fn init(
        ctx: &mut Context,
        handle: NodeHandle,
        stage: &Arc<StageData>,
        data: &CompositeActionData,
        depth: usize,
    ) -> Result<Self, StageError> {
        let timeline = ActionTimeline::init(
            ctx,
            handle,
            stage,
            &[data.timeline.clone()],
            None,
            depth + 1,
        )?;
        Ok(Self { handle, timeline })
    }

    pub fn timeline(&self) -> &ActionTimeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut ActionTimeline {
        &mut self.timeline
    }
}

fn script_context(action_id: &str, script: &str) -> String {
    format!("action '{}' (script '{}')", action_id, script)
}

fn forward_logs(ctx: &mut Context, engine: &mut ScriptEngine) {
    for (level, message) in engine.take_logs() {
        ctx.log(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_clamps_to_preferred_duration() {
        let timing = ActionTiming {
            elapsed: 12.0,
            preferred: 10.0,
            effective: 10.0,
        };
        assert_eq!(timing.time(), 10.0);
        assert_eq!(timing.duration(), 10.0);

        let capped = ActionTiming {
            elapsed: 1.0,
            preferred: 10.0,
            effective: 4.0,
        };
        assert_eq!(capped.duration(), 4.0);
    }

    #[test]
    fn linger_timing_is_unclamped() {
        let timing = ActionTiming {
            elapsed: 42.0,
            preferred: f64::INFINITY,
            effective: 5.0,
        };
        assert_eq!(timing.time(), 42.0);
        assert_eq!(timing.duration(), 5.0);
    }
}
