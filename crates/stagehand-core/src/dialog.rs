//! # Dialog Module
//!
//! The dialog line shown during a beat.
//!
//! ## Responsibilities
//! - **TextRegion**: derives the `text` attribute, optionally paced by a
//!   transition script, and tracks visibility through the `visible` attribute.
//! - **Dialog**: the scene's text region, swapped on every beat by
//!   [`Dialog::advance`].
//!
//! ## Transition Scripts
//! Before `preprocess()` runs, the script sees `text` (the base text),
//! `duration` and `rate` (unit when not authored). `preprocess()` returns the
//! total reveal duration. Every update then calls `run()` with `time` set to
//! the elapsed time, clamped to that duration, and shows the returned text.

use crate::attributes::{AttributeMap, AttributeRegistry, AttributeStack};
use crate::data::{DialogData, StageData, TextRegionData, TransitionData};
use crate::errors::{ScriptError, StageError};
use crate::events::{AttributeChange, Event};
use crate::manager::Context;
use crate::node::{Node, NodeHandle, NodeType};
use crate::scripting::ScriptEngine;
use crate::timeline::ActionTimeline;
use crate::value::{Value, ValueKind};
use std::sync::Arc;
use tracing::{debug, info};

pub const TEXT: &str = "text";
pub const VISIBLE: &str = "visible";
pub const SPEAKER: &str = "speaker";
pub const ATTACHMENTS: &str = "attachments";

struct Transition {
    script: String,
    engine: ScriptEngine,
    total: f64,
}

impl Transition {
    fn init(
        ctx: &mut Context,
        stage: &StageData,
        text: &str,
        data: &TransitionData,
    ) -> Result<Self, StageError> {
        let source = stage
            .scripts
            .get(&data.script)
            .ok_or_else(|| StageError::MissingScript(data.script.clone()))?;
        let context = format!("transition (script '{}')", data.script);

        let mut engine = ctx.runtime().create_engine();
        engine.set_property(TEXT, &Value::text(text));
        engine.set_property("duration", &data.duration.map(Value::Float).unwrap_or_default());
        engine.set_property("rate", &data.rate.map(Value::Float).unwrap_or_default());
        engine
            .evaluate(source)
            .map_err(|e| e.context(context.clone()))?;
        let total = engine
            .invoke("preprocess", &[], ValueKind::Float)
            .map_err(|e| e.context(context.clone()))?
            .as_float()
            .unwrap_or(0.0)
            .max(0.0);
        forward_logs(ctx, &mut engine);

        Ok(Self {
            script: data.script.clone(),
            engine,
            total,
        })
    }

    fn run(&mut self, ctx: &mut Context, t: f64) -> Result<Value, ScriptError> {
        self.engine
            .set_property("time", &Value::Float(t.clamp(0.0, self.total)));
        let result = self.engine.invoke("run", &[], ValueKind::Text);
        forward_logs(ctx, &mut self.engine);
        result.map_err(|e| e.context(format!("transition (script '{}')", self.script)))
    }
}

fn forward_logs(ctx: &mut Context, engine: &mut ScriptEngine) {
    for (level, message) in engine.take_logs() {
        ctx.log(level, message);
    }
}

pub struct TextRegion {
    handle: NodeHandle,
    data: Arc<TextRegionData>,
    registry: AttributeRegistry,
    timeline: Option<ActionTimeline>,
    transition: Option<Transition>,
    visible: bool,
}

impl Node for TextRegion {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::TextRegion
    }
}

impl TextRegion {
    /// Constructs and initializes a region. `extra` attributes (such as the
    /// speaker) are added to its initial attributes.
    pub fn create(
        ctx: &mut Context,
        parent: NodeHandle,
        stage: &Arc<StageData>,
        data: Arc<TextRegionData>,
        extra: AttributeMap,
    ) -> Self {
        let handle = ctx.construct(
            NodeType::TextRegion,
            Some(parent),
            NodeType::TextRegion.label(),
        );
        let mut region = Self {
            handle,
            registry: AttributeRegistry::with_tolerance(ctx.config().float_tolerance),
            visible: data.visible,
            data,
            timeline: None,
            transition: None,
        };
        if let Err(err) = region.init(ctx, stage, extra) {
            ctx.fail(handle, err);
        }
        region
    }

    fn init(
        &mut self,
        ctx: &mut Context,
        stage: &Arc<StageData>,
        extra: AttributeMap,
    ) -> Result<(), StageError> {
        let data = self.data.clone();
        let mut initial = extra;
        initial.insert(VISIBLE.into(), Value::Bool(data.visible));
        initial.insert(
            ATTACHMENTS.into(),
            Value::Array(data.attachments.iter().map(Value::text).collect()),
        );

        let text = match &data.transition {
            Some(transition) => {
                let mut transition = Transition::init(ctx, stage, &data.text, transition)?;
                let text = transition.run(ctx, 0.0)?;
                self.transition = Some(transition);
                text
            }
            None => Value::text(data.text.as_str()),
        };
        initial.insert(TEXT.into(), text);

        if let Some(timeline) = &data.timeline {
            self.timeline = Some(ActionTimeline::init(
                ctx,
                self.handle,
                stage,
                &[timeline.clone()],
                Some(initial.clone()),
                1,
            )?);
        }
        self.registry.update(&initial);
        ctx.mark_ready(self.handle);
        Ok(())
    }

    pub fn attributes(&self) -> &AttributeMap {
        self.registry.attributes()
    }

    pub fn text(&self) -> Option<&str> {
        self.registry.get(TEXT).and_then(Value::as_text)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Total duration reported by the transition script.
    pub fn transition_duration(&self) -> Option<f64> {
        self.transition.as_ref().map(|t| t.total)
    }

    /// Updates at beat time `t` and returns the time until the region is done.
    pub fn update(&mut self, ctx: &mut Context, t: f64) -> f64 {
        if !ctx.is_ready(self.handle) {
            return 0.0;
        }
        let mut working = self.registry.attributes().clone();
        let mut remaining = 0.0f64 - t;

        if let Some(timeline) = self.timeline.as_mut() {
            working = timeline.update(ctx, t, &working, &AttributeStack::new(), true, false);
            remaining = remaining.max(timeline.remaining_time(t));
        }
        if let Some(transition) = self.transition.as_mut() {
            match transition.run(ctx, t) {
                Ok(text) => {
                    working.insert(TEXT.into(), text);
                }
                Err(err) => {
                    ctx.fail(self.handle, err);
                    return 0.0;
                }
            }
            remaining = remaining.max(transition.total - t);
        }

        self.registry.update(&working);
        self.publish(ctx);
        remaining
    }

    /// Emits visibility edges and dirty attributes.
    fn publish(&mut self, ctx: &mut Context) {
        let visible = self
            .registry
            .get(VISIBLE)
            .and_then(Value::as_bool)
            .unwrap_or(self.visible);
        if visible != self.visible {
            self.visible = visible;
            debug!(region = %self.handle, visible, "Visibility changed");
            ctx.emit(Event::NodeVisibilityChanged {
                handle: self.handle,
                visible,
            });
        }

        let mut changes = Vec::new();
        self.registry.handle_dirty_attributes(|key, value| {
            changes.push(AttributeChange {
                key: key.to_string(),
                value: value.cloned(),
            });
            true
        });
        if !changes.is_empty() {
            ctx.emit(Event::NodeAttributesDirty {
                handle: self.handle,
                changes,
            });
        }
    }

    pub fn fina(&mut self, ctx: &mut Context) {
        if let Some(mut timeline) = self.timeline.take() {
            timeline.fina(ctx);
        }
        self.transition = None;
        self.registry.reset();
        ctx.release(self.handle);
    }
}

/// The scene's dialog. Each beat replaces its text region.
pub struct Dialog {
    handle: NodeHandle,
    region: Option<TextRegion>,
}

impl Node for Dialog {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::Dialog
    }
}

impl Dialog {
    pub fn new(ctx: &mut Context, parent: NodeHandle) -> Self {
        let handle = ctx.construct(NodeType::Dialog, Some(parent), NodeType::Dialog.label());
        ctx.mark_ready(handle);
        Self {
            handle,
            region: None,
        }
    }

    /// Shows the next line.
    pub fn advance(&mut self, ctx: &mut Context, stage: &Arc<StageData>, data: &DialogData) {
        if let Some(mut old) = self.region.take() {
            old.fina(ctx);
        }
        let mut extra = AttributeMap::new();
        if let Some(speaker) = &data.speaker {
            extra.insert(SPEAKER.into(), Value::text(speaker.as_str()));
        }
        info!(speaker = data.speaker.as_deref().unwrap_or(""), "Dialog advanced");
        self.region = Some(TextRegion::create(
            ctx,
            self.handle,
            stage,
            Arc::new(data.region.clone()),
            extra,
        ));
    }

    pub fn region(&self) -> Option<&TextRegion> {
        self.region.as_ref()
    }

    pub fn text(&self) -> Option<&str> {
        self.region.as_ref().and_then(TextRegion::text)
    }

    pub fn attributes(&self) -> Option<&AttributeMap> {
        self.region.as_ref().map(TextRegion::attributes)
    }

    pub fn update(&mut self, ctx: &mut Context, t: f64) -> f64 {
        match self.region.as_mut() {
            Some(region) => region.update(ctx, t),
            None => 0.0,
        }
    }

    pub fn fina(&mut self, ctx: &mut Context) {
        if let Some(mut region) = self.region.take() {
            region.fina(ctx);
        }
        ctx.release(self.handle);
    }
}
