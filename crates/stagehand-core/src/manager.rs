//! # Manager Module
//!
//! Owner of every live node.
//!
//! ## Responsibilities
//! - **Context**: node arena (handles, parents, lifecycle state, failures),
//!   the event queue and the script runtime. Passed by `&mut` into every
//!   live node operation.
//! - **Manager**: host-facing facade over a loaded [`Stage`].

use crate::attributes::AttributeMap;
use crate::config::EngineConfig;
use crate::data::StageData;
use crate::errors::StageError;
use crate::events::{Event, EventQueue, LogLevel};
use crate::node::{Node, NodeHandle, NodeState, NodeType};
use crate::scripting::ScriptRuntime;
use crate::stage::Stage;
use crate::value::Value;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace};

/// Arena bookkeeping for one live node.
#[derive(Clone, Debug)]
struct NodeEntry {
    node_type: NodeType,
    parent: Option<NodeHandle>,
    name: String,
    state: NodeState,
    error: Option<String>,
}

/// Shared state threaded through every live node operation.
pub struct Context {
    nodes: Vec<Option<NodeEntry>>,
    generations: Vec<u32>,
    free_indices: Vec<usize>,
    events: EventQueue,
    runtime: ScriptRuntime,
    config: EngineConfig,
}

impl Context {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_indices: Vec::new(),
            events: EventQueue::new(),
            runtime: ScriptRuntime::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn runtime(&self) -> &ScriptRuntime {
        &self.runtime
    }

    /// Allocates a node in state `Uninitialized` and emits `NodeConstructed`.
    ///
    /// `name` is this node's segment of its locator path.
    pub fn construct(
        &mut self,
        node_type: NodeType,
        parent: Option<NodeHandle>,
        name: impl Into<String>,
    ) -> NodeHandle {
        let entry = NodeEntry {
            node_type,
            parent,
            name: name.into(),
            state: NodeState::Uninitialized,
            error: None,
        };
        let index = match self.free_indices.pop() {
            Some(index) => {
                self.nodes[index] = Some(entry);
                index
            }
            None => {
                self.nodes.push(Some(entry));
                self.generations.push(0);
                self.nodes.len() - 1
            }
        };
        let handle = NodeHandle {
            index: index as u32,
            generation: self.generations[index],
        };
        trace!(node = %handle, kind = node_type.label(), "Constructed");
        self.events.push(Event::NodeConstructed {
            handle,
            node_type,
            parent,
        });
        handle
    }

    fn entry(&self, handle: NodeHandle) -> Option<&NodeEntry> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        self.nodes.get(index).and_then(|n| n.as_ref())
    }

    fn entry_mut(&mut self, handle: NodeHandle) -> Option<&mut NodeEntry> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        self.nodes.get_mut(index).and_then(|n| n.as_mut())
    }

    /// Moves a node to `Ready` and emits `NodeInitialized`.
    pub fn mark_ready(&mut self, handle: NodeHandle) {
        if let Some(entry) = self.entry_mut(handle) {
            entry.state = NodeState::Ready;
            entry.error = None;
            self.events.push(Event::NodeInitialized { handle });
        }
    }

    /// Moves a node to `Failed`, records the message and emits `NodeFailure`.
    pub fn fail(&mut self, handle: NodeHandle, err: impl Display) {
        let message = format!("{}: {}", self.locator(handle), err);
        error!(node = %handle, "{}", message);
        if let Some(entry) = self.entry_mut(handle) {
            entry.state = NodeState::Failed;
            entry.error = Some(message.clone());
        }
        self.events.push(Event::NodeFailure { handle, message });
    }

    /// Returns a node to `Uninitialized` and emits `NodeFinalized`.
    pub fn finalize(&mut self, handle: NodeHandle) {
        if let Some(entry) = self.entry_mut(handle) {
            entry.state = NodeState::Uninitialized;
            self.events.push(Event::NodeFinalized { handle });
        }
    }

    /// Frees the node's slot. Its handle becomes stale.
    pub fn destroy(&mut self, handle: NodeHandle) {
        let index = handle.index as usize;
        if self.entry(handle).is_none() {
            return;
        }
        self.nodes[index] = None;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.free_indices.push(index);
    }

    /// [`finalize`](Self::finalize) then [`destroy`](Self::destroy).
    pub fn release(&mut self, handle: NodeHandle) {
        self.finalize(handle);
        self.destroy(handle);
    }

    pub fn state(&self, handle: NodeHandle) -> Option<NodeState> {
        self.entry(handle).map(|e| e.state)
    }

    pub fn is_ready(&self, handle: NodeHandle) -> bool {
        self.state(handle) == Some(NodeState::Ready)
    }

    pub fn node_type(&self, handle: NodeHandle) -> Option<NodeType> {
        self.entry(handle).map(|e| e.node_type)
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.entry(handle).and_then(|e| e.parent)
    }

    pub fn error_message(&self, handle: NodeHandle) -> Option<&str> {
        self.entry(handle).and_then(|e| e.error.as_deref())
    }

    /// Diagnostic path from the root, e.g. `stage:intro/scene/activity[1]/actor[hero]`.
    pub fn locator(&self, handle: NodeHandle) -> String {
        let mut segments = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            match self.entry(h) {
                Some(entry) => {
                    segments.push(entry.name.as_str());
                    current = entry.parent;
                }
                None => break,
            }
        }
        if segments.is_empty() {
            return format!("<stale {}>", handle);
        }
        segments.reverse();
        segments.join("/")
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Appends a diagnostic to the event queue.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.events.push(Event::Log {
            level,
            message: message.into(),
        });
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }
}

/// Host-facing entry point.
///
/// Owns the node [`Context`] and at most one loaded [`Stage`]. All playback is
/// driven by the host through [`update`](Self::update) and
/// [`advance`](Self::advance); events accumulate until
/// [`drain_events`](Self::drain_events).
pub struct Manager {
    ctx: Context,
    stage: Option<Stage>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Manager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            ctx: Context::new(config),
            stage: None,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        self.ctx.config()
    }

    /// Validates and loads a stage, replacing any loaded one, and begins its
    /// first beat at stage time zero.
    #[instrument(skip_all)]
    pub fn load_stage(&mut self, data: impl Into<Arc<StageData>>) -> Result<(), StageError> {
        self.unload();
        let data = data.into();
        let mut stage = Stage::init(&mut self.ctx, data)?;
        stage.advance(&mut self.ctx);
        info!(stage = %stage.name(), beats = stage.beat_count(), "Stage loaded");
        self.stage = Some(stage);
        Ok(())
    }

    /// Finalizes the loaded stage, if any.
    pub fn unload(&mut self) {
        if let Some(mut stage) = self.stage.take() {
            stage.fina(&mut self.ctx);
            debug!("Stage unloaded");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.stage.is_some()
    }

    fn stage_mut(&mut self) -> Result<(&mut Stage, &mut Context), StageError> {
        let stage = self.stage.as_mut().ok_or(StageError::NoStage)?;
        if !self.ctx.is_ready(stage.handle()) {
            return Err(StageError::NotReady(stage.handle()));
        }
        Ok((stage, &mut self.ctx))
    }

    /// Updates the stage at `stage_time` and returns the time left in the
    /// current beat.
    pub fn update(&mut self, stage_time: f64) -> Result<f64, StageError> {
        let (stage, ctx) = self.stage_mut()?;
        Ok(stage.update(ctx, stage_time))
    }

    /// Moves to the next beat. Returns `false` when no beat remains.
    pub fn advance(&mut self) -> Result<bool, StageError> {
        let (stage, ctx) = self.stage_mut()?;
        Ok(stage.advance(ctx))
    }

    /// Makes the next update land at beat-relative time `beat_time`.
    pub fn set_next_beat_time(&mut self, beat_time: f64) -> Result<(), StageError> {
        let (stage, _) = self.stage_mut()?;
        stage.set_next_beat_time(beat_time);
        Ok(())
    }

    /// Makes the next update land at the end of the current beat.
    pub fn fast_forward(&mut self) -> Result<(), StageError> {
        let (stage, _) = self.stage_mut()?;
        stage.fast_forward();
        Ok(())
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.ctx.drain_events()
    }

    pub fn stage(&self) -> Option<&Stage> {
        self.stage.as_ref()
    }

    /// Index of the current beat, if one has started.
    pub fn beat_index(&self) -> Option<usize> {
        self.stage.as_ref().and_then(|s| s.beat_index())
    }

    pub fn node_state(&self, handle: NodeHandle) -> Option<NodeState> {
        self.ctx.state(handle)
    }

    pub fn node_type(&self, handle: NodeHandle) -> Option<NodeType> {
        self.ctx.node_type(handle)
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.ctx.parent(handle)
    }

    pub fn locator(&self, handle: NodeHandle) -> String {
        self.ctx.locator(handle)
    }

    pub fn error_message(&self, handle: NodeHandle) -> Option<&str> {
        self.ctx.error_message(handle)
    }

    /// Attributes of the actor bound to the activity at `path`.
    ///
    /// `path[0]` is a beat activity instance id; later entries walk nested
    /// child activities.
    pub fn actor_attributes(&self, path: &[u64]) -> Option<&AttributeMap> {
        let scene = self.stage.as_ref()?.scene();
        let (first, rest) = path.split_first()?;
        let mut activity = scene.activity(*first)?;
        for id in rest {
            activity = activity.child(*id)?;
        }
        activity.actor().map(|actor| actor.attributes())
    }

    pub fn actor_attribute(&self, path: &[u64], key: &str) -> Option<&Value> {
        self.actor_attributes(path)?.get(key)
    }

    /// Text currently shown by the dialog.
    pub fn dialog_text(&self) -> Option<&str> {
        self.stage.as_ref()?.scene().dialog().text()
    }

    pub fn dialog_attributes(&self) -> Option<&AttributeMap> {
        self.stage.as_ref()?.scene().dialog().attributes()
    }
}
