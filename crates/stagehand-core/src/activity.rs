//! # Activity Module
//!
//! Binds an actor to a timeline for one beat.
//!
//! ## Responsibilities
//! - **Activity**: merges the actor's default attributes with its own
//!   overrides, runs the pooled actor and activity timelines, and recurses
//!   into the actor's nested child activities.
//! - **Actor**: owns the attribute registry and reports its dirty attributes
//!   as events.
//!
//! An actor kept across a beat change keeps its registry, so accumulated
//! values carry over instead of snapping back to the defaults.

use crate::attributes::{AttributeMap, AttributeRegistry, AttributeStack};
use crate::data::{ActivityData, ActorData, StageData};
use crate::errors::StageError;
use crate::events::{AttributeChange, Event};
use crate::manager::Context;
use crate::node::{Node, NodeHandle, NodeType};
use crate::timeline::ActionTimeline;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct Actor {
    handle: NodeHandle,
    data: Arc<ActorData>,
    registry: AttributeRegistry,
}

impl Node for Actor {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::Actor
    }
}

impl Actor {
    fn new(ctx: &mut Context, parent: NodeHandle, data: Arc<ActorData>) -> Self {
        let handle = ctx.construct(
            NodeType::Actor,
            Some(parent),
            format!("actor[{}]", data.id),
        );
        let registry = AttributeRegistry::with_tolerance(ctx.config().float_tolerance);
        Self {
            handle,
            data,
            registry,
        }
    }

    pub fn id(&self) -> &str {
        &self.data.id
    }

    pub fn actor_type(&self) -> &str {
        &self.data.actor_type
    }

    pub fn attributes(&self) -> &AttributeMap {
        self.registry.attributes()
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    /// Emits one `NodeAttributesDirty` event for everything changed since the
    /// last drain.
    fn drain_dirty(&mut self, ctx: &mut Context) {
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

    fn fina(&mut self, ctx: &mut Context) {
        self.registry.reset();
        ctx.release(self.handle);
    }
}

pub struct Activity {
    handle: NodeHandle,
    instance_id: u64,
    data: Arc<ActivityData>,
    actor: Option<Actor>,
    timeline: Option<ActionTimeline>,
    children: BTreeMap<u64, Activity>,
    depth: usize,
}

impl Node for Activity {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::Activity
    }
}

impl Activity {
    /// Constructs and initializes an activity instance.
    ///
    /// Failures leave the activity in state `Failed`; it then contributes
    /// nothing to updates.
    pub fn create(
        ctx: &mut Context,
        parent: NodeHandle,
        stage: &Arc<StageData>,
        instance_id: u64,
        data: Arc<ActivityData>,
        depth: usize,
    ) -> Self {
        let handle = ctx.construct(
            NodeType::Activity,
            Some(parent),
            format!("activity[{}]", instance_id),
        );
        let mut activity = Self {
            handle,
            instance_id,
            data,
            actor: None,
            timeline: None,
            children: BTreeMap::new(),
            depth,
        };
        activity.init(ctx, stage);
        activity
    }

    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn data(&self) -> &Arc<ActivityData> {
        &self.data
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    pub fn timeline(&self) -> Option<&ActionTimeline> {
        self.timeline.as_ref()
    }

    pub fn child(&self, instance_id: u64) -> Option<&Activity> {
        self.children.get(&instance_id)
    }

    pub fn children(&self) -> impl Iterator<Item = &Activity> {
        self.children.values()
    }

    /// Re-initializes with new data, keeping the actor when it is the same one.
    pub fn rebind(&mut self, ctx: &mut Context, stage: &Arc<StageData>, data: Arc<ActivityData>) {
        if let Some(mut timeline) = self.timeline.take() {
            timeline.fina(ctx);
        }
        self.data = data;
        self.init(ctx, stage);
    }

    fn init(&mut self, ctx: &mut Context, stage: &Arc<StageData>) {
        if let Err(err) = self.try_init(ctx, stage) {
            ctx.fail(self.handle, err);
        }
    }

    #[instrument(skip_all, fields(activity = self.instance_id, actor = %self.data.actor))]
    fn try_init(&mut self, ctx: &mut Context, stage: &Arc<StageData>) -> Result<(), StageError> {
        let max_depth = ctx.config().max_timeline_depth;
        if self.depth > max_depth {
            return Err(StageError::RecursionLimit(max_depth));
        }
        let actor_data = stage
            .actors
            .get(&self.data.actor)
            .cloned()
            .ok_or_else(|| StageError::MissingActor(self.data.actor.clone()))?;

        let mut initial = actor_data.attributes.clone();
        initial.extend(
            self.data
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let retained = match self.actor.as_mut() {
            Some(actor) if actor.data.id == actor_data.id => {
                debug!("Keeping actor state");
                for (key, value) in &initial {
                    if !actor.registry.contains(key) {
                        actor.registry.set(key, value.clone());
                    }
                }
                actor.data = actor_data.clone();
                true
            }
            _ => false,
        };
        if !retained {
            if let Some(mut old) = self.actor.take() {
                old.fina(ctx);
            }
            let mut actor = Actor::new(ctx, self.handle, actor_data.clone());
            actor.registry.update(&initial);
            ctx.mark_ready(actor.handle);
            self.actor = Some(actor);
        }

        let sources: Vec<_> = actor_data
            .timeline
            .iter()
            .chain(self.data.timeline.iter())
            .cloned()
            .collect();
        let snapshot = self.actor.as_ref().map(|a| a.attributes().clone());
        self.timeline = Some(ActionTimeline::init(
            ctx,
            self.handle,
            stage,
            &sources,
            snapshot,
            1,
        )?);

        self.bind_children(ctx, stage, &actor_data.children);
        ctx.mark_ready(self.handle);
        Ok(())
    }

    /// Diffs live children against the actor's declared children.
    fn bind_children(
        &mut self,
        ctx: &mut Context,
        stage: &Arc<StageData>,
        declared: &BTreeMap<u64, Arc<ActivityData>>,
    ) {
        let stale: Vec<u64> = self
            .children
            .keys()
            .filter(|id| !declared.contains_key(id))
            .copied()
            .collect();
        for id in stale {
            if let Some(mut child) = self.children.remove(&id) {
                child.fina(ctx);
            }
        }
        for (id, data) in declared {
            match self.children.get_mut(id) {
                Some(child) => child.rebind(ctx, stage, data.clone()),
                None => {
                    let child =
                        Activity::create(ctx, self.handle, stage, *id, data.clone(), self.depth + 1);
                    self.children.insert(*id, child);
                }
            }
        }
    }

    /// Runs the timeline at beat time `t`, publishes attribute changes and
    /// updates the children with this actor's attributes on the stack.
    ///
    /// Returns the time until this activity and all of its children are done.
    pub fn update(&mut self, ctx: &mut Context, t: f64, stack: &mut AttributeStack) -> f64 {
        if !ctx.is_ready(self.handle) {
            return 0.0;
        }
        let (Some(actor), Some(timeline)) = (self.actor.as_mut(), self.timeline.as_mut()) else {
            return 0.0;
        };

        let working = actor.attributes().clone();
        let result = timeline.update(ctx, t, &working, stack, true, false);
        actor.registry.update(&result);
        actor.drain_dirty(ctx);

        let mut remaining = timeline.remaining_time(t);
        let mut frame = stack.push_frame(actor.attributes().clone());
        for child in self.children.values_mut() {
            remaining = remaining.max(child.update(ctx, t, &mut frame));
        }
        remaining
    }

    /// Tears down children, the timeline and the actor.
    pub fn fina(&mut self, ctx: &mut Context) {
        for (_, mut child) in std::mem::take(&mut self.children) {
            child.fina(ctx);
        }
        if let Some(mut timeline) = self.timeline.take() {
            timeline.fina(ctx);
        }
        if let Some(mut actor) = self.actor.take() {
            actor.fina(ctx);
        }
        ctx.release(self.handle);
    }
}
