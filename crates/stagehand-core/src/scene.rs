//! # Scene Module
//!
//! The beat state machine.
//!
//! A scene owns the dialog and the live activities of the current beat. On a
//! beat change the activities are diffed by instance id: instances the new
//! beat drops are torn down, instances it keeps are rebound with their actor
//! state intact, and new instances are created.
//!
//! ## Time Travel
//! [`Scene::set_next_beat_time`] rebases the beat's start so the next update
//! lands at the requested beat time. Nothing is torn down or re-initialized.

use crate::activity::Activity;
use crate::attributes::AttributeStack;
use crate::data::{BeatData, StageData};
use crate::dialog::Dialog;
use crate::manager::Context;
use crate::node::{Node, NodeHandle, NodeType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub struct Scene {
    handle: NodeHandle,
    stage: Arc<StageData>,
    dialog: Dialog,
    activities: BTreeMap<u64, Activity>,
    beat_begin: f64,
    pending_beat_time: Option<f64>,
    last_beat_time: f64,
    last_remaining: f64,
}

impl Node for Scene {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::Scene
    }
}

impl Scene {
    pub fn init(ctx: &mut Context, parent: NodeHandle, stage: Arc<StageData>) -> Self {
        let handle = ctx.construct(NodeType::Scene, Some(parent), NodeType::Scene.label());
        let dialog = Dialog::new(ctx, handle);
        ctx.mark_ready(handle);
        Self {
            handle,
            stage,
            dialog,
            activities: BTreeMap::new(),
            beat_begin: 0.0,
            pending_beat_time: None,
            last_beat_time: 0.0,
            last_remaining: 0.0,
        }
    }

    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    pub fn activity(&self, instance_id: u64) -> Option<&Activity> {
        self.activities.get(&instance_id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    /// Stage time at which the current beat started.
    pub fn beat_begin(&self) -> f64 {
        self.beat_begin
    }

    /// Makes `beat` current, starting at `stage_time`.
    #[instrument(skip_all, fields(stage_time = stage_time))]
    pub fn set_beat(&mut self, ctx: &mut Context, beat: &BeatData, stage_time: f64) {
        if !ctx.is_ready(self.handle) {
            return;
        }
        self.beat_begin = stage_time;
        self.pending_beat_time = None;
        self.last_beat_time = 0.0;
        self.last_remaining = 0.0;

        if let Some(dialog) = &beat.dialog {
            self.dialog.advance(ctx, &self.stage, dialog);
        }

        let removed: Vec<u64> = self
            .activities
            .keys()
            .filter(|id| !beat.activities.contains_key(id))
            .copied()
            .collect();
        for id in &removed {
            if let Some(mut activity) = self.activities.remove(id) {
                activity.fina(ctx);
            }
        }

        let mut kept = 0;
        for (id, data) in &beat.activities {
            match self.activities.get_mut(id) {
                Some(activity) => {
                    activity.rebind(ctx, &self.stage, data.clone());
                    kept += 1;
                }
                None => {
                    let activity =
                        Activity::create(ctx, self.handle, &self.stage, *id, data.clone(), 1);
                    self.activities.insert(*id, activity);
                }
            }
        }
        info!(
            removed = removed.len(),
            kept,
            added = beat.activities.len() - kept,
            "Beat bound"
        );
    }

    /// Updates everything at `stage_time` and returns the time left in the beat.
    pub fn update(&mut self, ctx: &mut Context, stage_time: f64) -> f64 {
        if !ctx.is_ready(self.handle) {
            return 0.0;
        }
        if let Some(beat_time) = self.pending_beat_time.take() {
            self.beat_begin = stage_time - beat_time;
            debug!(beat_time, beat_begin = self.beat_begin, "Beat time rebased");
        }
        let t = stage_time - self.beat_begin;

        let mut remaining = self.dialog.update(ctx, t);
        for activity in self.activities.values_mut() {
            let mut stack = AttributeStack::new();
            remaining = remaining.max(activity.update(ctx, t, &mut stack));
        }
        self.last_beat_time = t;
        self.last_remaining = remaining;
        remaining
    }

    /// The next update lands at beat time `beat_time`.
    pub fn set_next_beat_time(&mut self, beat_time: f64) {
        info!(beat_time, "Time travel requested");
        self.pending_beat_time = Some(beat_time);
    }

    /// The next update lands at the end of the beat, as of the last update.
    pub fn fast_forward(&mut self) {
        if self.last_remaining.is_finite() {
            self.set_next_beat_time(self.last_beat_time + self.last_remaining.max(0.0));
        } else {
            debug!("Beat has no end; fast forward ignored");
        }
    }

    pub fn fina(&mut self, ctx: &mut Context) {
        for (_, mut activity) in std::mem::take(&mut self.activities) {
            activity.fina(ctx);
        }
        self.dialog.fina(ctx);
        ctx.release(self.handle);
    }
}
