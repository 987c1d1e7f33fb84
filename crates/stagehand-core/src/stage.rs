//! # Stage Module
//!
//! The root of the live tree. A stage owns its scene and keeps the authored
//! data every node is built from.

use crate::data::StageData;
use crate::errors::StageError;
use crate::manager::Context;
use crate::node::{Node, NodeHandle, NodeType};
use crate::scene::Scene;
use std::sync::Arc;
use tracing::{info, instrument};

/// The root live node: sequences the authored beats through its scene.
///
/// Beats only change when [`advance`](Self::advance) is called; `update`
/// reports the time left so the host can decide when to do that.
pub struct Stage {
    handle: NodeHandle,
    data: Arc<StageData>,
    scene: Scene,
    next_beat: usize,
    time: f64,
}

impl Node for Stage {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::Stage
    }
}

impl Stage {
    /// Validates `data` and builds the stage with an empty scene.
    #[instrument(skip_all, fields(stage = %data.name))]
    pub fn init(ctx: &mut Context, data: Arc<StageData>) -> Result<Self, StageError> {
        let handle = ctx.construct(NodeType::Stage, None, format!("stage:{}", data.name));
        if let Err(err) = data.validate(ctx.config().max_timeline_depth) {
            ctx.fail(handle, &err);
            ctx.destroy(handle);
            return Err(err);
        }
        let scene = Scene::init(ctx, handle, data.clone());
        ctx.mark_ready(handle);
        Ok(Self {
            handle,
            data,
            scene,
            next_beat: 0,
            time: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn data(&self) -> &Arc<StageData> {
        &self.data
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn beat_count(&self) -> usize {
        self.data.beats.len()
    }

    /// Index of the current beat, if one has started.
    pub fn beat_index(&self) -> Option<usize> {
        self.next_beat.checked_sub(1)
    }

    /// Starts the next beat at the last updated stage time.
    ///
    /// Returns `false`, doing nothing, when every beat has been played.
    pub fn advance(&mut self, ctx: &mut Context) -> bool {
        if !ctx.is_ready(self.handle) {
            return false;
        }
        let Some(beat) = self.data.beats.get(self.next_beat).cloned() else {
            return false;
        };
        info!(beat = self.next_beat, stage_time = self.time, "Advancing beat");
        self.scene.set_beat(ctx, &beat, self.time);
        self.next_beat += 1;
        true
    }

    pub fn update(&mut self, ctx: &mut Context, stage_time: f64) -> f64 {
        if !ctx.is_ready(self.handle) {
            return 0.0;
        }
        self.time = stage_time;
        self.scene.update(ctx, stage_time)
    }

    pub fn set_next_beat_time(&mut self, beat_time: f64) {
        self.scene.set_next_beat_time(beat_time);
    }

    pub fn fast_forward(&mut self) {
        self.scene.fast_forward();
    }

    pub fn fina(&mut self, ctx: &mut Context) {
        self.scene.fina(ctx);
        ctx.release(self.handle);
    }
}
