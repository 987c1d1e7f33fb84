//! # Action Timeline
//!
//! Tracks of keyframes evaluated against a time cursor.
//!
//! ## Evaluation
//! Each keyframe is active over the half-open window
//! `[time, time + effective_duration)`. The effective duration is the
//! preferred duration capped by the gap to the next keyframe on the same track;
//! a lingering keyframe lasts until the next one, and the last lingering
//! keyframe of a track lasts until the source timeline's `effective_duration`
//! bound, or forever without one.
//!
//! `update` folds every keyframe whose window has closed ("finishing") into the
//! working attribute map at its final time, then applies the keyframe whose
//! window contains `t` ("ongoing"). In continuous mode each track keeps a
//! cursor that only moves forward; a call with an earlier `t` than the last one
//! falls back to replaying the track from its first keyframe.
//!
//! Tracks are applied in declaration order, so a later track overrides an
//! earlier one on the same attribute within a tick.

use crate::action::{Action, ActionTiming};
use crate::attributes::{AttributeMap, AttributeStack};
use crate::data::{ActionData, ActionTimelineData, KeyframeData, StageData};
use crate::errors::StageError;
use crate::manager::Context;
use crate::node::{Node, NodeHandle, NodeType};
use crate::value::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// A live keyframe. Its action is created the first time it is applied.
pub struct Keyframe {
    handle: NodeHandle,
    data: KeyframeData,
    effective: f64,
    action: Option<Action>,
    prev: Option<Value>,
}

impl Node for Keyframe {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::ActionTimelineKeyframe
    }
}

impl Keyframe {
    pub fn data(&self) -> &KeyframeData {
        &self.data
    }

    pub fn effective_duration(&self) -> f64 {
        self.effective
    }

    /// End of the active window.
    pub fn end(&self) -> f64 {
        self.data.time + self.effective
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }
}

struct Track {
    keyframes: Vec<Keyframe>,
    bound: Option<f64>,
    /// First keyframe not yet folded in.
    cursor: usize,
    selected: Option<usize>,
}

impl Track {
    /// Index of the last keyframe with `time <= t`.
    fn upper_bound(&self, t: f64) -> Option<usize> {
        self.keyframes
            .partition_point(|k| k.data.time <= t)
            .checked_sub(1)
    }

    /// Latest point at which this track still changes anything.
    fn end(&self) -> f64 {
        let last = self
            .keyframes
            .iter()
            .map(|k| {
                if k.data.is_linger() {
                    k.data.time
                } else {
                    k.end()
                }
            })
            .fold(0.0, f64::max);
        last.max(self.bound.unwrap_or(0.0))
    }
}

/// Effective durations of a time-ordered keyframe list.
pub fn effective_durations(keyframes: &[KeyframeData], bound: Option<f64>) -> Vec<f64> {
    keyframes
        .iter()
        .enumerate()
        .map(|(i, k)| {
            let gap = keyframes.get(i + 1).map(|next| next.time - k.time);
            match (k.is_linger(), gap) {
                (true, Some(gap)) => gap,
                (true, None) => bound.map_or(f64::INFINITY, |b| (b - k.time).max(0.0)),
                (false, Some(gap)) => k.duration.min(gap),
                (false, None) => k.duration,
            }
        })
        .collect()
}

pub struct ActionTimeline {
    handle: NodeHandle,
    stage: Arc<StageData>,
    tracks: Vec<Track>,
    /// Attributes the timeline started from; used to rebuild previous values.
    initial: Option<AttributeMap>,
    last_time: Option<f64>,
    depth: usize,
}

impl Node for ActionTimeline {
    fn handle(&self) -> NodeHandle {
        self.handle
    }

    fn node_type(&self) -> NodeType {
        NodeType::ActionTimeline
    }
}

impl ActionTimeline {
    /// Builds a timeline whose tracks are pooled from every source.
    ///
    /// `initial` is the attribute map the timeline starts from; when `None` the
    /// map passed to the first `update` is used.
    pub fn init(
        ctx: &mut Context,
        parent: NodeHandle,
        stage: &Arc<StageData>,
        sources: &[Arc<ActionTimelineData>],
        initial: Option<AttributeMap>,
        depth: usize,
    ) -> Result<Self, StageError> {
        let max_depth = ctx.config().max_timeline_depth;
        if depth > max_depth {
            return Err(StageError::RecursionLimit(max_depth));
        }
        for source in sources {
            for track in &source.tracks {
                if track.keyframes.windows(2).any(|w| w[1].time < w[0].time) {
                    return Err(StageError::InvalidData(
                        "keyframes are not sorted by time".into(),
                    ));
                }
            }
        }

        let handle = ctx.construct(
            NodeType::ActionTimeline,
            Some(parent),
            NodeType::ActionTimeline.label(),
        );
        let mut tracks = Vec::new();
        for source in sources {
            for track in &source.tracks {
                let index = tracks.len();
                let effective = effective_durations(&track.keyframes, source.effective_duration);
                let keyframes = track
                    .keyframes
                    .iter()
                    .zip(effective)
                    .enumerate()
                    .map(|(i, (data, effective))| {
                        let kf = ctx.construct(
                            NodeType::ActionTimelineKeyframe,
                            Some(handle),
                            format!("keyframe[{}:{}]", index, i),
                        );
                        ctx.mark_ready(kf);
                        Keyframe {
                            handle: kf,
                            data: data.clone(),
                            effective,
                            action: None,
                            prev: None,
                        }
                    })
                    .collect();
                tracks.push(Track {
                    keyframes,
                    bound: source.effective_duration,
                    cursor: 0,
                    selected: None,
                });
            }
        }
        ctx.mark_ready(handle);
        debug!(timeline = %handle, tracks = tracks.len(), depth, "Timeline ready");

        Ok(Self {
            handle,
            stage: stage.clone(),
            tracks,
            initial,
            last_time: None,
            depth,
        })
    }

    pub fn fina(&mut self, ctx: &mut Context) {
        for track in &mut self.tracks {
            for kf in &mut track.keyframes {
                if let Some(mut action) = kf.action.take() {
                    action.fina(ctx);
                }
                ctx.release(kf.handle);
            }
        }
        ctx.release(self.handle);
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn keyframes(&self, track: usize) -> &[Keyframe] {
        self.tracks
            .get(track)
            .map(|t| t.keyframes.as_slice())
            .unwrap_or(&[])
    }

    /// Per-track index of the first keyframe not yet folded in.
    pub fn cursors(&self) -> Vec<usize> {
        self.tracks.iter().map(|t| t.cursor).collect()
    }

    /// Per-track keyframe selected by the last `update`.
    pub fn selected(&self) -> Vec<Option<usize>> {
        self.tracks.iter().map(|t| t.selected).collect()
    }

    /// Most recent keyframe at or before `t` on each track, as
    /// `(track, keyframe)` pairs. Tracks with none are omitted.
    pub fn sample(&self, t: f64) -> Vec<(usize, usize)> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(i, track)| track.upper_bound(t).map(|k| (i, k)))
            .collect()
    }

    /// Seconds from `t` until no track changes anything any more.
    pub fn remaining_time(&self, t: f64) -> f64 {
        self.tracks.iter().map(Track::end).fold(0.0, f64::max) - t
    }

    /// Evaluates the timeline at `t` on top of `attributes`.
    ///
    /// With `exclude_ongoing`, only keyframes whose window has closed are
    /// applied. Whenever the keyframes are replayed from the first one (a
    /// random-access update, or `t` before the previous update) the replay
    /// starts from the initial attributes, so nothing a keyframe wrote on an
    /// earlier pass survives.
    pub fn update(
        &mut self,
        ctx: &mut Context,
        t: f64,
        attributes: &AttributeMap,
        stack: &AttributeStack,
        continuous: bool,
        exclude_ongoing: bool,
    ) -> AttributeMap {
        let resumes = continuous && self.last_time.is_some_and(|last| t >= last);
        match self.initial.as_ref() {
            Some(initial) if !resumes && ctx.is_ready(self.handle) => {
                trace!(timeline = %self.handle, t, "replaying from initial attributes");
                let mut base = attributes.clone();
                base.extend(initial.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.evaluate(ctx, t, &base, stack, false, exclude_ongoing, None)
            }
            _ => self.evaluate(ctx, t, attributes, stack, continuous, exclude_ongoing, None),
        }
    }

    /// Applies the keyframes at `t` to `attributes` as given. On the track
    /// named by `until`, keyframes from that index on are skipped.
    ///
    /// Nested timelines go through here: their input is the enclosing
    /// timeline's working map, which is already rebuilt on a replay.
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &mut self,
        ctx: &mut Context,
        t: f64,
        attributes: &AttributeMap,
        stack: &AttributeStack,
        continuous: bool,
        exclude_ongoing: bool,
        until: Option<(usize, usize)>,
    ) -> AttributeMap {
        if !ctx.is_ready(self.handle) {
            return attributes.clone();
        }
        if self.initial.is_none() {
            self.initial = Some(attributes.clone());
        }
        let continuous = continuous && self.last_time.is_some_and(|last| t >= last);
        let mut out = attributes.clone();

        for ti in 0..self.tracks.len() {
            if !continuous {
                self.tracks[ti].cursor = 0;
            }
            loop {
                let track = &self.tracks[ti];
                let Some(kf) = track.keyframes.get(track.cursor) else {
                    break;
                };
                if t < kf.data.time {
                    break;
                }
                let ki = track.cursor;
                if until.is_some_and(|(track, index)| track == ti && ki >= index) {
                    break;
                }
                if t < kf.end() {
                    if !exclude_ongoing {
                        let elapsed = t - kf.data.time;
                        self.apply(ctx, ti, ki, elapsed, &mut out, stack, continuous, false);
                    }
                    break;
                }
                let elapsed = kf.effective;
                trace!(timeline = %self.handle, track = ti, keyframe = ki, "finishing");
                self.apply(ctx, ti, ki, elapsed, &mut out, stack, continuous, true);
                self.tracks[ti].cursor += 1;
            }

            let track = &mut self.tracks[ti];
            track.selected = match track.keyframes.get(track.cursor) {
                Some(kf) if kf.data.time <= t => Some(track.cursor),
                _ => track.cursor.checked_sub(1),
            };
        }

        self.last_time = Some(t);
        out
    }

    /// Value of `attribute` after replaying every keyframe up to `t` from the
    /// timeline's initial attributes.
    ///
    /// With `until = Some((track, index))` the replay stops before that
    /// keyframe on its track; other tracks play up to `t`. The next `update`
    /// replays from the first keyframe.
    pub fn get_base_value(
        &mut self,
        ctx: &mut Context,
        t: f64,
        attribute: &str,
        until: Option<(usize, usize)>,
        stack: &AttributeStack,
    ) -> Option<Value> {
        let initial = self.initial.clone().unwrap_or_default();
        let replayed = self.evaluate(ctx, t, &initial, stack, false, false, until);
        self.invalidate();
        replayed.get(attribute).cloned()
    }

    /// Value the keyframe's target attribute had before the keyframe: the
    /// initial value with every earlier keyframe on the same track folded in.
    /// Memoized per keyframe.
    pub fn get_prev_value(
        &mut self,
        ctx: &mut Context,
        track: usize,
        index: usize,
        stack: &AttributeStack,
    ) -> Value {
        if let Some(prev) = self
            .tracks
            .get(track)
            .and_then(|t| t.keyframes.get(index))
            .and_then(|k| k.prev.clone())
        {
            return prev;
        }
        if track >= self.tracks.len() || index >= self.tracks[track].keyframes.len() {
            return Value::Void;
        }

        let mut scratch = self.initial.clone().unwrap_or_default();
        for i in 0..=index {
            if let Some(attribute) = self.target_attribute(track, i) {
                let kf = &mut self.tracks[track].keyframes[i];
                if kf.prev.is_none() {
                    kf.prev = Some(scratch.get(&attribute).cloned().unwrap_or_default());
                }
            }
            if i < index {
                let elapsed = self.tracks[track].keyframes[i].effective;
                self.apply(ctx, track, i, elapsed, &mut scratch, stack, false, true);
            }
        }
        self.tracks[track].keyframes[index]
            .prev
            .clone()
            .unwrap_or_default()
    }

    /// Forgets cursor positions, here and in nested timelines.
    fn invalidate(&mut self) {
        self.last_time = None;
        for track in &mut self.tracks {
            for kf in &mut track.keyframes {
                if let Some(Action::Composite(c)) = kf.action.as_mut() {
                    c.timeline_mut().invalidate();
                }
            }
        }
    }

    fn target_attribute(&self, track: usize, index: usize) -> Option<String> {
        let kf = &self.tracks[track].keyframes[index];
        match self.stage.actions.get(&kf.data.action).map(|a| a.as_ref()) {
            Some(ActionData::Modifier(m)) => Some(m.attribute.clone()),
            _ => None,
        }
    }

    fn ensure_action(&mut self, ctx: &mut Context, track: usize, index: usize) {
        let stage = self.stage.clone();
        let depth = self.depth;
        let kf = &mut self.tracks[track].keyframes[index];
        if kf.action.is_none() {
            let action = Action::create(ctx, kf.handle, &stage, &kf.data.action, &kf.data.parameters, depth);
            kf.action = Some(action);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &mut self,
        ctx: &mut Context,
        track: usize,
        index: usize,
        elapsed: f64,
        out: &mut AttributeMap,
        stack: &AttributeStack,
        continuous: bool,
        finishing: bool,
    ) {
        self.ensure_action(ctx, track, index);
        let is_modifier = {
            let kf = &self.tracks[track].keyframes[index];
            match kf.action.as_ref() {
                Some(action) if ctx.is_ready(action.handle()) => {
                    matches!(action, Action::Modifier(_))
                }
                _ => return,
            }
        };
        let prev = if is_modifier {
            self.get_prev_value(ctx, track, index, stack)
        } else {
            Value::Void
        };

        let kf = &mut self.tracks[track].keyframes[index];
        let timing = ActionTiming {
            elapsed,
            preferred: kf.data.preferred_duration(),
            effective: kf.effective,
        };
        match kf.action.as_mut() {
            Some(Action::Modifier(m)) => {
                if let Err(err) = m.apply_modifier(ctx, timing, &prev, out, stack) {
                    ctx.fail(m.handle(), err);
                }
            }
            Some(Action::Composite(c)) => {
                let nested = c
                    .timeline_mut()
                    .evaluate(ctx, timing.time(), out, stack, continuous, finishing, None);
                *out = nested;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf(time: f64, duration: f64) -> KeyframeData {
        KeyframeData {
            time,
            duration,
            action: "a".into(),
            parameters: AttributeMap::new(),
        }
    }

    #[test]
    fn durations_are_capped_by_the_next_keyframe() {
        let keyframes = [kf(0.0, 5.0), kf(2.0, 1.0), kf(4.0, 10.0)];
        assert_eq!(effective_durations(&keyframes, None), vec![2.0, 1.0, 10.0]);
    }

    #[test]
    fn linger_lasts_until_superseded() {
        let keyframes = [kf(0.0, -1.0), kf(3.0, -1.0)];
        assert_eq!(
            effective_durations(&keyframes, None),
            vec![3.0, f64::INFINITY]
        );
        assert_eq!(effective_durations(&keyframes, Some(8.0)), vec![3.0, 5.0]);
    }

    #[test]
    fn effective_never_exceeds_gap() {
        let keyframes = [kf(0.0, 1.0), kf(0.5, 3.0), kf(0.5, 2.0), kf(9.0, 0.5)];
        let effective = effective_durations(&keyframes, None);
        for (i, window) in keyframes.windows(2).enumerate() {
            assert!(effective[i] <= window[1].time - window[0].time);
        }
        assert_eq!(effective[3], 0.5);
    }
}
