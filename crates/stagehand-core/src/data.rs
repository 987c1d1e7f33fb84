//! # Authored Data
//!
//! The immutable stage description consumed by the live node tree.
//!
//! Every structure here is loaded once and then shared read-only through
//! `Arc`s by any number of live instances. Nothing in the engine mutates it.
//!
//! ## Key Types
//! - `StageData`: beats, scripts, actors and actions by id.
//! - `BeatData`: the dialog line plus the activity instances of one beat.
//! - `ActionData`: modifier (script-driven value transform) or composite
//!   (nested timeline).
//! - `ActionTimelineData`: tracks of time-ordered keyframes.

use crate::attributes::AttributeMap;
use crate::errors::StageError;
use crate::value::ValueKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StageData {
    pub name: String,
    #[serde(default)]
    pub beats: Vec<Arc<BeatData>>,
    /// Script name to Rhai source.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub actors: BTreeMap<String, Arc<ActorData>>,
    #[serde(default)]
    pub actions: BTreeMap<String, Arc<ActionData>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BeatData {
    pub dialog: Option<DialogData>,
    /// Activity instance id to activity.
    #[serde(default)]
    pub activities: BTreeMap<u64, Arc<ActivityData>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ActorData {
    #[serde(default)]
    pub actor_type: String,
    pub id: String,
    /// Default attributes, overridden per activity.
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Timeline applied whenever the actor is on stage.
    #[serde(default)]
    pub timeline: Option<Arc<ActionTimelineData>>,
    /// Nested activities, keyed by instance id.
    #[serde(default)]
    pub children: BTreeMap<u64, Arc<ActivityData>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ActivityData {
    #[serde(default)]
    pub id: u64,
    /// Target actor id.
    pub actor: String,
    /// Overrides for the actor's default attributes.
    #[serde(default)]
    pub attributes: AttributeMap,
    #[serde(default)]
    pub timeline: Option<Arc<ActionTimelineData>>,
}

/// Numeric action kind. Negative values are instant actions, which have no
/// duration; none are defined yet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ActionKind {
    Modifier = 1,
    Composite = 2,
}

impl ActionKind {
    pub fn is_instant(self) -> bool {
        (self as i32) < 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionData {
    Modifier(ModifierActionData),
    Composite(CompositeActionData),
}

impl ActionData {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionData::Modifier(_) => ActionKind::Modifier,
            ActionData::Composite(_) => ActionKind::Composite,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModifierActionData {
    /// Attribute the script rewrites.
    pub attribute: String,
    /// Kind the script result is converted to.
    pub value_kind: ValueKind,
    /// Name of the script in [`StageData::scripts`].
    pub script: String,
    /// Default script parameters.
    #[serde(default)]
    pub parameters: AttributeMap,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompositeActionData {
    pub timeline: Arc<ActionTimelineData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ActionTimelineData {
    #[serde(default)]
    pub tracks: Vec<TrackData>,
    /// Upper bound for lingering keyframes at the end of a track.
    #[serde(default)]
    pub effective_duration: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TrackData {
    #[serde(default)]
    pub keyframes: Vec<KeyframeData>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KeyframeData {
    /// Offset from the start of the timeline, in seconds.
    pub time: f64,
    /// Preferred duration. Negative means linger until superseded.
    pub duration: f64,
    /// Id of the action in [`StageData::actions`].
    pub action: String,
    /// Overrides for the action's default parameters.
    #[serde(default)]
    pub parameters: AttributeMap,
}

impl KeyframeData {
    pub fn is_linger(&self) -> bool {
        self.duration < 0.0
    }

    /// Preferred duration with linger mapped to infinity.
    pub fn preferred_duration(&self) -> f64 {
        if self.is_linger() {
            f64::INFINITY
        } else {
            self.duration
        }
    }
}

/// Script-paced reveal of a text region.
///
/// The script defines `preprocess()`, returning the total duration, and
/// `run()`, returning the text to show at property `time`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransitionData {
    pub script: String,
    /// Fixed total duration in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Pacing in characters per second.
    #[serde(default)]
    pub rate: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TextRegionData {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub timeline: Option<Arc<ActionTimelineData>>,
    #[serde(default)]
    pub transition: Option<TransitionData>,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Default for TextRegionData {
    fn default() -> Self {
        Self {
            text: String::new(),
            attachments: Vec::new(),
            timeline: None,
            transition: None,
            visible: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DialogData {
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(flatten)]
    pub region: TextRegionData,
}

impl StageData {
    /// Checks the stage before any live node is built.
    ///
    /// Composite timelines and nested actors may nest at most `max_depth`
    /// levels, which also rejects reference cycles.
    pub fn validate(&self, max_depth: usize) -> Result<(), StageError> {
        if self.name.is_empty() {
            return Err(StageError::InvalidData("stage name is not set".into()));
        }
        for (id, action) in &self.actions {
            if let ActionData::Modifier(m) = action.as_ref() {
                if !self.scripts.contains_key(&m.script) {
                    return Err(StageError::MissingScript(format!(
                        "{} (action '{}')",
                        m.script, id
                    )));
                }
            }
            self.validate_action(id, 1, max_depth)?;
        }
        for (id, actor) in &self.actors {
            if let Some(timeline) = &actor.timeline {
                self.validate_timeline(timeline, &format!("actor '{}'", id), 1, max_depth)?;
            }
            self.validate_actor(actor, 1, max_depth)?;
        }
        for (index, beat) in self.beats.iter().enumerate() {
            let at = format!("beat {}", index);
            let dialog = beat
                .dialog
                .as_ref()
                .ok_or_else(|| StageError::InvalidData(format!("{} has no dialog", at)))?;
            self.validate_region(&dialog.region, &at, max_depth)?;
            for (instance, activity) in &beat.activities {
                self.validate_activity(activity, &format!("{} activity {}", at, instance), max_depth)?;
            }
        }
        Ok(())
    }

    fn validate_region(
        &self,
        region: &TextRegionData,
        at: &str,
        max_depth: usize,
    ) -> Result<(), StageError> {
        if let Some(transition) = &region.transition {
            if !self.scripts.contains_key(&transition.script) {
                return Err(StageError::MissingScript(format!(
                    "{} ({} transition)",
                    transition.script, at
                )));
            }
        }
        if let Some(timeline) = &region.timeline {
            self.validate_timeline(timeline, at, 1, max_depth)?;
        }
        Ok(())
    }

    fn validate_activity(
        &self,
        activity: &ActivityData,
        at: &str,
        max_depth: usize,
    ) -> Result<(), StageError> {
        if !self.actors.contains_key(&activity.actor) {
            return Err(StageError::MissingActor(format!("{} ({})", activity.actor, at)));
        }
        if let Some(timeline) = &activity.timeline {
            self.validate_timeline(timeline, at, 1, max_depth)?;
        }
        Ok(())
    }

    fn validate_actor(&self, actor: &ActorData, depth: usize, max_depth: usize) -> Result<(), StageError> {
        if depth > max_depth {
            return Err(StageError::RecursionLimit(max_depth));
        }
        for (instance, child) in &actor.children {
            let at = format!("actor '{}' child {}", actor.id, instance);
            self.validate_activity(child, &at, max_depth)?;
            if let Some(child_actor) = self.actors.get(&child.actor) {
                self.validate_actor(child_actor, depth + 1, max_depth)?;
            }
        }
        Ok(())
    }

    fn validate_action(&self, id: &str, depth: usize, max_depth: usize) -> Result<(), StageError> {
        if depth > max_depth {
            return Err(StageError::RecursionLimit(max_depth));
        }
        if let Some(ActionData::Composite(c)) = self.actions.get(id).map(|a| a.as_ref()) {
            self.validate_timeline(&c.timeline, &format!("action '{}'", id), depth + 1, max_depth)?;
        }
        Ok(())
    }

    fn validate_timeline(
        &self,
        timeline: &ActionTimelineData,
        at: &str,
        depth: usize,
        max_depth: usize,
    ) -> Result<(), StageError> {
        if depth > max_depth {
            return Err(StageError::RecursionLimit(max_depth));
        }
        for (index, track) in timeline.tracks.iter().enumerate() {
            if track.keyframes.windows(2).any(|w| w[1].time < w[0].time) {
                return Err(StageError::InvalidData(format!(
                    "{} track {} keyframes are not sorted by time",
                    at, index
                )));
            }
            for keyframe in &track.keyframes {
                if !keyframe.time.is_finite() || keyframe.duration.is_nan() {
                    return Err(StageError::InvalidData(format!(
                        "{} track {} has a keyframe with invalid timing",
                        at, index
                    )));
                }
                if !self.actions.contains_key(&keyframe.action) {
                    return Err(StageError::MissingAction(format!(
                        "{} ({} track {})",
                        keyframe.action, at, index
                    )));
                }
                self.validate_action(&keyframe.action, depth, max_depth)?;
            }
        }
        Ok(())
    }
}
