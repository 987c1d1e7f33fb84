//! # Node Module
//!
//! Identity and lifecycle shared by every live runtime object.
//!
//! ## Key Types
//! - `NodeHandle`: stable arena handle (index plus generation).
//! - `NodeType`: the closed set of live node kinds.
//! - `NodeState`: `Uninitialized -> Ready | Failed`.
//! - `Node`: trait implemented by every live object that owns a handle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable reference to a live node in the [`Context`](crate::manager::Context) arena.
///
/// The generation distinguishes a reused slot from the node that used to live there.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Action,
    ActionTimeline,
    ActionTimelineKeyframe,
    Activity,
    Actor,
    Dialog,
    TextRegion,
    Scene,
    Stage,
}

impl NodeType {
    /// Short name used in locator paths.
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::Action => "action",
            NodeType::ActionTimeline => "timeline",
            NodeType::ActionTimelineKeyframe => "keyframe",
            NodeType::Activity => "activity",
            NodeType::Actor => "actor",
            NodeType::Dialog => "dialog",
            NodeType::TextRegion => "text_region",
            NodeType::Scene => "scene",
            NodeType::Stage => "stage",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Uninitialized,
    Ready,
    Failed,
}

/// Common capability of live nodes.
///
/// Parent, locator and lifecycle state are looked up in the context by handle.
pub trait Node {
    fn handle(&self) -> NodeHandle;
    fn node_type(&self) -> NodeType;
}
