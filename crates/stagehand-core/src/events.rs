//! # Events Module
//!
//! The append-only event stream a host drains after each update pass.

use crate::node::{NodeHandle, NodeType};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A change in a single attribute. `value` is `None` when the attribute was removed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub key: String,
    pub value: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    NodeConstructed {
        handle: NodeHandle,
        node_type: NodeType,
        parent: Option<NodeHandle>,
    },
    NodeInitialized {
        handle: NodeHandle,
    },
    NodeFinalized {
        handle: NodeHandle,
    },
    NodeVisibilityChanged {
        handle: NodeHandle,
        visible: bool,
    },
    NodeAttributesDirty {
        handle: NodeHandle,
        changes: Vec<AttributeChange>,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    NodeFailure {
        handle: NodeHandle,
        message: String,
    },
}

impl Event {
    /// The node this event refers to, if any.
    pub fn handle(&self) -> Option<NodeHandle> {
        match self {
            Event::NodeConstructed { handle, .. }
            | Event::NodeInitialized { handle }
            | Event::NodeFinalized { handle }
            | Event::NodeVisibilityChanged { handle, .. }
            | Event::NodeAttributesDirty { handle, .. }
            | Event::NodeFailure { handle, .. } => Some(*handle),
            Event::Log { .. } => None,
        }
    }
}

/// FIFO queue of events. No deduplication.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Removes and returns every queued event in append order.
    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
