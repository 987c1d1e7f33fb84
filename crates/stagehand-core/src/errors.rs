//! # Errors Module
//!
//! Typed failures.
//!
//! - `ScriptError`: anything that goes wrong inside one script. Wrapped with
//!   the action and script it came from before it reaches a node.
//! - `StageError`: problems found while loading or building the live tree.

use crate::node::NodeHandle;
use crate::value::ValueKind;
use thiserror::Error;

/// Failures raised across the scripting boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("syntax error: {0}")]
    Parse(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("function '{0}' is not defined")]
    MissingFunction(String),
    #[error("cannot convert {found} into {expected}")]
    Conversion { expected: ValueKind, found: String },
    #[error("unresolved attribute reference '{0}'")]
    UnresolvedReference(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// Wraps this error with identity information (action id, script name).
    pub fn context(self, context: impl Into<String>) -> Self {
        ScriptError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("invalid stage data: {0}")]
    InvalidData(String),
    #[error("script not found: {0}")]
    MissingScript(String),
    #[error("action not found: {0}")]
    MissingAction(String),
    #[error("actor not found: {0}")]
    MissingActor(String),
    #[error("timeline nesting exceeds {0} levels")]
    RecursionLimit(usize),
    #[error("node {0} is not ready")]
    NotReady(NodeHandle),
    #[error("no stage is loaded")]
    NoStage,
    #[error(transparent)]
    Script(#[from] ScriptError),
}
