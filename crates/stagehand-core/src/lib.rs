//! # Stagehand Core
//!
//! `stagehand-core` plays back scripted, beat-based narrative scenes: actors
//! whose attributes are driven by keyframed action timelines, and a dialog
//! line that can be revealed by a pacing script.
//!
//! It is driven by an external clock. Every [`Manager::update`] evaluates the
//! current beat at the given stage time, writes the results into each actor's
//! attribute registry and queues an [`Event`] for every changed attribute.
//!
//! ## Core Features
//!
//! *   **Action Timelines**: tracks of keyframes with linger semantics,
//!     continuous and random-access evaluation, nested composite timelines.
//! *   **Modifier Actions**: [Rhai](https://rhai.rs/) scripts computing new
//!     attribute values from elapsed time and prior state.
//! *   **Change Tracking**: tolerance-aware dirty sets drained into events.
//! *   **Beat State Machine**: actor state survives beat changes; time travel
//!     rebases the beat clock without re-initializing anything.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stagehand_core::{DefaultStageLoader, EngineConfig, Manager, StageLoader};
//!
//! let stage = DefaultStageLoader.load_stage("stages/intro.json").unwrap();
//! let mut manager = Manager::new(EngineConfig::default());
//! manager.load_stage(stage).unwrap();
//!
//! let remaining = manager.update(0.5).unwrap();
//! for event in manager.drain_events() {
//!     println!("{}", serde_json::to_string(&event).unwrap());
//! }
//! if remaining <= 0.0 {
//!     manager.advance().unwrap();
//! }
//! ```

/// Typed attribute values.
pub mod value;

/// Attribute registries and the ancestor attribute stack.
pub mod attributes;

/// Node handles, kinds and lifecycle states.
pub mod node;

/// The event stream drained by the host.
pub mod events;

/// Script and stage error types.
pub mod errors;

/// Engine limits and tolerances.
pub mod config;

/// Easing curves exposed to scripts.
pub mod easing;

/// Rhai runtime, engines and value conversion.
pub mod scripting;

/// Immutable authored stage data.
pub mod data;

/// JSON stage loading.
pub mod loader;

/// Modifier and composite actions.
pub mod action;

/// Keyframe tracks and their evaluation.
pub mod timeline;

/// Activities and actors.
pub mod activity;

/// Dialog and text regions.
pub mod dialog;

/// The beat state machine.
pub mod scene;

/// The root live node.
pub mod stage;

/// Node arena, event queue and the host-facing manager.
pub mod manager;

pub use attributes::{AttributeMap, AttributeRegistry, AttributeStack};
pub use config::EngineConfig;
pub use data::StageData;
pub use errors::{ScriptError, StageError};
pub use events::{AttributeChange, Event, LogLevel};
pub use loader::{parse_stage, DefaultStageLoader, StageLoader};
pub use manager::{Context, Manager};
pub use node::{Node, NodeHandle, NodeState, NodeType};
pub use stage::Stage;
pub use value::{Value, ValueKind};
