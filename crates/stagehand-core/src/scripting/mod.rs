//! # Scripting Module
//!
//! Rhai integration for modifier actions and dialog transitions.
//!
//! ## Responsibilities
//! - **Runtime**: one [`ScriptRuntime`] per manager holds the shared standard
//!   package and limits, and builds isolated [`ScriptEngine`]s.
//! - **Contract**: `evaluate(source)`, `invoke(function, args)`,
//!   `set_property(name, value)`.
//! - **Conversion**: [`Value`](crate::Value) to and from `rhai::Dynamic`.
//! - **Helpers**: math, easing, random and grapheme functions for scripts.
//!
//! ## Module Structure
//! - `runtime`: runtime and engine
//! - `convert`: value conversion
//! - `api`: registered helper functions

mod api;
pub mod convert;
mod runtime;

pub use runtime::{ScriptEngine, ScriptRuntime};
