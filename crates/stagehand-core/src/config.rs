//! Engine configuration.

use crate::value::DEFAULT_TOLERANCE;
use serde::{Deserialize, Serialize};

/// Limits and tolerances applied by a [`Manager`](crate::Manager).
///
/// Every field has a default, so a partial JSON object is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Script operations allowed per evaluation before it is aborted.
    pub max_operations: u64,
    /// Maximum script call stack depth.
    pub max_call_levels: usize,
    /// Maximum expression nesting depth in a script.
    pub max_expr_depth: usize,
    /// Maximum length of a script string (0 = unlimited).
    pub max_string_size: usize,
    /// Maximum length of a script array (0 = unlimited).
    pub max_array_size: usize,
    /// Maximum size of a script object map (0 = unlimited).
    pub max_map_size: usize,
    /// Maximum nesting of composite action timelines.
    pub max_timeline_depth: usize,
    /// Relative tolerance used by attribute change detection.
    pub float_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 1 << 20,
            max_array_size: 1 << 16,
            max_map_size: 1 << 16,
            max_timeline_depth: 16,
            float_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "max_timeline_depth": 4 }"#).unwrap();
        assert_eq!(config.max_timeline_depth, 4);
        assert_eq!(config.max_operations, EngineConfig::default().max_operations);
    }
}
