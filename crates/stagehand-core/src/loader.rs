//! # Stage Loading
//!
//! JSON ingestion of [`StageData`].
//!
//! A script entry whose source starts with `@` names a file instead of holding
//! source text: `"slide": "@scripts/slide.rhai"` is read relative to the
//! stage file's directory.

use crate::data::StageData;
use anyhow::{Context as _, Result};
use std::path::Path;
use tracing::instrument;

/// Abstracts file access so stages can come from an archive or the network.
pub trait StageLoader: Send + Sync {
    /// Loads the raw bytes at `path`.
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>>;

    /// Loads and parses a stage, resolving `@file` scripts against the stage's
    /// directory.
    fn load_stage(&self, path: &str) -> Result<StageData> {
        let bytes = self.load_bytes(path)?;
        let mut stage: StageData = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse stage '{}'", path))?;
        let base = Path::new(path).parent().unwrap_or_else(|| Path::new(""));

        for (name, source) in stage.scripts.iter_mut() {
            if let Some(file) = source.strip_prefix('@') {
                let script_path = base.join(file);
                let script_path = script_path.to_string_lossy();
                let bytes = self
                    .load_bytes(&script_path)
                    .with_context(|| format!("Failed to load script '{}'", name))?;
                *source = String::from_utf8(bytes)
                    .with_context(|| format!("Script '{}' is not valid UTF-8", name))?;
            }
        }
        Ok(stage)
    }
}

/// Reads from the local filesystem.
pub struct DefaultStageLoader;

impl StageLoader for DefaultStageLoader {
    #[instrument(level = "debug", skip(self), fields(path = path))]
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("File not found: {}", path))
    }
}

/// Parses a stage from a JSON string. Scripts must be inline.
pub fn parse_stage(json: &str) -> Result<StageData> {
    serde_json::from_str(json).context("Failed to parse stage")
}
