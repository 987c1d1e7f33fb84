//! # Attributes Module
//!
//! Attribute storage with change tracking.
//!
//! ## Responsibilities
//! - **AttributeRegistry**: owns an attribute map plus the set of keys changed
//!   since the last drain.
//! - **AttributeStack**: the ancestor attribute maps visible while a subtree of
//!   activities updates; frames are released by a scope guard.

use crate::value::{Value, DEFAULT_TOLERANCE};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};

/// Attribute id to value. Ordered so change notifications are deterministic.
pub type AttributeMap = BTreeMap<String, Value>;

/// An attribute map with a dirty set.
///
/// A key becomes dirty when it is inserted, when its value changes beyond the
/// registry tolerance, or when it is removed.
#[derive(Clone, Debug)]
pub struct AttributeRegistry {
    attributes: AttributeMap,
    dirty: BTreeSet<String>,
    tolerance: f64,
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_TOLERANCE)
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            attributes: AttributeMap::new(),
            dirty: BTreeSet::new(),
            tolerance,
        }
    }

    /// Inserts or overwrites `key`.
    ///
    /// Returns `true` if the key was marked dirty.
    pub fn set(&mut self, key: &str, value: Value) -> bool {
        match self.attributes.get_mut(key) {
            Some(existing) => {
                if existing.approx_eq_within(&value, self.tolerance) {
                    return false;
                }
                *existing = value;
            }
            None => {
                self.attributes.insert(key.to_string(), value);
            }
        }
        self.dirty.insert(key.to_string());
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Removes `key`, marking it dirty so observers see the disappearance.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.attributes.remove(key);
        if removed.is_some() {
            self.dirty.insert(key.to_string());
        }
        removed
    }

    /// Removes every attribute, marking all of them dirty.
    pub fn clear(&mut self) {
        let keys: Vec<String> = self.attributes.keys().cloned().collect();
        self.attributes.clear();
        self.dirty.extend(keys);
    }

    /// Drops all content and dirty tracking without marking anything.
    pub fn reset(&mut self) {
        self.attributes.clear();
        self.dirty.clear();
    }

    /// Sequential [`set`](Self::set) for each entry.
    pub fn update(&mut self, values: &AttributeMap) {
        for (key, value) in values {
            self.set(key, value.clone());
        }
    }

    /// Visits each dirty key once.
    ///
    /// The handler receives the key and its current value (`None` if removed)
    /// and returns whether the dirty mark should be cleared. Keys it keeps dirty
    /// are offered again on the next call.
    pub fn handle_dirty_attributes<F>(&mut self, mut handler: F)
    where
        F: FnMut(&str, Option<&Value>) -> bool,
    {
        let attributes = &self.attributes;
        self.dirty
            .retain(|key| !handler(key.as_str(), attributes.get(key.as_str())));
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.dirty.contains(key)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Ancestor attribute maps, innermost last.
///
/// Lookups search innermost first, so a nearer ancestor shadows a farther one.
#[derive(Debug, Default)]
pub struct AttributeStack {
    frames: Vec<AttributeMap>,
}

impl AttributeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame that is popped when the returned guard drops.
    pub fn push_frame(&mut self, frame: AttributeMap) -> StackFrame<'_> {
        self.frames.push(frame);
        StackFrame { stack: self }
    }

    /// Finds `name` in the innermost frame that defines it.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Scope guard returned by [`AttributeStack::push_frame`].
pub struct StackFrame<'a> {
    stack: &'a mut AttributeStack,
}

impl Deref for StackFrame<'_> {
    type Target = AttributeStack;

    fn deref(&self) -> &AttributeStack {
        self.stack
    }
}

impl DerefMut for StackFrame<'_> {
    fn deref_mut(&mut self) -> &mut AttributeStack {
        self.stack
    }
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        self.stack.frames.pop();
    }
}
