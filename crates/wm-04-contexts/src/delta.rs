//! # Delta Computation
//!
//! A `ContextDelta` is the unit broadcast to subscribers: which top-level
//! keys appeared, changed, or went away. Comparison is shallow: a nested
//! object whose content changed counts as one updated key.

use crate::error::ContextError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The entries of one context.
pub type Entries = serde_json::Map<String, Value>;

/// One broadcastable change of a context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDelta {
    /// Keys new to the context, with their values.
    #[serde(default, skip_serializing_if = "Entries::is_empty")]
    pub added: Entries,
    /// Keys whose value changed.
    #[serde(default, skip_serializing_if = "Entries::is_empty")]
    pub updated: Entries,
    /// Keys removed from the context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    /// True when the delta represents a full replace (`set`).
    #[serde(default)]
    pub reset: bool,
}

impl ContextDelta {
    /// Whether the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty() && !self.reset
    }
}

/// Delta of a shallow merge: `added` for new keys, `updated` for changed
/// ones; unchanged keys appear in neither.
#[must_use]
pub fn merge_delta(prev: &Entries, partial: &Entries) -> ContextDelta {
    let mut delta = ContextDelta::default();
    for (key, value) in partial {
        match prev.get(key) {
            None => {
                delta.added.insert(key.clone(), value.clone());
            }
            Some(existing) if existing != value => {
                delta.updated.insert(key.clone(), value.clone());
            }
            Some(_) => {}
        }
    }
    delta
}

/// Delta of a full replace: remove-all-then-add-all. Every key of the
/// new value lands in `added` (whether or not its value changed); prior
/// keys absent from the new value land in `removed`.
#[must_use]
pub fn replace_delta(prev: &Entries, next: &Entries) -> ContextDelta {
    ContextDelta {
        added: next.clone(),
        updated: Entries::new(),
        removed: prev
            .keys()
            .filter(|key| !next.contains_key(*key))
            .cloned()
            .collect(),
        reset: true,
    }
}

/// Delta between two arbitrary entry sets (path-command mutations).
#[must_use]
pub fn diff_delta(prev: &Entries, next: &Entries) -> ContextDelta {
    let mut delta = ContextDelta::default();
    for (key, value) in next {
        match prev.get(key) {
            None => {
                delta.added.insert(key.clone(), value.clone());
            }
            Some(existing) if existing != value => {
                delta.updated.insert(key.clone(), value.clone());
            }
            Some(_) => {}
        }
    }
    delta.removed = prev
        .keys()
        .filter(|key| !next.contains_key(*key))
        .cloned()
        .collect();
    delta
}

/// Apply a received delta to a mirrored context.
pub fn apply_delta(entries: &mut Entries, delta: &ContextDelta) {
    if delta.reset {
        *entries = delta.added.clone();
        return;
    }
    for (key, value) in &delta.added {
        entries.insert(key.clone(), value.clone());
    }
    for (key, value) in &delta.updated {
        entries.insert(key.clone(), value.clone());
    }
    for key in &delta.removed {
        entries.remove(key);
    }
}

/// Shallow top-level merge; nested objects are replaced, not deep-merged.
pub fn merge_into(entries: &mut Entries, partial: &Entries) {
    for (key, value) in partial {
        entries.insert(key.clone(), value.clone());
    }
}

/// A path-scoped mutation for nested values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContextCommand {
    /// Set the value at a dot-separated path, creating objects on the way.
    Set { path: String, value: Value },
    /// Remove the value at a dot-separated path; absent paths are a no-op.
    Remove { path: String },
}

/// Apply path commands to an entry set.
pub fn apply_commands(entries: &mut Entries, commands: &[ContextCommand]) -> Result<(), ContextError> {
    for command in commands {
        match command {
            ContextCommand::Set { path, value } => set_path(entries, path, value.clone())?,
            ContextCommand::Remove { path } => remove_path(entries, path)?,
        }
    }
    Ok(())
}

fn split_path<'a>(path: &'a str) -> Result<Vec<&'a str>, ContextError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ContextError::InvalidPath { path: path.to_string() });
    }
    Ok(segments)
}

fn set_path(entries: &mut Entries, path: &str, value: Value) -> Result<(), ContextError> {
    let segments = split_path(path)?;
    let Some((last, walk)) = segments.split_last() else {
        return Err(ContextError::InvalidPath { path: path.to_string() });
    };

    let mut current = entries;
    for segment in walk {
        let slot = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Entries::new()));
        match slot {
            Value::Object(map) => current = map,
            _ => return Err(ContextError::InvalidPath { path: path.to_string() }),
        }
    }
    current.insert((*last).to_string(), value);
    Ok(())
}

fn remove_path(entries: &mut Entries, path: &str) -> Result<(), ContextError> {
    let segments = split_path(path)?;
    let Some((last, walk)) = segments.split_last() else {
        return Err(ContextError::InvalidPath { path: path.to_string() });
    };

    let mut current = entries;
    for segment in walk {
        match current.get_mut(*segment) {
            Some(Value::Object(map)) => current = map,
            Some(_) => return Err(ContextError::InvalidPath { path: path.to_string() }),
            None => return Ok(()),
        }
    }
    current.remove(*last);
    Ok(())
}
