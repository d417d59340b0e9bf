//! Prototype Attribute Cache (§4.11).
//!
//! Process-wide, lazily populated, two-level mapping to amortize
//! world-attribute lookups. Cleared at engine (re)initialization, mirroring
//! the teacher's pattern of resetting per-load resources (e.g.
//! `ChunkManager`'s loaded-chunk set) rather than letting stale data leak
//! across a world reload.

use bevy::prelude::*;
use std::collections::HashMap;

/// A value read back from a prototype attribute lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    F32(f32),
    U32(u32),
    Bool(bool),
    /// Item name -> count, used for mined products / items-to-place (§4.7 step 2).
    Items(Vec<(String, u32)>),
    /// A prototype name, e.g. an upgrade target entity type (§4.7 step 2).
    Name(String),
}

impl AttributeValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            AttributeValue::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[(String, u32)]> {
        match self {
            AttributeValue::Items(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            AttributeValue::Name(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PrototypeKey {
    category: String,
    name: String,
}

/// Process-wide cache resource, §4.11.
#[derive(Resource, Default)]
pub struct PrototypeAttributeCache {
    entries: HashMap<PrototypeKey, HashMap<String, AttributeValue>>,
}

impl PrototypeAttributeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached attribute, or populate it via `fetch` on miss.
    pub fn get_or_fetch(
        &mut self,
        category: &str,
        name: &str,
        attribute: &str,
        fetch: impl FnOnce() -> Option<AttributeValue>,
    ) -> Option<AttributeValue> {
        let key = PrototypeKey {
            category: category.to_string(),
            name: name.to_string(),
        };
        if let Some(value) = self
            .entries
            .get(&key)
            .and_then(|attrs| attrs.get(attribute))
        {
            return Some(value.clone());
        }
        let value = fetch()?;
        self.entries
            .entry(key)
            .or_default()
            .insert(attribute.to_string(), value.clone());
        Some(value)
    }

    /// Clear all cached values (engine (re)initialization, §4.11).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_is_only_called_once_per_key() {
        let mut cache = PrototypeAttributeCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_fetch("entity", "tree-01", "mining_time", || {
                calls += 1;
                Some(AttributeValue::F32(2.5))
            });
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn clear_forces_refetch() {
        let mut cache = PrototypeAttributeCache::new();
        cache.get_or_fetch("entity", "tree-01", "mining_time", || {
            Some(AttributeValue::F32(2.5))
        });
        cache.clear();
        assert!(cache.is_empty());
    }
}
