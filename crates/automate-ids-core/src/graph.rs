//! # Object Graph
//!
//! Storage for the flat object closure downloaded from a Speckle server,
//! and reassembly of that closure into a single tree.
//!
//! Speckle detaches children: a parent holds
//! `{"speckle_type": "reference", "referencedId": "<id>"}` in place of the
//! child. `ObjectStore::resolve` inlines those references again, once per
//! stored object, so the tree stays as large as the closure.
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::error::{CoreError, Result};
use crate::traversal::is_child_member;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum nesting depth followed while inlining references.
pub const MAX_RESOLVE_DEPTH: usize = 256;

/// Speckle type of a detached-child placeholder.
pub const REFERENCE_TYPE: &str = "reference";

/// Speckle type of a chunk holding part of a large array.
pub const DATA_CHUNK_TYPE: &str = "Speckle.Core.Models.DataChunk";

/// Member listing the ids (and depths) of every descendant of an object.
const CLOSURE_MEMBER: &str = "__closure";

/// Member holding the shared type object of an instance.
const DEFINITION_MEMBER: &str = "definition";

/// Members read as element data, inlined wherever they occur.
const ELEMENT_DATA_MEMBERS: &[&str] = &["parameters", "properties", "material", "classifications"];

/// Return the target id if `value` is a reference placeholder.
pub fn reference_id(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.get("speckle_type").and_then(Value::as_str) != Some(REFERENCE_TYPE) {
        return None;
    }
    obj.get("referencedId").and_then(Value::as_str)
}

fn is_data_chunk(value: &Value) -> bool {
    value
        .get("speckle_type")
        .and_then(Value::as_str)
        .is_some_and(|t| t == DATA_CHUNK_TYPE)
}

/// Flat store of Speckle objects keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: BTreeMap<String, Map<String, Value>>,
}

impl ObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from the JSON array returned by the objects endpoint.
    pub fn from_objects(objects: Vec<Value>) -> Result<Self> {
        let mut store = Self::new();
        for object in objects {
            store.insert(object)?;
        }
        Ok(store)
    }

    /// Insert one object. Returns its id.
    ///
    /// Re-inserting an id replaces the previous object.
    pub fn insert(&mut self, object: Value) -> Result<String> {
        let Value::Object(map) = object else {
            return Err(CoreError::InvalidObject(
                "expected a JSON object".to_string(),
            ));
        };
        let id = map
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CoreError::InvalidObject("object has no string `id`".to_string()))?;
        self.objects.insert(id.clone(), map);
        Ok(id)
    }

    /// Get a raw (unresolved) object by id.
    pub fn get(&self, id: &str) -> Option<&Map<String, Value>> {
        self.objects.get(id)
    }

    /// Check if the store contains an object.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Ids of all stored objects in deterministic order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Reassemble the tree rooted at `root_id`.
    ///
    /// Returns `None` if the root is not in the store. Each stored object is
    /// inlined once and later references to it stay placeholders. Element
    /// data members and the `definition` of an instance are inlined for every
    /// element that holds them. References to unknown ids, references that
    /// would re-enter an ancestor, and anything past `MAX_RESOLVE_DEPTH` are
    /// kept as the raw placeholder.
    #[must_use]
    pub fn resolve(&self, root_id: &str) -> Option<Value> {
        let (root_id, root) = self.objects.get_key_value(root_id)?;
        let mut resolver = Resolver {
            store: self,
            inlined: BTreeSet::from([root_id.as_str()]),
            ancestors: BTreeSet::from([root_id.as_str()]),
        };
        Some(Value::Object(resolver.resolve_map(root, Inline::Once, 0)))
    }
}

/// How often a reference is inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inline {
    /// First occurrence only.
    Once,
    /// Every occurrence. Its children go back to `Once`.
    Shallow,
    /// Every occurrence, and everything below it too.
    Deep,
}

impl Inline {
    fn below(self) -> Self {
        match self {
            Self::Deep => Self::Deep,
            Self::Once | Self::Shallow => Self::Once,
        }
    }

    fn for_member(self, key: &str) -> Self {
        if self == Self::Deep || ELEMENT_DATA_MEMBERS.contains(&key) {
            Self::Deep
        } else if key == DEFINITION_MEMBER {
            Self::Shallow
        } else {
            Self::Once
        }
    }
}

/// Per-call resolution state.
struct Resolver<'a> {
    store: &'a ObjectStore,
    inlined: BTreeSet<&'a str>,
    ancestors: BTreeSet<&'a str>,
}

impl<'a> Resolver<'a> {
    /// Child members are resolved first so a shared object is inlined where
    /// traversal will find it. Member order is kept.
    fn resolve_map(
        &mut self,
        map: &'a Map<String, Value>,
        mode: Inline,
        depth: usize,
    ) -> Map<String, Value> {
        let (children, data): (Vec<_>, Vec<_>) = map
            .iter()
            .filter(|(key, _)| key.as_str() != CLOSURE_MEMBER)
            .partition(|(key, _)| is_child_member(key));

        let mut resolved: BTreeMap<&'a str, Value> = BTreeMap::new();
        for (key, value) in children.into_iter().chain(data) {
            let value = self.resolve_value(value, mode.for_member(key), depth);
            resolved.insert(key.as_str(), value);
        }
        map.keys()
            .filter_map(|key| resolved.remove(key.as_str()).map(|value| (key.clone(), value)))
            .collect()
    }

    fn resolve_value(&mut self, value: &'a Value, mode: Inline, depth: usize) -> Value {
        if depth >= MAX_RESOLVE_DEPTH {
            return value.clone();
        }

        match value {
            Value::Object(map) => match reference_id(value) {
                Some(id) => self.inline(value, id, mode, depth),
                None => Value::Object(self.resolve_map(map, mode.below(), depth + 1)),
            },
            Value::Array(items) => {
                let resolved: Vec<Value> = items
                    .iter()
                    .map(|item| self.resolve_value(item, mode, depth + 1))
                    .collect();
                Value::Array(unchunk(resolved))
            }
            other => other.clone(),
        }
    }

    fn inline(&mut self, placeholder: &'a Value, id: &'a str, mode: Inline, depth: usize) -> Value {
        let store = self.store;
        let Some(target) = store.objects.get(id) else {
            return placeholder.clone();
        };
        if self.ancestors.contains(id) || (mode == Inline::Once && self.inlined.contains(id)) {
            return placeholder.clone();
        }
        self.inlined.insert(id);
        self.ancestors.insert(id);
        let resolved = self.resolve_map(target, mode.below(), depth + 1);
        self.ancestors.remove(id);
        Value::Object(resolved)
    }
}

/// Concatenate chunked arrays: `[chunk{data:[a,b]}, chunk{data:[c]}]` -> `[a,b,c]`.
fn unchunk(items: Vec<Value>) -> Vec<Value> {
    if items.is_empty() || !items.iter().all(is_data_chunk) {
        return items;
    }
    items
        .into_iter()
        .flat_map(|chunk| match chunk {
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(data)) => data,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
