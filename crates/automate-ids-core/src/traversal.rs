//! # Traversal Module
//!
//! Depth-first walk over a resolved Speckle object tree.
//!
//! Children are found in `elements`, `@elements`, every other `@`-prefixed
//! member, and the `definition` of instances. Revit `parameters` are data,
//! not children, and are never walked. Reference placeholders left by
//! `ObjectStore::resolve` are skipped.

use crate::graph::reference_id;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Maximum depth visited. Deeper objects are ignored.
pub const MAX_TRAVERSAL_DEPTH: usize = 512;

/// One visited object together with where it was found.
#[derive(Debug, Clone, Copy)]
pub struct TraversalContext<'a> {
    /// The visited object.
    pub current: &'a Map<String, Value>,
    /// `speckle_type` of the parent, if any.
    pub parent_type: Option<&'a str>,
    /// Own id, or the nearest ancestor id for objects without one.
    pub inherited_id: Option<&'a str>,
    /// Distance from the root (root = 0).
    pub depth: usize,
}

impl<'a> TraversalContext<'a> {
    /// The object's own `speckle_type`.
    pub fn speckle_type(&self) -> Option<&'a str> {
        self.current.get("speckle_type").and_then(Value::as_str)
    }

    /// The object's own `id`.
    pub fn id(&self) -> Option<&'a str> {
        self.current.get("id").and_then(Value::as_str)
    }
}

/// Members whose Base values are walked as children.
pub(crate) fn is_child_member(key: &str) -> bool {
    key == "elements" || key == "definition" || key.starts_with('@')
}

/// A Base object that is not a leftover reference placeholder.
fn is_base(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key("speckle_type"))
        && reference_id(value).is_none()
}

/// Walk the tree rooted at `root`, parent before children.
///
/// An object whose id has already been yielded is skipped along with its
/// subtree. A root that is not a JSON object yields nothing.
pub fn traverse(root: &Value) -> Vec<TraversalContext<'_>> {
    let mut out = Vec::new();
    let Some(map) = root.as_object() else {
        return out;
    };
    let mut seen = BTreeSet::new();
    visit(map, None, None, 0, &mut seen, &mut out);
    out
}

fn visit<'a>(
    current: &'a Map<String, Value>,
    parent_type: Option<&'a str>,
    parent_id: Option<&'a str>,
    depth: usize,
    seen: &mut BTreeSet<&'a str>,
    out: &mut Vec<TraversalContext<'a>>,
) {
    if depth > MAX_TRAVERSAL_DEPTH {
        return;
    }

    let own_id = current.get("id").and_then(Value::as_str);
    if let Some(id) = own_id {
        if !seen.insert(id) {
            return;
        }
    }

    let context = TraversalContext {
        current,
        parent_type,
        inherited_id: own_id.or(parent_id),
        depth,
    };
    out.push(context);

    let this_type = context.speckle_type();
    for (key, value) in current {
        if !is_child_member(key) {
            continue;
        }
        match value {
            Value::Object(child) if is_base(value) => {
                visit(child, this_type, context.inherited_id, depth + 1, seen, out);
            }
            Value::Array(items) => {
                for item in items.iter().filter(|item| is_base(item)) {
                    if let Value::Object(child) = item {
                        visit(child, this_type, context.inherited_id, depth + 1, seen, out);
                    }
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
