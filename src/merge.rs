//! Schema merging - folds a new observation into an accumulated schema.
//!
//! Merging is conservative: nothing observed is dropped, and a field only
//! stays required when both sides require it.
//!
//! # Rules
//!
//! | Operands | Result |
//! |----------|--------|
//! | one side absent or `{}` | the other side |
//! | different types, or either is `anyOf` | flat `anyOf` of both sides' alternatives |
//! | both `object` | union of properties, intersection of `required` |
//! | both `array` | `items` merged, cardinality hints dropped |
//! | same primitive | the side with more shape, lowest `minLength` |
//!
//! Alternatives are never nested: a union absorbs another union's
//! alternatives, and an incoming alternative whose `type` is already present
//! is merged into the existing one instead of being appended.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{SchemaNode, SchemaType};

/// Merge two optional schemas. An absent side returns the other unchanged.
pub fn merge(a: Option<&SchemaNode>, b: Option<&SchemaNode>) -> Option<SchemaNode> {
    match (a, b) {
        (Some(a), Some(b)) => Some(merge_nodes(a, b)),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (None, None) => None,
    }
}

/// Merge two schemas describing the same endpoint. Never fails: operands
/// that cannot be reconciled become alternatives of a union.
pub fn merge_nodes(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    if a.is_placeholder() {
        return b.clone();
    }
    if b.is_placeholder() {
        return a.clone();
    }

    if a.is_union() || b.is_union() || a.schema_type != b.schema_type {
        return merge_union(a, b);
    }

    match a.schema_type {
        Some(SchemaType::Object) => merge_objects(a, b),
        Some(SchemaType::Array) => SchemaNode {
            schema_type: Some(SchemaType::Array),
            items: merge(a.items.as_deref(), b.items.as_deref()).map(Box::new),
            ..SchemaNode::default()
        },
        _ => merge_primitives(a, b),
    }
}

// --- Internal implementation ---

fn alternatives(node: &SchemaNode) -> &[SchemaNode] {
    match &node.any_of {
        Some(alternatives) => alternatives.as_slice(),
        None => std::slice::from_ref(node),
    }
}

fn merge_union(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    let mut folded: Vec<SchemaNode> = Vec::new();
    for incoming in alternatives(a).iter().chain(alternatives(b)) {
        absorb(&mut folded, incoming);
    }

    if folded.len() == 1 {
        return folded.remove(0);
    }
    SchemaNode::union(folded)
}

fn absorb(folded: &mut Vec<SchemaNode>, incoming: &SchemaNode) {
    let slot = incoming.schema_type.and_then(|schema_type| {
        folded
            .iter_mut()
            .find(|existing| existing.schema_type == Some(schema_type))
    });

    match slot {
        Some(existing) => {
            let merged = merge_nodes(existing, incoming);
            *existing = merged;
        }
        None => folded.push(incoming.clone()),
    }
}

fn merge_objects(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    let no_properties = BTreeMap::new();
    let left = a.properties.as_ref().unwrap_or(&no_properties);
    let right = b.properties.as_ref().unwrap_or(&no_properties);

    let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();

    let properties: BTreeMap<String, SchemaNode> = keys
        .iter()
        .filter_map(|key| {
            merge(left.get(*key), right.get(*key)).map(|node| ((*key).clone(), node))
        })
        .collect();

    // A field stays required only when both observations require it
    let required: BTreeSet<String> = match (&a.required, &b.required) {
        (Some(left_required), Some(right_required)) => left_required
            .intersection(right_required)
            .filter(|key| keys.contains(key))
            .cloned()
            .collect(),
        _ => BTreeSet::new(),
    };

    SchemaNode {
        schema_type: Some(SchemaType::Object),
        properties: Some(properties),
        required: (!required.is_empty()).then_some(required),
        ..SchemaNode::default()
    }
}

fn merge_primitives(a: &SchemaNode, b: &SchemaNode) -> SchemaNode {
    let mut merged = if a.has_shape() || !b.has_shape() {
        a.clone()
    } else {
        b.clone()
    };

    // An empty string on either side relaxes the length hint
    merged.min_length = match (a.min_length, b.min_length) {
        (Some(left), Some(right)) => Some(left.min(right)),
        _ => None,
    };
    merged
}
