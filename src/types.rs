//! Core schema types shared by inference, merge and storage.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// JSON Schema draft stamped on root documents by [`crate::to_document`].
pub const DRAFT_04: &str = "http://json-schema.org/draft-04/schema#";

/// Primitive or structural type tag of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl SchemaType {
    /// Returns the JSON Schema name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred or merged schema for a JSON value.
///
/// A node is exactly one of: a primitive (`type` only, plus `minLength` for
/// strings), an object shape (`properties` and `required`), an array shape
/// (`items`, `minItems`, `uniqueItems`), a union (`anyOf`), or the empty
/// placeholder `{}` used for the items of an empty array.
///
/// Absent attributes are skipped on serialization. `properties` is ordered
/// by key and `required` is a sorted set, so output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<SchemaNode>>,
}

impl SchemaNode {
    /// The empty placeholder schema `{}`.
    pub fn placeholder() -> Self {
        Self::default()
    }

    /// A bare type tag with no other attributes.
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// A string node; `non_empty` selects `minLength: 1` over `minLength: 0`.
    pub fn string(non_empty: bool) -> Self {
        Self {
            schema_type: Some(SchemaType::String),
            min_length: Some(u64::from(non_empty)),
            ..Self::default()
        }
    }

    /// An object node. `required` keys missing from `properties` are dropped.
    pub fn object(properties: BTreeMap<String, SchemaNode>, required: BTreeSet<String>) -> Self {
        let required = required
            .into_iter()
            .filter(|key| properties.contains_key(key))
            .collect();
        Self {
            schema_type: Some(SchemaType::Object),
            properties: Some(properties),
            required: Some(required),
            ..Self::default()
        }
    }

    /// An array node with the given item schema and no cardinality hints.
    pub fn array(items: SchemaNode) -> Self {
        Self {
            schema_type: Some(SchemaType::Array),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// A union node over the given alternatives.
    pub fn union(alternatives: Vec<SchemaNode>) -> Self {
        Self {
            any_of: Some(alternatives),
            ..Self::default()
        }
    }

    /// True for `anyOf` nodes.
    pub fn is_union(&self) -> bool {
        self.any_of.is_some()
    }

    /// True for the empty placeholder `{}` (attributes other than shape are ignored).
    pub fn is_placeholder(&self) -> bool {
        self.schema_type.is_none()
            && self.any_of.is_none()
            && self.properties.is_none()
            && self.items.is_none()
    }

    /// True when the node carries non-empty `properties` or an `items` schema.
    pub fn has_shape(&self) -> bool {
        self.properties.as_ref().is_some_and(|props| !props.is_empty()) || self.items.is_some()
    }

    /// Looks up a direct child property.
    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties.as_ref()?.get(name)
    }

    /// True when `name` is listed in `required`.
    pub fn is_required(&self, name: &str) -> bool {
        self.required
            .as_ref()
            .is_some_and(|required| required.contains(name))
    }

    /// Structural equivalence.
    ///
    /// Compares types, property sets, required sets (absent equals empty),
    /// item shapes and union alternatives. `minItems`, `uniqueItems` and
    /// `minLength` are observation heuristics and do not participate.
    pub fn is_equivalent(&self, other: &SchemaNode) -> bool {
        if self.schema_type != other.schema_type {
            return false;
        }

        let no_required = BTreeSet::new();
        let required = self.required.as_ref().unwrap_or(&no_required);
        let other_required = other.required.as_ref().unwrap_or(&no_required);
        if required != other_required {
            return false;
        }

        let properties_match = match (&self.properties, &other.properties) {
            (Some(left), Some(right)) => {
                left.len() == right.len()
                    && left.iter().all(|(key, node)| {
                        right
                            .get(key)
                            .is_some_and(|other_node| node.is_equivalent(other_node))
                    })
            }
            (None, None) => true,
            (Some(props), None) | (None, Some(props)) => props.is_empty(),
        };
        if !properties_match {
            return false;
        }

        let items_match = match (&self.items, &other.items) {
            (Some(left), Some(right)) => left.is_equivalent(right),
            (None, None) => true,
            _ => false,
        };
        if !items_match {
            return false;
        }

        match (&self.any_of, &other.any_of) {
            (Some(left), Some(right)) => {
                left.len() == right.len()
                    && left
                        .iter()
                        .all(|alt| right.iter().any(|other_alt| alt.is_equivalent(other_alt)))
            }
            (None, None) => true,
            _ => false,
        }
    }
}
