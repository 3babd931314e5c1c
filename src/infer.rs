//! Schema inference - builds a structural schema from a single JSON value.
//!
//! Inference is a pure, total function: every JSON value yields a schema and
//! nothing is ever rejected. Values are classified by an ordered chain
//! (object, array, null, boolean, string, number) before a schema is built.
//!
//! # Arrays
//!
//! | Observed array | Result |
//! |----------------|--------|
//! | `[]` | `items: {}`, `minItems: 0`, `uniqueItems: false` |
//! | first element is an object | keys of all object elements unioned into one record schema, `minItems: 1`, `uniqueItems: true` |
//! | anything else | positional: one schema per index under `items.properties` |
//!
//! In the record case the first value seen for a key decides its schema;
//! later elements only contribute keys not seen yet. A key is required
//! only when every object element carries it with a non-null value.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::{SchemaNode, SchemaType, DRAFT_04};

/// Options controlling inference heuristics.
#[derive(Debug, Clone)]
pub struct InferOptions {
    /// Classify strings that pass the loose numeric check as `number`.
    pub numeric_strings: bool,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            numeric_strings: true,
        }
    }
}

impl InferOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable numeric string classification.
    #[must_use]
    pub fn numeric_strings(mut self, enabled: bool) -> Self {
        self.numeric_strings = enabled;
        self
    }
}

/// Runtime kind of a JSON value, in classification order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kind<'a> {
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Null,
    Boolean,
    String(&'a str),
    Number,
    /// Matched no predicate; rendered as an empty-allowed string.
    Untyped,
}

/// Classify a value. The predicate order is fixed: object, array, null,
/// boolean, numeric string, string, number.
///
/// With `numeric_strings` enabled (the default) the numeric string check
/// runs before the string check, so `"42"` is [`Kind::Number`]. With it
/// disabled every string is [`Kind::String`].
pub fn classify<'a>(value: &'a Value, options: &InferOptions) -> Kind<'a> {
    match value {
        Value::Object(map) => Kind::Object(map),
        Value::Array(items) => Kind::Array(items.as_slice()),
        Value::Null => Kind::Null,
        Value::Bool(_) => Kind::Boolean,
        Value::String(s) if options.numeric_strings && is_loose_numeric(s) => Kind::Number,
        Value::String(s) => Kind::String(s.as_str()),
        Value::Number(n) if n.as_f64().is_some_and(f64::is_finite) => Kind::Number,
        Value::Number(_) => Kind::Untyped,
    }
}

/// Infer a schema with default options.
pub fn infer(value: &Value) -> SchemaNode {
    infer_with(value, &InferOptions::default())
}

/// Infer a schema for `value`.
pub fn infer_with(value: &Value, options: &InferOptions) -> SchemaNode {
    match classify(value, options) {
        Kind::Object(map) => infer_record(map.iter(), options),
        Kind::Array(items) => infer_array(items, options),
        Kind::Null => SchemaNode::of(SchemaType::Null),
        Kind::Boolean => SchemaNode::of(SchemaType::Boolean),
        Kind::Number => SchemaNode::of(SchemaType::Number),
        Kind::String(s) => SchemaNode::string(!s.is_empty()),
        Kind::Untyped => {
            debug!(value = %value, "unclassifiable value, falling back to string");
            SchemaNode::string(false)
        }
    }
}

/// Serialize a root schema as a standalone draft-04 document.
///
/// # Errors
///
/// Returns the serializer error; schema nodes always serialize in practice.
pub fn to_document(node: &SchemaNode) -> Result<Value, serde_json::Error> {
    let mut document = Map::new();
    document.insert("$schema".to_string(), Value::String(DRAFT_04.to_string()));
    if let Value::Object(fields) = serde_json::to_value(node)? {
        document.extend(fields);
    }
    Ok(Value::Object(document))
}

/// Loose numeric check on a string.
///
/// Mirrors the browser-side test `Number(s) - parseFloat(s) + 1 >= 0`:
/// the whole string must convert to a number and a numeric prefix must
/// parse. Blank strings, `Infinity` and trailing garbage fail; hex, octal
/// and binary literals pass because their float prefix parses as `0`.
pub fn is_loose_numeric(s: &str) -> bool {
    match (to_number(s), parse_float(s)) {
        (Some(whole), Some(prefix)) => whole - prefix + 1.0 >= 0.0,
        _ => false,
    }
}

// --- Internal implementation ---

fn infer_record<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
    options: &InferOptions,
) -> SchemaNode {
    let mut properties = BTreeMap::new();
    let mut required = BTreeSet::new();

    for (key, value) in entries {
        if !value.is_null() {
            required.insert(key.clone());
        }
        properties.insert(key.clone(), infer_with(value, options));
    }

    SchemaNode::object(properties, required)
}

fn infer_array(items: &[Value], options: &InferOptions) -> SchemaNode {
    let Some(first) = items.first() else {
        let mut node = SchemaNode::array(SchemaNode::placeholder());
        node.min_items = Some(0);
        node.unique_items = Some(false);
        return node;
    };

    let (item_schema, unique) = if first.is_object() {
        (infer_records(items, options), true)
    } else {
        (infer_positional(items, options), false)
    };

    let mut node = SchemaNode::array(item_schema);
    node.min_items = Some(1);
    node.unique_items = Some(unique);
    node
}

/// Union the keys of every object element (first value seen wins).
fn infer_records(items: &[Value], options: &InferOptions) -> SchemaNode {
    let mut merged: BTreeMap<&String, &Value> = BTreeMap::new();
    let mut always_present: Option<BTreeSet<&String>> = None;

    for element in items.iter().filter_map(Value::as_object) {
        for (key, value) in element {
            merged.entry(key).or_insert(value);
        }

        let present: BTreeSet<&String> = element
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, _)| key)
            .collect();
        always_present = Some(match always_present {
            None => present,
            Some(seen) => seen.intersection(&present).copied().collect(),
        });
    }

    let mut record = infer_record(merged.into_iter(), options);
    record.required = Some(
        always_present
            .unwrap_or_default()
            .into_iter()
            .cloned()
            .collect(),
    );
    record
}

/// One schema per index; an index is required when its value is populated.
fn infer_positional(items: &[Value], options: &InferOptions) -> SchemaNode {
    let mut properties = BTreeMap::new();
    let mut required = BTreeSet::new();

    for (index, element) in items.iter().enumerate() {
        let key = index.to_string();
        if is_populated(element) {
            required.insert(key.clone());
        }
        properties.insert(key, infer_with(element, options));
    }

    SchemaNode::object(properties, required)
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// ECMAScript `WhiteSpace` and `LineTerminator` code points (the set
/// `Number()` and `parseFloat` trim). Unlike `char::is_whitespace` this
/// excludes U+0085.
fn is_js_whitespace(c: char) -> bool {
    matches!(
        c,
        '\t' | '\u{b}' | '\u{c}' | ' ' | '\u{a0}' | '\u{feff}'
            | '\n' | '\r' | '\u{2028}' | '\u{2029}'
            | '\u{1680}' | '\u{2000}'..='\u{200a}' | '\u{202f}' | '\u{205f}' | '\u{3000}'
    )
}

/// Whole-string numeric conversion; `None` stands for NaN.
fn to_number(s: &str) -> Option<f64> {
    let trimmed = s.trim_matches(is_js_whitespace);
    if trimmed.is_empty() {
        return Some(0.0);
    }

    for (prefix, radix) in [
        ("0x", 16),
        ("0X", 16),
        ("0o", 8),
        ("0O", 8),
        ("0b", 2),
        ("0B", 2),
    ] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return parse_radix(digits, radix);
        }
    }

    let (len, value) = decimal_prefix(trimmed)?;
    (len == trimmed.len()).then_some(value)
}

/// Leading-prefix float parse; `None` stands for NaN.
fn parse_float(s: &str) -> Option<f64> {
    decimal_prefix(s.trim_start_matches(is_js_whitespace)).map(|(_, value)| value)
}

fn parse_radix(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0.0_f64, |acc, c| {
        c.to_digit(radix)
            .map(|digit| acc * f64::from(radix) + f64::from(digit))
    })
}

/// Longest prefix of `s` that is a decimal literal (or signed `Infinity`).
/// Returns the prefix length in bytes and its value.
fn decimal_prefix(s: &str) -> Option<(usize, f64)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i = 1;
    }

    if s[i..].starts_with("Infinity") {
        let value = if bytes[0] == b'-' {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        return Some((i + "Infinity".len(), value));
    }

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;

    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if digits > 0 || j > frac_start {
            digits += j - frac_start;
            i = j;
        }
    }

    if digits == 0 {
        return None;
    }

    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    s[..i].parse::<f64>().ok().map(|value| (i, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() -> InferOptions {
        InferOptions::new().numeric_strings(false)
    }

    // === Classification ===

    #[test]
    fn classify_follows_predicate_order() {
        let options = InferOptions::default();
        assert!(matches!(classify(&json!({}), &options), Kind::Object(_)));
        assert!(matches!(classify(&json!([]), &options), Kind::Array(_)));
        assert_eq!(classify(&json!(null), &options), Kind::Null);
        assert_eq!(classify(&json!(true), &options), Kind::Boolean);
        assert_eq!(classify(&json!("abc"), &options), Kind::String("abc"));
        assert_eq!(classify(&json!(1.5), &options), Kind::Number);
    }

    #[test]
    fn classify_numeric_string_as_number() {
        assert_eq!(classify(&json!("42"), &InferOptions::default()), Kind::Number);
        assert_eq!(classify(&json!("42"), &plain()), Kind::String("42"));
    }

    #[test]
    fn loose_numeric_accepts() {
        for s in ["0", "42", "-1", "+3", "1.5", ".5", "5.", "1e3", " 12 ", "0x10", "0b101", "0o17"] {
            assert!(is_loose_numeric(s), "{s:?} should be numeric");
        }
    }

    #[test]
    fn loose_numeric_trims_ecmascript_whitespace() {
        for s in ["\t1\n", "\u{a0}2", "\u{feff}3", "\u{2028}4\u{2029}", "\u{3000}5", "\u{b}6\u{c}"] {
            assert!(is_loose_numeric(s), "{s:?} should be numeric");
        }
    }

    #[test]
    fn loose_numeric_rejects_non_ecmascript_whitespace() {
        for s in ["\u{85}1", "1\u{85}", "\u{200b}1"] {
            assert!(!is_loose_numeric(s), "{s:?} should not be numeric");
        }
        assert_eq!(
            serde_json::to_value(infer(&json!("\u{85}1"))).unwrap(),
            json!({ "type": "string", "minLength": 1 })
        );
    }

    #[test]
    fn loose_numeric_rejects() {
        for s in ["", "   ", "abc", "12abc", "1_000", "Infinity", "-Infinity", "1e400", "0x", "+0x10", "NaN", "inf"] {
            assert!(!is_loose_numeric(s), "{s:?} should not be numeric");
        }
    }

    // === Scalars ===

    #[test]
    fn infer_scalars() {
        assert_eq!(
            serde_json::to_value(infer(&json!(3))).unwrap(),
            json!({ "type": "number" })
        );
        assert_eq!(
            serde_json::to_value(infer(&json!(false))).unwrap(),
            json!({ "type": "boolean" })
        );
        assert_eq!(
            serde_json::to_value(infer(&json!(null))).unwrap(),
            json!({ "type": "null" })
        );
        assert_eq!(
            serde_json::to_value(infer(&json!(""))).unwrap(),
            json!({ "type": "string", "minLength": 0 })
        );
        assert_eq!(
            serde_json::to_value(infer(&json!("x"))).unwrap(),
            json!({ "type": "string", "minLength": 1 })
        );
    }

    // === Objects ===

    #[test]
    fn infer_object_scenario() {
        let schema = infer(&json!({ "id": 1, "name": "Alice" }));
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "number" },
                    "name": { "type": "string", "minLength": 1 }
                },
                "required": ["id", "name"]
            })
        );
    }

    #[test]
    fn infer_object_null_field_is_optional() {
        let schema = infer(&json!({ "id": 1, "deleted_at": null }));
        assert!(schema.is_required("id"));
        assert!(!schema.is_required("deleted_at"));
        assert_eq!(
            schema.property("deleted_at").unwrap().schema_type,
            Some(SchemaType::Null)
        );
    }

    #[test]
    fn infer_empty_object_keeps_empty_required() {
        let schema = infer(&json!({}));
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({ "type": "object", "properties": {}, "required": [] })
        );
    }

    // === Arrays ===

    #[test]
    fn infer_empty_array() {
        assert_eq!(
            serde_json::to_value(infer(&json!([]))).unwrap(),
            json!({ "type": "array", "items": {}, "minItems": 0, "uniqueItems": false })
        );
    }

    #[test]
    fn infer_record_array_unions_keys() {
        let schema = infer(&json!([{ "a": 1 }, { "a": 2, "b": "x" }]));
        assert_eq!(schema.min_items, Some(1));
        assert_eq!(schema.unique_items, Some(true));

        let items = schema.items.as_deref().unwrap();
        assert_eq!(items.property("a").unwrap().schema_type, Some(SchemaType::Number));
        assert_eq!(items.property("b").unwrap().schema_type, Some(SchemaType::String));
        assert!(items.is_required("a"));
        assert!(!items.is_required("b"));
    }

    #[test]
    fn infer_record_array_first_seen_key_wins() {
        let schema = infer(&json!([{ "v": "text" }, { "v": true }]));
        let items = schema.items.as_deref().unwrap();
        assert_eq!(items.property("v").unwrap().schema_type, Some(SchemaType::String));
    }

    #[test]
    fn infer_record_array_null_in_any_element_is_optional() {
        let schema = infer(&json!([{ "a": 1, "b": 2 }, { "a": 1, "b": null }]));
        let items = schema.items.as_deref().unwrap();
        assert!(items.is_required("a"));
        assert!(!items.is_required("b"));
    }

    #[test]
    fn infer_positional_array() {
        let schema = infer(&json!([1, "two", null, []]));
        assert_eq!(schema.min_items, Some(1));
        assert_eq!(schema.unique_items, Some(false));

        let items = schema.items.as_deref().unwrap();
        assert_eq!(items.schema_type, Some(SchemaType::Object));
        assert_eq!(items.property("0").unwrap().schema_type, Some(SchemaType::Number));
        assert_eq!(items.property("1").unwrap().schema_type, Some(SchemaType::String));
        assert_eq!(items.property("2").unwrap().schema_type, Some(SchemaType::Null));
        assert_eq!(items.property("3").unwrap().schema_type, Some(SchemaType::Array));
        assert!(items.is_required("0"));
        assert!(items.is_required("1"));
        assert!(!items.is_required("2"));
        assert!(!items.is_required("3"));
    }

    #[test]
    fn infer_positional_mode_when_first_is_not_object() {
        let schema = infer(&json!([1, { "a": 1 }]));
        let items = schema.items.as_deref().unwrap();
        let nested = items.property("1").unwrap();
        assert_eq!(nested.schema_type, Some(SchemaType::Object));
        assert!(nested.is_required("a"));
    }

    #[test]
    fn infer_is_deterministic() {
        let value = json!({ "users": [{ "id": 1, "tags": ["a"] }, { "id": 2, "email": "x@y" }] });
        assert_eq!(infer(&value), infer(&value));
    }

    // === Documents ===

    #[test]
    fn to_document_stamps_draft_first() {
        let document = to_document(&infer(&json!({ "ok": true }))).unwrap();
        let keys: Vec<&String> = document.as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "$schema");
        assert_eq!(document["$schema"], DRAFT_04);
        assert_eq!(document["type"], "object");
    }
}
