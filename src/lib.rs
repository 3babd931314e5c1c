//! Endpoint Schema
//!
//! Infers JSON Schemas from captured API response bodies and merges repeated
//! observations of an endpoint into one progressively more accurate schema.
//!
//! # Example
//!
//! ```
//! use endpoint_schema::{infer, merge_nodes};
//! use serde_json::json;
//!
//! let first = infer(&json!({ "id": 1, "name": "Alice" }));
//! let second = infer(&json!({ "id": 2, "email": "bob@example.com" }));
//!
//! let merged = merge_nodes(&first, &second);
//!
//! // Every observed field is kept; only fields seen every time stay required
//! assert!(merged.property("name").is_some());
//! assert!(merged.property("email").is_some());
//! assert!(merged.is_required("id"));
//! assert!(!merged.is_required("name"));
//! ```
//!
//! # Inference Rules
//!
//! | Value | Schema |
//! |-------|--------|
//! | object | `properties` per key, `required` for non-null values |
//! | array of objects | one `items` object over the union of keys |
//! | other non-empty array | positional `items` keyed `"0"`, `"1"`, ... |
//! | empty array | `items: {}` with `minItems: 0` |
//! | string | `minLength` 1, or 0 when empty |
//! | numeric-looking string | `number` (see [`InferOptions`]) |
//! | number, boolean, null | the matching `type` |
//!
//! # Recording
//!
//! A [`Recorder`] filters captured responses, infers their schemas and folds
//! them into a [`SchemaStore`] keyed by [`canonical_key`].

mod endpoint;
mod error;
mod infer;
mod loader;
mod merge;
mod recorder;
mod store;
mod types;
mod validator;

pub use endpoint::{
    canonical_key, canonical_key_with_base, is_json_content_type, normalize_method,
    to_absolute_url, IgnoreRules, DEFAULT_IGNORED_PATTERNS,
};
pub use error::{ConfigError, LoadError, SchemaError, StoreError, ValidateError};
pub use infer::{classify, infer, infer_with, is_loose_numeric, to_document, InferOptions, Kind};
pub use loader::{
    is_url, load_captures, load_json, load_json_auto, load_json_str, load_schema_node,
    parse_captures,
};
pub use merge::{merge, merge_nodes};
pub use recorder::{
    Capture, Observation, RecordSummary, Recorder, RecorderConfig, SkipReason,
    DEFAULT_MAX_RECORDS,
};
pub use store::{EndpointRecord, FileStore, MemoryStore, SchemaStore};
pub use types::{SchemaNode, SchemaType, DRAFT_04};
pub use validator::{validate_against_schema, validate_node};

#[cfg(feature = "remote")]
pub use loader::load_json_url;
