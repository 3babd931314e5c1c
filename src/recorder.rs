//! Capture pipeline - filters captured responses, infers their schemas and
//! folds them into the stored record for each endpoint.
//!
//! # Pipeline
//!
//! 1. Skip `OPTIONS` preflights
//! 2. Skip paths matched by the ignore rules
//! 3. Skip non-JSON content types (unless disabled)
//! 4. Skip blank bodies and bodies that don't parse as JSON
//! 5. Infer a schema, derive the canonical key, then read-merge-write
//! 6. On a new endpoint, evict the oldest records beyond `max_records`
//!
//! Step 5 holds a per-key lock, so concurrent captures of one endpoint are
//! merged one after another while different endpoints proceed in parallel.
//! Lock entries are dropped once no capture holds them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::endpoint::{
    canonical_key_with_base, is_json_content_type, normalize_method, to_absolute_url,
    IgnoreRules, DEFAULT_IGNORED_PATTERNS,
};
use crate::error::{ConfigError, LoadError, StoreError};
use crate::infer::{infer_with, InferOptions};
use crate::loader::load_json;
use crate::merge::merge_nodes;
use crate::store::{EndpointRecord, SchemaStore};
use crate::types::SchemaNode;

/// Default record cap, matching the size of the capture log the schemas
/// are collected into.
pub const DEFAULT_MAX_RECORDS: usize = 100;

/// One captured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub response_body: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Capture {
    /// A JSON `GET` capture stamped with the current time.
    pub fn json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            response_body: body.into(),
            content_type: Some("application/json".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(String::from);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Recorder configuration. Every field has a default, so a config file
/// only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Origin relative capture URLs are resolved against.
    pub origin: Option<String>,
    /// Only record responses with a JSON content type.
    pub require_json_content_type: bool,
    /// Path patterns (regex) for endpoints that are never recorded.
    pub ignored_patterns: Vec<String>,
    /// Maximum number of endpoint records kept in the store (`None` is
    /// unbounded, zero is rejected). Creating a record beyond the cap evicts
    /// the records with the oldest timestamps.
    pub max_records: Option<usize>,
    /// Classify numeric-looking strings as numbers.
    pub numeric_strings: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            origin: None,
            require_json_content_type: true,
            ignored_patterns: DEFAULT_IGNORED_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_records: Some(DEFAULT_MAX_RECORDS),
            numeric_strings: true,
        }
    }
}

impl RecorderConfig {
    /// Load a config from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if the file can't be read or doesn't match the
    /// config shape.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let value = load_json(path)?;
        serde_json::from_value(value).map_err(|source| LoadError::InvalidConfig {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Why a capture was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Preflight,
    IgnoredPath,
    NotJson,
    EmptyBody,
    InvalidJson,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SkipReason::Preflight => "CORS preflight",
            SkipReason::IgnoredPath => "ignored path",
            SkipReason::NotJson => "non-JSON content type",
            SkipReason::EmptyBody => "empty body",
            SkipReason::InvalidJson => "body is not valid JSON",
        };
        f.write_str(reason)
    }
}

/// Outcome of observing one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First schema for this endpoint.
    Created { key: String },
    /// Folded into an existing record; `changed` is false when the merged
    /// schema is equivalent to the stored one.
    Merged { key: String, changed: bool },
    Skipped(SkipReason),
}

/// Totals for a batch of captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub created: usize,
    pub merged: usize,
    pub changed: usize,
    pub skipped: usize,
}

impl RecordSummary {
    fn count(&mut self, observation: &Observation) {
        match observation {
            Observation::Created { .. } => self.created += 1,
            Observation::Merged { changed, .. } => {
                self.merged += 1;
                if *changed {
                    self.changed += 1;
                }
            }
            Observation::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Folds captures into a [`SchemaStore`].
#[derive(Debug)]
pub struct Recorder<S> {
    store: S,
    origin: Option<Url>,
    ignore: IgnoreRules,
    require_json_content_type: bool,
    infer_options: InferOptions,
    max_records: Option<usize>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    evict_lock: Mutex<()>,
}

impl<S: SchemaStore> Recorder<S> {
    /// Build a recorder over `store`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unparseable origin or ignore pattern,
    /// or a record cap of zero.
    pub fn new(store: S, config: &RecorderConfig) -> Result<Self, ConfigError> {
        if config.max_records == Some(0) {
            return Err(ConfigError::ZeroMaxRecords);
        }

        let origin = config
            .origin
            .as_deref()
            .map(|origin| {
                Url::parse(origin).map_err(|source| ConfigError::InvalidOrigin {
                    origin: origin.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self {
            store,
            origin,
            ignore: IgnoreRules::new(&config.ignored_patterns)?,
            require_json_content_type: config.require_json_content_type,
            infer_options: InferOptions::new().numeric_strings(config.numeric_strings),
            max_records: config.max_records,
            key_locks: Mutex::new(HashMap::new()),
            evict_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Observe one capture.
    ///
    /// # Errors
    ///
    /// Only store failures are errors; unusable captures are skipped.
    pub fn observe(&self, capture: &Capture) -> Result<Observation, StoreError> {
        let method = normalize_method(&capture.method);
        let url = to_absolute_url(&capture.url, self.origin.as_ref());

        if let Some(reason) = self.skip_reason(capture, &method, &url) {
            debug!(%method, %url, %reason, "skipping capture");
            return Ok(Observation::Skipped(reason));
        }

        let body: Value = match serde_json::from_str(&capture.response_body) {
            Ok(body) => body,
            Err(e) => {
                debug!(%method, %url, error = %e, "skipping capture with invalid JSON body");
                return Ok(Observation::Skipped(SkipReason::InvalidJson));
            }
        };

        let schema = infer_with(&body, &self.infer_options);
        let key = canonical_key_with_base(&url, &method, self.origin.as_ref());

        let lock = self.key_lock(&key)?;
        let observation = match lock.lock() {
            Ok(_guard) => self.fold(&key, url, method, schema, capture.timestamp),
            Err(_) => Err(StoreError::Poisoned),
        };
        self.release_key_lock(&key, lock)?;

        let observation = observation?;
        if matches!(observation, Observation::Created { .. }) {
            self.enforce_cap(&key)?;
        }
        Ok(observation)
    }

    /// Read-merge-write for one key. Callers hold the key's lock.
    fn fold(
        &self,
        key: &str,
        url: String,
        method: String,
        schema: SchemaNode,
        timestamp: DateTime<Utc>,
    ) -> Result<Observation, StoreError> {
        match self.store.get(key)? {
            Some(existing) => {
                let merged = merge_nodes(&existing.schema, &schema);
                let changed = !merged.is_equivalent(&existing.schema);
                self.store.put(EndpointRecord {
                    schema: merged,
                    timestamp,
                    ..existing
                })?;

                if changed {
                    info!(%key, "endpoint schema changed");
                } else {
                    debug!(%key, "endpoint schema unchanged");
                }
                Ok(Observation::Merged {
                    key: key.to_string(),
                    changed,
                })
            }
            None => {
                self.store.put(EndpointRecord {
                    canonical_key: key.to_string(),
                    url,
                    method,
                    schema,
                    timestamp,
                })?;
                info!(%key, "new endpoint recorded");
                Ok(Observation::Created {
                    key: key.to_string(),
                })
            }
        }
    }

    /// Evict the oldest records (by timestamp) beyond `max_records`. The
    /// record just created for `newest` is never a candidate.
    fn enforce_cap(&self, newest: &str) -> Result<(), StoreError> {
        let Some(max) = self.max_records else {
            return Ok(());
        };
        let _guard = self.evict_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let records = self.store.records()?;
        let excess = records.len().saturating_sub(max);
        if excess == 0 {
            return Ok(());
        }

        let mut candidates: Vec<&EndpointRecord> = records
            .iter()
            .filter(|record| record.canonical_key != newest)
            .collect();
        candidates.sort_by_key(|record| record.timestamp);

        for record in candidates.into_iter().take(excess) {
            self.store.remove(&record.canonical_key)?;
            warn!(key = %record.canonical_key, max, "record cap reached, evicting oldest endpoint");
        }
        Ok(())
    }

    /// Observe captures in order, stopping at the first store failure.
    ///
    /// # Errors
    ///
    /// Returns the first `StoreError` encountered.
    pub fn observe_all<'a, I>(&self, captures: I) -> Result<RecordSummary, StoreError>
    where
        I: IntoIterator<Item = &'a Capture>,
    {
        let mut summary = RecordSummary::default();
        for capture in captures {
            let observation = self.observe(capture)?;
            summary.count(&observation);
        }
        Ok(summary)
    }

    fn skip_reason(&self, capture: &Capture, method: &str, url: &str) -> Option<SkipReason> {
        if method == "OPTIONS" {
            return Some(SkipReason::Preflight);
        }
        if self.ignore.is_ignored(url, self.origin.as_ref()) {
            return Some(SkipReason::IgnoredPath);
        }
        if self.require_json_content_type
            && !capture
                .content_type
                .as_deref()
                .is_some_and(is_json_content_type)
        {
            return Some(SkipReason::NotJson);
        }
        if capture.response_body.trim().is_empty() {
            return Some(SkipReason::EmptyBody);
        }
        None
    }

    fn key_lock(&self, key: &str) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.key_locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(Arc::clone(locks.entry(key.to_string()).or_default()))
    }

    /// Drop a key's lock, removing the map entry once nobody else holds or
    /// waits on it. Clones are only handed out under the map lock, so the
    /// count can't grow while it is checked.
    fn release_key_lock(&self, key: &str, lock: Arc<Mutex<()>>) -> Result<(), StoreError> {
        let mut locks = self.key_locks.lock().map_err(|_| StoreError::Poisoned)?;
        drop(lock);
        if locks
            .get(key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(key);
        }
        Ok(())
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.key_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
