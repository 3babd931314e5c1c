//! Input loading from files, strings, HTTP URLs and capture feeds.
//!
//! Payloads and schemas are plain JSON documents. Capture feeds are JSON
//! Lines: one [`Capture`] object per line, blank lines ignored.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;
use crate::recorder::Capture;
use crate::types::SchemaNode;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, LoadError> {
    let content = read_file(path)?;
    load_json_str(&content)
}

/// Load a JSON document from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_json_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a JSON document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the response
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_json_url(url: &str) -> Result<Value, LoadError> {
    let network_error = |source| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network_error)?;

    client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.json())
        .map_err(network_error)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load from a URL or a file path, whichever `source` looks like.
///
/// # Errors
///
/// Returns `LoadError` if loading fails. Without the `remote` feature a URL
/// source is reported as `FileNotFound`.
pub fn load_json_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_json_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_json(Path::new(source))
    }
}

/// Load a schema document and parse it as a [`SchemaNode`].
///
/// Keywords outside the inferred vocabulary (`$schema`, `description`, ...)
/// are ignored.
///
/// # Errors
///
/// Returns `LoadError::InvalidSchema` if the document isn't a schema object.
pub fn load_schema_node(source: &str) -> Result<SchemaNode, LoadError> {
    let value = load_json_auto(source)?;
    if !value.is_object() {
        return Err(LoadError::InvalidSchema {
            message: format!("{source}: expected a JSON object"),
        });
    }
    serde_json::from_value(value).map_err(|e| LoadError::InvalidSchema {
        message: format!("{source}: {e}"),
    })
}

/// Load a JSON Lines capture feed from a file.
///
/// # Errors
///
/// Returns `LoadError::InvalidCapture` with the 1-based line number of the
/// first line that isn't a capture object.
pub fn load_captures(path: &Path) -> Result<Vec<Capture>, LoadError> {
    let content = read_file(path)?;
    parse_captures(&content)
}

/// Parse a JSON Lines capture feed.
///
/// # Errors
///
/// Returns `LoadError::InvalidCapture` for the first malformed line.
pub fn parse_captures(content: &str) -> Result<Vec<Capture>, LoadError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| LoadError::InvalidCapture {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

fn read_file(path: &Path) -> Result<String, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}
