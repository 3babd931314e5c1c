//! Endpoint identity and capture filtering.
//!
//! Repeated calls to one logical resource are grouped under a canonical key
//! built from origin, path and method. Query strings and fragments are
//! discarded so `/users?page=2` accumulates into the same record as `/users`.

use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use url::Url;

use crate::error::ConfigError;

/// Path patterns for framework and static endpoints that return JSON but
/// are not API traffic (build assets, locale bundles, service workers).
pub const DEFAULT_IGNORED_PATTERNS: &[&str] = &[
    r"(?i)(^|/)assets(/|$)",
    r"(?i)(^|/)static(/|$)",
    r"(?i)(^|/)i18n(/|$)",
    r"(?i)(^|/)locales?(/|$)",
    r"(?i)(^|/)translations?(/|$)",
    r"(?i)(^|/)_next(/|$)",
    r"(?i)(^|/)\.(?:next|vite)(/|$)",
    r"(?i)(^|/)webpack(/|$)",
    r"(?i)(^|/)sockjs-node(/|$)",
    r"(?i)(^|/)ngsw(/|\.|$)",
    r"(?i)(^|/)service-worker(/|\.|$)",
    r"(?i)(^|/)manifest\.json$",
    r"(?i)(^|/)asset-manifest\.json$",
];

/// Canonical endpoint key: `origin + pathname + "::" + METHOD`.
///
/// If `url` does not parse, the raw string is used in place of
/// origin and path.
pub fn canonical_key(url: &str, method: &str) -> String {
    canonical_key_with_base(url, method, None)
}

/// Like [`canonical_key`], resolving relative URLs against `base` first.
pub fn canonical_key_with_base(url: &str, method: &str, base: Option<&Url>) -> String {
    let method = normalize_method(method);
    match parse_url(url, base) {
        Ok(parsed) => format!(
            "{}{}::{}",
            parsed.origin().ascii_serialization(),
            parsed.path(),
            method
        ),
        Err(_) => format!("{}::{}", url, method),
    }
}

/// Uppercase an HTTP method; blank defaults to `GET`.
pub fn normalize_method(method: &str) -> String {
    let method = method.trim();
    if method.is_empty() {
        "GET".to_string()
    } else {
        method.to_uppercase()
    }
}

/// Resolve `url` against the recording origin, or return it unchanged when
/// it does not parse.
pub fn to_absolute_url(url: &str, base: Option<&Url>) -> String {
    parse_url(url, base)
        .map(String::from)
        .unwrap_or_else(|_| url.to_string())
}

/// True for `application/json` and `application/*+json` content types.
pub fn is_json_content_type(content_type: &str) -> bool {
    static JSON_CONTENT_TYPE: OnceLock<Option<Regex>> = OnceLock::new();
    JSON_CONTENT_TYPE
        .get_or_init(|| Regex::new(r"(?i)^\s*application/(?:json|[a-z0-9.+-]*\+json)\b").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(content_type))
}

fn parse_url(url: &str, base: Option<&Url>) -> Result<Url, url::ParseError> {
    Url::options().base_url(base).parse(url)
}

/// Compiled path patterns for endpoints that should not be recorded.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: RegexSet,
}

impl IgnoreRules {
    /// Compile a list of patterns.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` naming the first bad pattern.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect();

        for pattern in &patterns {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        let patterns =
            RegexSet::new(&patterns).map_err(|source| ConfigError::InvalidPattern {
                pattern: patterns.join(" | "),
                source,
            })?;
        Ok(Self { patterns })
    }

    /// The built-in rules from [`DEFAULT_IGNORED_PATTERNS`].
    ///
    /// # Errors
    ///
    /// Only fails if the built-in patterns fail to compile.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::new(DEFAULT_IGNORED_PATTERNS)
    }

    /// Rules that ignore nothing.
    pub fn none() -> Self {
        Self {
            patterns: RegexSet::empty(),
        }
    }

    /// True when the URL's path matches any rule. URLs that do not parse are
    /// matched as raw strings.
    pub fn is_ignored(&self, url: &str, base: Option<&Url>) -> bool {
        match parse_url(url, base) {
            Ok(parsed) => self.patterns.is_match(parsed.path()),
            Err(_) => self.patterns.is_match(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Canonical Key ===

    #[test]
    fn canonical_key_drops_query_and_fragment() {
        assert_eq!(
            canonical_key("https://api.example.com/users?page=2#top", "get"),
            "https://api.example.com/users::GET"
        );
        assert_eq!(
            canonical_key("https://api.example.com/users", "GET"),
            canonical_key("https://api.example.com/users?page=3", "get")
        );
    }

    #[test]
    fn canonical_key_normalizes_origin() {
        assert_eq!(
            canonical_key("HTTPS://API.Example.com:443/v1/items", "post"),
            "https://api.example.com/v1/items::POST"
        );
        assert_eq!(
            canonical_key("http://localhost:8080/v1/items", "post"),
            "http://localhost:8080/v1/items::POST"
        );
    }

    #[test]
    fn canonical_key_separates_methods() {
        assert_ne!(
            canonical_key("https://a.test/x", "GET"),
            canonical_key("https://a.test/x", "POST")
        );
    }

    #[test]
    fn canonical_key_fallback_on_parse_failure() {
        assert_eq!(canonical_key("/relative/path?q=1", "put"), "/relative/path?q=1::PUT");
        assert_eq!(canonical_key("not a url", ""), "not a url::GET");
    }

    #[test]
    fn canonical_key_with_base_resolves_relative() {
        let base = Url::parse("https://app.example.com/dashboard").unwrap();
        assert_eq!(
            canonical_key_with_base("/api/me?x=1", "get", Some(&base)),
            "https://app.example.com/api/me::GET"
        );
    }

    #[test]
    fn to_absolute_url_resolves_or_passes_through() {
        let base = Url::parse("https://app.example.com/").unwrap();
        assert_eq!(
            to_absolute_url("/api/me", Some(&base)),
            "https://app.example.com/api/me"
        );
        assert_eq!(to_absolute_url("/api/me", None), "/api/me");
    }

    // === Content Type ===

    #[test]
    fn json_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("Application/JSON"));
        assert!(is_json_content_type("application/vnd.api+json"));
        assert!(is_json_content_type("application/problem+json"));
    }

    #[test]
    fn non_json_content_types() {
        assert!(!is_json_content_type(""));
        assert!(!is_json_content_type("text/html"));
        assert!(!is_json_content_type("text/json"));
        assert!(!is_json_content_type("application/javascript"));
        assert!(!is_json_content_type("application/jsonp"));
    }

    // === Ignore Rules ===

    #[test]
    fn default_rules_compile() {
        assert!(IgnoreRules::defaults().is_ok());
    }

    #[test]
    fn default_rules_skip_static_endpoints() {
        let rules = IgnoreRules::defaults().unwrap();
        for url in [
            "https://a.test/assets/config.json",
            "https://a.test/static/data.json",
            "https://a.test/_next/data/build/index.json",
            "https://a.test/locales/en/common.json",
            "https://a.test/i18n/fr.json",
            "https://a.test/manifest.json",
            "https://a.test/ngsw.json",
            "https://a.test/service-worker.js",
        ] {
            assert!(rules.is_ignored(url, None), "{url} should be ignored");
        }
    }

    #[test]
    fn default_rules_keep_api_endpoints() {
        let rules = IgnoreRules::defaults().unwrap();
        for url in [
            "https://a.test/api/users",
            "https://a.test/api/assetsummary",
            "https://a.test/v1/statistics?static=1",
        ] {
            assert!(!rules.is_ignored(url, None), "{url} should be kept");
        }
    }

    #[test]
    fn rules_match_raw_string_when_unparseable() {
        let rules = IgnoreRules::defaults().unwrap();
        assert!(rules.is_ignored("static/thing.json", None));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = IgnoreRules::new(["ok", "(unclosed"]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"
        ));
    }

    #[test]
    fn none_ignores_nothing() {
        assert!(!IgnoreRules::none().is_ignored("https://a.test/assets/x", None));
    }
}
