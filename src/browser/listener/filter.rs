//! Capture filter.
//!
//! Evaluated once, when a request is sent. Requests that do not match are
//! never tracked.

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::error::Result;

// ============================================================================
// UrlTarget
// ============================================================================

/// One URL condition; a request matches if any target matches.
#[derive(Debug, Clone)]
pub enum UrlTarget {
    /// URL contains this text.
    Substring(String),
    /// URL matches this pattern.
    Pattern(Regex),
}

impl UrlTarget {
    fn matches(&self, url: &str) -> bool {
        match self {
            Self::Substring(text) => url.contains(text.as_str()),
            Self::Pattern(regex) => regex.is_match(url),
        }
    }
}

// ============================================================================
// ListenOptions
// ============================================================================

/// What a [`Listener`](super::Listener) captures.
///
/// Empty sets mean "any".
#[derive(Debug, Clone)]
pub struct ListenOptions {
    /// URL conditions.
    pub targets: Vec<UrlTarget>,
    /// Upper-case HTTP methods.
    pub methods: FxHashSet<String>,
    /// Lower-case resource types.
    pub resource_types: FxHashSet<String>,
    /// Fetch response bodies when requests finish.
    pub fetch_body: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenOptions {
    /// Captures everything, with bodies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            methods: FxHashSet::default(),
            resource_types: FxHashSet::default(),
            fetch_body: true,
        }
    }

    /// Adds a URL substring condition.
    #[must_use]
    pub fn with_target(mut self, text: impl Into<String>) -> Self {
        self.targets.push(UrlTarget::Substring(text.into()));
        self
    }

    /// Adds a URL regex condition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Regex`](crate::Error::Regex) if the pattern is invalid.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.targets.push(UrlTarget::Pattern(Regex::new(pattern)?));
        Ok(self)
    }

    /// Restricts to an HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: &str) -> Self {
        self.methods.insert(method.to_ascii_uppercase());
        self
    }

    /// Restricts to a resource type (`xhr`, `fetch`, `document`, ...).
    #[must_use]
    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.resource_types
            .insert(resource_type.to_ascii_lowercase());
        self
    }

    /// Skips response body fetching.
    #[must_use]
    pub fn without_body(mut self) -> Self {
        self.fetch_body = false;
        self
    }

    /// Returns `true` if a request with these properties is captured.
    #[must_use]
    pub fn matches(&self, url: &str, method: &str, resource_type: &str) -> bool {
        let url_ok = self.targets.is_empty() || self.targets.iter().any(|t| t.matches(url));
        let method_ok =
            self.methods.is_empty() || self.methods.contains(&method.to_ascii_uppercase());
        let type_ok = self.resource_types.is_empty()
            || self
                .resource_types
                .contains(&resource_type.to_ascii_lowercase());

        url_ok && method_ok && type_ok
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matches_everything() {
        assert!(ListenOptions::new().matches("https://a.test/", "GET", "Document"));
    }

    #[test]
    fn test_substring_or_pattern() {
        let options = ListenOptions::new()
            .with_target("/api/")
            .with_pattern(r"\.json$")
            .expect("valid regex");

        assert!(options.matches("https://a.test/api/users", "GET", "XHR"));
        assert!(options.matches("https://a.test/data.json", "GET", "Fetch"));
        assert!(!options.matches("https://a.test/index.html", "GET", "Document"));
    }

    #[test]
    fn test_method_and_type_are_case_insensitive() {
        let options = ListenOptions::new()
            .with_method("post")
            .with_resource_type("XHR");

        assert!(options.matches("https://a.test/", "POST", "xhr"));
        assert!(!options.matches("https://a.test/", "GET", "XHR"));
        assert!(!options.matches("https://a.test/", "POST", "Document"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ListenOptions::new().with_pattern("(").is_err());
    }
}
