//! Locator string grammar.
//!
//! A locator is a short string compiled into either a structural (CSS) or a
//! path (XPath) query. Prefixes are tried in order; the first match wins.
//!
//! | Input | Kind | Query |
//! |-------|------|-------|
//! | `""` | css | `*` |
//! | `css:V` / `c:V` | css | `V` |
//! | `xpath:V` / `x:V` | xpath | `V` |
//! | `//…` / `(//…` | xpath | input |
//! | `text=V` | xpath | `//*[text()="V"]` |
//! | `text:V` | xpath | `//*/text()[contains(.,"V")]/..` |
//! | `text^V` | xpath | `//*/text()[starts-with(.,"V")]/..` |
//! | `text$V` | xpath | ends-with via `substring()` |
//! | `tag:V` / `t:V` | css | `V` |
//! | `@!a` | xpath | `//*[not(@a)]` |
//! | `@@a=1@b=2` | css | `[a="1"][b="2"]` |
//! | `@\|a=1@b=2` | xpath | `//*[@a="1" or @b="2"]` |
//! | `@a=v` | css | `[a="v"]` |
//! | `@a` | css | `[a]` |
//! | anything else | css | input |
//!
//! # Example
//!
//! ```
//! use cdp_pilot::{Locator, LocatorKind};
//!
//! let loc = Locator::parse("@@type=submit@name=go");
//! assert_eq!(loc.kind(), LocatorKind::Css);
//! assert_eq!(loc.value(), r#"[type="submit"][name="go"]"#);
//!
//! let loc = Locator::parse("text:Sign in");
//! assert_eq!(loc.value(), r#"//*/text()[contains(.,"Sign in")]/.."#);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// LocatorKind
// ============================================================================

/// Query language a locator compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    /// Structural selector, run with `DOM.querySelectorAll`.
    Css,
    /// Path query, run with `DOM.performSearch` or `document.evaluate`.
    XPath,
}

impl LocatorKind {
    /// Returns the short name (`css` / `xpath`).
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::XPath => "xpath",
        }
    }
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Locator
// ============================================================================

/// A compiled locator. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    kind: LocatorKind,
    value: String,
    raw: String,
}

impl Locator {
    /// Compiles a locator string. Never fails; unknown input is treated as CSS.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let (kind, value) = compile(raw);
        Self {
            kind,
            value,
            raw: raw.to_string(),
        }
    }

    /// Creates a CSS locator without going through the grammar.
    #[inline]
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        let value = selector.into();
        Self {
            kind: LocatorKind::Css,
            raw: format!("css:{value}"),
            value,
        }
    }

    /// Creates an XPath locator without going through the grammar.
    #[inline]
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        let value = expression.into();
        Self {
            kind: LocatorKind::XPath,
            raw: format!("xpath:{value}"),
            value,
        }
    }

    /// Returns the query language.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> LocatorKind {
        self.kind
    }

    /// Returns the compiled query.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the input string.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns `true` for CSS locators.
    #[inline]
    #[must_use]
    pub fn is_css(&self) -> bool {
        self.kind == LocatorKind::Css
    }

    /// Returns `true` for XPath locators.
    #[inline]
    #[must_use]
    pub fn is_xpath(&self) -> bool {
        self.kind == LocatorKind::XPath
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&String> for Locator {
    fn from(raw: &String) -> Self {
        Self::parse(raw)
    }
}

impl From<&Locator> for Locator {
    fn from(locator: &Locator) -> Self {
        locator.clone()
    }
}

// ============================================================================
// Grammar
// ============================================================================

fn compile(raw: &str) -> (LocatorKind, String) {
    use LocatorKind::{Css, XPath};

    if raw.is_empty() {
        return (Css, "*".to_string());
    }

    if let Some(rest) = strip_any(raw, &["css:", "c:"]) {
        return (Css, rest.to_string());
    }
    if let Some(rest) = strip_any(raw, &["xpath:", "x:"]) {
        return (XPath, rest.to_string());
    }
    if raw.starts_with("//") || raw.starts_with("(//") {
        return (XPath, raw.to_string());
    }

    if let Some(text) = raw.strip_prefix("text=") {
        return (XPath, format!("//*[text()={}]", xpath_literal(text)));
    }
    if let Some(text) = raw.strip_prefix("text:") {
        return (
            XPath,
            format!("//*/text()[contains(.,{})]/..", xpath_literal(text)),
        );
    }
    if let Some(text) = raw.strip_prefix("text^") {
        return (
            XPath,
            format!("//*/text()[starts-with(.,{})]/..", xpath_literal(text)),
        );
    }
    if let Some(text) = raw.strip_prefix("text$") {
        let lit = xpath_literal(text);
        return (
            XPath,
            format!("//*/text()[substring(., string-length(.) - string-length({lit}) + 1) = {lit}]/.."),
        );
    }

    if let Some(tag) = strip_any(raw, &["tag:", "t:"]) {
        return (Css, tag.to_string());
    }

    if let Some(attr) = raw.strip_prefix("@!") {
        return (XPath, format!("//*[not(@{attr})]"));
    }
    if let Some(rest) = raw.strip_prefix("@@") {
        let selector: String = segments(rest).map(css_attribute).collect();
        return (Css, if selector.is_empty() { "*".to_string() } else { selector });
    }
    if let Some(rest) = raw.strip_prefix("@|") {
        let terms: Vec<String> = segments(rest).map(xpath_attribute).collect();
        if terms.is_empty() {
            return (XPath, "//*".to_string());
        }
        return (XPath, format!("//*[{}]", terms.join(" or ")));
    }
    if let Some(rest) = raw.strip_prefix('@') {
        return (Css, css_attribute(rest));
    }

    (Css, raw.to_string())
}

fn strip_any<'a>(raw: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| raw.strip_prefix(prefix))
}

/// `a=1@b=2` → `["a=1", "b=2"]`, skipping empty segments.
fn segments(rest: &str) -> impl Iterator<Item = &str> {
    rest.split('@').filter(|s| !s.is_empty())
}

fn css_attribute(segment: &str) -> String {
    match segment.split_once('=') {
        Some((name, value)) => format!("[{name}=\"{}\"]", css_escape(value)),
        None => format!("[{segment}]"),
    }
}

fn xpath_attribute(segment: &str) -> String {
    match segment.split_once('=') {
        Some((name, value)) => format!("@{name}={}", xpath_literal(value)),
        None => format!("@{segment}"),
    }
}

/// Escapes a value for a double-quoted CSS string.
fn css_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Renders a string as an XPath literal.
///
/// XPath 1.0 has no escape inside string literals, so a value containing
/// `"` becomes `concat("a",'"',"b")`.
pub(crate) fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{value}\"");
    }

    let parts: Vec<String> = value.split('"').map(|part| format!("\"{part}\"")).collect();
    format!("concat({})", parts.join(",'\"',"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn compiled(raw: &str) -> (LocatorKind, String) {
        let loc = Locator::parse(raw);
        (loc.kind(), loc.value().to_string())
    }

    #[test]
    fn test_empty_matches_anything() {
        assert_eq!(compiled(""), (LocatorKind::Css, "*".to_string()));
    }

    #[test]
    fn test_explicit_prefixes() {
        assert_eq!(compiled("css:div > a"), (LocatorKind::Css, "div > a".to_string()));
        assert_eq!(compiled("c:.btn"), (LocatorKind::Css, ".btn".to_string()));
        assert_eq!(compiled("xpath://a[1]"), (LocatorKind::XPath, "//a[1]".to_string()));
        assert_eq!(compiled("x:.//span"), (LocatorKind::XPath, ".//span".to_string()));
    }

    #[test]
    fn test_bare_paths_are_xpath() {
        assert_eq!(compiled("//div"), (LocatorKind::XPath, "//div".to_string()));
        assert_eq!(compiled("(//li)[2]"), (LocatorKind::XPath, "(//li)[2]".to_string()));
    }

    #[test]
    fn test_text_variants() {
        assert_eq!(compiled("text=Login").1, r#"//*[text()="Login"]"#);
        assert_eq!(compiled("text:foo").1, r#"//*/text()[contains(.,"foo")]/.."#);
        assert_eq!(compiled("text^Sta").1, r#"//*/text()[starts-with(.,"Sta")]/.."#);
        assert_eq!(
            compiled("text$end").1,
            r#"//*/text()[substring(., string-length(.) - string-length("end") + 1) = "end"]/.."#
        );
        assert!(Locator::parse("text=x").is_xpath());
    }

    #[test]
    fn test_tag_prefix() {
        assert_eq!(compiled("tag:input"), (LocatorKind::Css, "input".to_string()));
        assert_eq!(compiled("t:a"), (LocatorKind::Css, "a".to_string()));
    }

    #[test]
    fn test_attribute_forms() {
        assert_eq!(compiled("@name=q"), (LocatorKind::Css, r#"[name="q"]"#.to_string()));
        assert_eq!(compiled("@disabled"), (LocatorKind::Css, "[disabled]".to_string()));
        assert_eq!(compiled("@!href"), (LocatorKind::XPath, "//*[not(@href)]".to_string()));
    }

    #[test]
    fn test_multi_attribute_and() {
        assert_eq!(
            compiled("@@a=1@b=2"),
            (LocatorKind::Css, r#"[a="1"][b="2"]"#.to_string())
        );
        assert_eq!(compiled("@@a=1@hidden").1, r#"[a="1"][hidden]"#);
    }

    #[test]
    fn test_multi_attribute_or() {
        assert_eq!(
            compiled("@|a=1@b=2"),
            (LocatorKind::XPath, r#"//*[@a="1" or @b="2"]"#.to_string())
        );
    }

    #[test]
    fn test_quote_uses_concat() {
        assert_eq!(
            compiled(r#"text=say "hi""#).1,
            r#"//*[text()=concat("say ",'"',"hi",'"',"")]"#
        );
    }

    #[test]
    fn test_css_value_escaping() {
        assert_eq!(compiled(r#"@title=a"b"#).1, r#"[title="a\"b"]"#);
    }

    #[test]
    fn test_unrecognized_is_css() {
        assert_eq!(compiled("#main .item"), (LocatorKind::Css, "#main .item".to_string()));
        assert_eq!(compiled("button"), (LocatorKind::Css, "button".to_string()));
    }

    #[test]
    fn test_raw_preserved() {
        let loc = Locator::parse("text:Next");
        assert_eq!(loc.raw(), "text:Next");
        assert_eq!(loc.to_string(), r#"xpath://*/text()[contains(.,"Next")]/.."#);
    }

    proptest! {
        #[test]
        fn prop_parse_is_deterministic(raw in ".*") {
            prop_assert_eq!(Locator::parse(&raw), Locator::parse(&raw));
        }

        #[test]
        fn prop_quote_free_text_is_plain_literal(text in "[^\"]*") {
            let loc = Locator::parse(&format!("text={text}"));
            prop_assert_eq!(loc.value(), format!("//*[text()=\"{text}\"]"));
        }

        #[test]
        fn prop_quoted_text_never_embeds_quote_in_literal(text in "[a-z]{0,4}\"[a-z\"]{0,4}") {
            let literal = xpath_literal(&text);
            prop_assert!(literal.starts_with("concat("));
            // Every double-quoted piece is quote-free.
            let body = &literal["concat(".len()..literal.len() - 1];
            for piece in body.split(",'\"',") {
                prop_assert!(piece.starts_with('"') && piece.ends_with('"'));
                prop_assert!(!piece[1..piece.len() - 1].contains('"'));
            }
        }

        #[test]
        fn prop_css_prefix_passes_through(rest in "[a-z#.\\[\\] >]{1,12}") {
            let loc = Locator::parse(&format!("css:{rest}"));
            prop_assert!(loc.is_css());
            prop_assert_eq!(loc.value(), rest.as_str());
        }
    }
}
