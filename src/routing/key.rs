//! Normalized route keys.
//!
//! # Responsibilities
//! - Build the registry key for a plugin-relative URL pattern
//! - Normalize incoming request paths the same way
//! - Expose the wildcard-truncated "search key" used by fallback matching
//!
//! # Design Decisions
//! - Keys are lowercase: two registrations differing only by case collide
//! - The plugin id is concatenated verbatim with the pattern (`foo` + `/bar.jsp`)
//! - Only the first `/*` marker is significant for truncation

use std::borrow::Borrow;
use std::fmt;

use crate::plugins::PluginId;

/// Marker that turns a pattern into a prefix pattern.
pub const WILDCARD_SUFFIX: &str = "/*";

/// A case-insensitive key identifying a registered handler URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey(String);

impl RouteKey {
    /// Key for a pattern declared by a plugin, `lowercase(plugin + pattern)`.
    pub fn new(plugin: &PluginId, pattern: &str) -> Self {
        Self(format!("{}{}", plugin.as_str(), pattern).to_lowercase())
    }

    /// Key for an incoming request path (routing prefix already stripped).
    pub fn from_request_path(path: &str) -> Self {
        Self(path.trim_start_matches('/').to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key truncated at the first wildcard marker, or the key itself.
    pub fn search_key(&self) -> &str {
        match self.0.find(WILDCARD_SUFFIX) {
            Some(index) => &self.0[..index],
            None => &self.0,
        }
    }

    /// Symmetric prefix compatibility used by the fallback scan.
    ///
    /// Matches when the search key is a prefix of `path`, or `path` is a
    /// prefix of the search key.
    pub fn is_compatible_with(&self, path: &RouteKey) -> bool {
        let search = self.search_key();
        path.0.starts_with(search) || search.starts_with(path.0.as_str())
    }

    /// Filter-style matching: `x/*` covers `x` and everything below it,
    /// anything else must match exactly.
    pub fn covers(&self, path: &RouteKey) -> bool {
        match self.0.strip_suffix(WILDCARD_SUFFIX) {
            Some(base) => {
                path.0 == base
                    || path
                        .0
                        .strip_prefix(base)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            None => self.0 == path.0,
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RouteKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(plugin: &str, pattern: &str) -> RouteKey {
        RouteKey::new(&PluginId::new(plugin), pattern)
    }

    #[test]
    fn test_key_is_lowercase_concatenation() {
        assert_eq!(key("Foo", "/Bar.jsp").as_str(), "foo/bar.jsp");
        assert_eq!(key("foo", "/bar.jsp"), key("FOO", "/BAR.JSP"));
    }

    #[test]
    fn test_request_path_normalization() {
        assert_eq!(RouteKey::from_request_path("/foo/BAR.JSP").as_str(), "foo/bar.jsp");
        assert_eq!(RouteKey::from_request_path("foo/x").as_str(), "foo/x");
    }

    #[test]
    fn test_search_key_truncates_at_first_wildcard() {
        assert_eq!(key("foo", "/admin/*").search_key(), "foo/admin");
        assert_eq!(key("foo", "/a/*/b/*").search_key(), "foo/a");
        assert_eq!(key("foo", "/page.jsp").search_key(), "foo/page.jsp");
    }

    #[test]
    fn test_symmetric_compatibility() {
        let admin = key("foo", "/admin/*");
        assert!(admin.is_compatible_with(&RouteKey::from_request_path("foo/admin/settings")));
        // shallower request, deeper route
        assert!(admin.is_compatible_with(&RouteKey::from_request_path("foo/adm")));
        assert!(!admin.is_compatible_with(&RouteKey::from_request_path("foo/images/x.png")));
    }

    #[test]
    fn test_filter_coverage() {
        let all = key("foo", "/*");
        assert!(all.covers(&RouteKey::from_request_path("foo/anything.jsp")));
        assert!(all.covers(&RouteKey::from_request_path("foo")));
        assert!(!all.covers(&RouteKey::from_request_path("foobar/x")));

        let exact = key("foo", "/login.jsp");
        assert!(exact.covers(&RouteKey::from_request_path("FOO/Login.jsp")));
        assert!(!exact.covers(&RouteKey::from_request_path("foo/login.jsp/x")));
    }
}
