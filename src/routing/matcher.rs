//! Path prefix matching.
//!
//! # Design Decisions
//! - Matching is case-sensitive and segment-aware: `/api/models` matches
//!   `/api/models` and `/api/models/7`, never `/api/modelsx`
//! - No regex to guarantee O(n) matching

/// Matches a gateway path prefix and rewrites it onto the upstream prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Trailing slashes are dropped so `/api/` and `/api` compile alike.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix == "/"
    }

    /// Remainder of `path` after the prefix, or `None` when it does not match.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_empty() {
            return path.starts_with('/').then_some(path);
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.strip(path).is_some()
    }
}

/// Joins an upstream prefix and a remainder without doubling slashes.
pub fn join_path(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), rest.is_empty() || rest == "/") {
        (true, true) => "/".to_string(),
        (true, false) => rest.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}{rest}"),
    }
}
