//! Glob matching for actions, roles, and resource kinds
//!
//! Patterns are compiled to a closed-form matcher instead of a regex.
//! Supported forms: a literal, `*` (any non-empty string), a trailing
//! wildcard (`prefix:*`), and a leading wildcard (`*:suffix`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A compiled glob pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobPattern {
    /// `*`: matches any non-empty string
    Any,
    /// Exact match
    Literal(String),
    /// `stem*`: matches `stem` followed by at least one character
    Prefix(String),
    /// `*stem`: matches at least one character followed by `stem`
    Suffix(String),
}

impl GlobPattern {
    /// Compile a pattern string
    ///
    /// # Errors
    ///
    /// Returns a message when the pattern is empty, or when `*` appears
    /// anywhere other than as the whole pattern, its first character, or
    /// its last character.
    pub fn compile(pattern: &str) -> Result<Self, String> {
        if pattern.is_empty() {
            return Err("glob pattern cannot be empty".to_string());
        }

        let stars = pattern.matches('*').count();
        if stars == 0 {
            return Ok(GlobPattern::Literal(pattern.to_string()));
        }
        if stars > 1 {
            return Err(format!("glob pattern '{}' has more than one wildcard", pattern));
        }
        if pattern == "*" {
            return Ok(GlobPattern::Any);
        }
        if let Some(stem) = pattern.strip_suffix('*') {
            return Ok(GlobPattern::Prefix(stem.to_string()));
        }
        if let Some(stem) = pattern.strip_prefix('*') {
            return Ok(GlobPattern::Suffix(stem.to_string()));
        }

        Err(format!("glob pattern '{}' may only use '*' at the start or end", pattern))
    }

    /// Check whether a value matches this pattern
    ///
    /// The wildcard always stands for at least one character, so
    /// `admin:*` does not match `admin:` or `admin`.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            GlobPattern::Any => !value.is_empty(),
            GlobPattern::Literal(lit) => value == lit,
            GlobPattern::Prefix(stem) => value.len() > stem.len() && value.starts_with(stem.as_str()),
            GlobPattern::Suffix(stem) => value.len() > stem.len() && value.ends_with(stem.as_str()),
        }
    }

    /// Returns true when this pattern can only match a single value
    pub fn is_literal(&self) -> bool {
        matches!(self, GlobPattern::Literal(_))
    }

    /// The literal payload, if this pattern is a literal
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            GlobPattern::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobPattern::Any => write!(f, "*"),
            GlobPattern::Literal(lit) => write!(f, "{}", lit),
            GlobPattern::Prefix(stem) => write!(f, "{}*", stem),
            GlobPattern::Suffix(stem) => write!(f, "*{}", stem),
        }
    }
}

/// An ordered set of glob patterns, matched as a union
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobSet {
    patterns: Vec<GlobPattern>,
}

impl GlobSet {
    /// Compile a list of pattern strings
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, String> {
        let patterns = patterns
            .iter()
            .map(|p| GlobPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Check whether any pattern in the set matches the value
    pub fn matches(&self, value: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(value))
    }

    /// Check whether any pattern matches any of the given values
    pub fn matches_any<'a, I: IntoIterator<Item = &'a str>>(&self, values: I) -> bool {
        values.into_iter().any(|v| self.matches(v))
    }

    /// Returns true when the set has no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The compiled patterns in listing order
    pub fn patterns(&self) -> &[GlobPattern] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_matching() {
        let pattern = GlobPattern::compile("read").unwrap();
        assert!(pattern.matches("read"));
        assert!(!pattern.matches("reader"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn test_any_requires_non_empty() {
        let pattern = GlobPattern::compile("*").unwrap();
        assert!(pattern.matches("anything"));
        assert!(!pattern.matches(""));
    }

    #[test]
    fn test_prefix_wildcard() {
        let pattern = GlobPattern::compile("admin:*").unwrap();
        assert!(pattern.matches("admin:finance"));
        assert!(!pattern.matches("admin:"));
        assert!(!pattern.matches("admin"));
        assert!(!pattern.matches("user:finance"));
    }

    #[test]
    fn test_suffix_wildcard() {
        let pattern = GlobPattern::compile("*:viewer").unwrap();
        assert!(pattern.matches("team:viewer"));
        assert!(!pattern.matches(":viewer"));
        assert!(!pattern.matches("viewer"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(GlobPattern::compile("").is_err());
        assert!(GlobPattern::compile("a*b").is_err());
        assert!(GlobPattern::compile("*a*").is_err());
    }

    #[test]
    fn test_glob_set() {
        let set = GlobSet::compile(&["read", "write:*"]).unwrap();
        assert!(set.matches("read"));
        assert!(set.matches("write:draft"));
        assert!(!set.matches("delete"));
        assert!(set.matches_any(["delete", "read"]));
        assert!(!set.matches_any(["delete", "publish"]));
    }
}
