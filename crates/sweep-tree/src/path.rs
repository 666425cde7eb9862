//! Node paths for addressing within a trajectory tree
//!
//! Provides [`NodePath`] for hierarchical dot-path addressing of tree nodes.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Path within a trajectory tree
///
/// Hierarchical structure using string segments joined by `.`.
///
/// Segments are alphanumeric/underscore names, wildcard tokens (`$`,
/// `$set`, `crun`, `cset`) or signed integers standing for relative run
/// indices. Wildcard segments must be translated before the path is used
/// for insertion.
///
/// # Examples
/// - `["parameters", "osc", "omega"]` → `parameters.osc.omega`
/// - `["results", "runs", "$", "z"]` → `results.runs.$.z`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<String>);

/// Wildcard tokens accepted as path segments.
const WILDCARD_SEGMENTS: &[&str] = &["$", "$set", "crun", "cset"];

impl NodePath {
    /// Create new path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Create path from a single segment
    #[inline]
    #[must_use]
    pub fn single(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Empty path (root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if path is empty (root)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get parent path (if not root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Get last segment (if not root)
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_str())
    }

    /// Get first segment (if not root)
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(|s| s.as_str())
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Extend with multiple segments
    #[inline]
    #[must_use]
    pub fn extend(&self, segments: &[impl AsRef<str>]) -> Self {
        let mut new = self.clone();
        for seg in segments {
            new.0.push(seg.as_ref().to_string());
        }
        new
    }

    /// Prepend a segment, returning new path
    #[must_use]
    pub fn prefixed(&self, segment: impl Into<String>) -> Self {
        let mut segs = Vec::with_capacity(self.0.len() + 1);
        segs.push(segment.into());
        segs.extend(self.0.iter().cloned());
        Self(segs)
    }

    /// Check if this path is a prefix of another
    ///
    /// # Examples
    /// - `parameters.osc` is prefix of `parameters.osc.omega`
    /// - `parameters.osc` is NOT prefix of `parameters.other`
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0 == other.0[..self.0.len()]
    }

    /// Check if this path is an ancestor of another (strict prefix)
    #[inline]
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    /// Get relative path from ancestor
    ///
    /// # Errors
    /// Returns error if `self` is not a descendant of `ancestor`
    pub fn relative_to(&self, ancestor: &Self) -> Result<Self, PathError> {
        if !ancestor.is_prefix_of(self) {
            return Err(PathError::NotDescendant {
                path: self.to_string(),
                ancestor: ancestor.to_string(),
            });
        }
        Ok(Self(self.0[ancestor.0.len()..].to_vec()))
    }

    /// Check whether any segment is a wildcard token or relative index
    #[must_use]
    pub fn has_wildcards(&self) -> bool {
        self.0.iter().any(|s| is_wildcard_segment(s))
    }

    /// Iterator over segments from root to leaf
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    /// Join segments with custom separator
    #[inline]
    #[must_use]
    pub fn join(&self, separator: &str) -> String {
        self.0.join(separator)
    }
}

/// Check whether a segment is a wildcard token or a relative run index
#[must_use]
pub fn is_wildcard_segment(segment: &str) -> bool {
    WILDCARD_SEGMENTS.contains(&segment) || segment.parse::<i64>().is_ok()
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment);
    }
    if is_wildcard_segment(segment) {
        return Ok(());
    }
    if segment.contains(|c: char| !c.is_alphanumeric() && c != '_') {
        return Err(PathError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

impl Display for NodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for NodePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = s
            .split('.')
            .map(|seg| validate_segment(seg).map(|()| seg.to_string()))
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }
}

impl From<Vec<String>> for NodePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl From<&[String]> for NodePath {
    fn from(segments: &[String]) -> Self {
        Self(segments.to_vec())
    }
}

impl Default for NodePath {
    fn default() -> Self {
        Self::root()
    }
}

/// Errors related to node paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Empty segment in path
    #[error("path contains empty segment")]
    EmptySegment,

    /// Invalid segment characters
    #[error("invalid segment: {0} (must be alphanumeric, underscore or a wildcard token)")]
    InvalidSegment(String),

    /// Not a descendant path
    #[error("path '{path}' is not a descendant of '{ancestor}'")]
    NotDescendant { path: String, ancestor: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_new_and_segments() {
        let path = NodePath::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(path.segments(), &["a", "b"]);
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn path_parent_and_last() {
        let path: NodePath = "a.b.c".parse().unwrap();
        assert_eq!(path.parent().unwrap().to_string(), "a.b");
        assert_eq!(path.last(), Some("c"));
        assert_eq!(path.first(), Some("a"));
        assert!(NodePath::root().parent().is_none());
    }

    #[test]
    fn path_child_and_extend() {
        let base = NodePath::single("base");
        assert_eq!(base.child("x").to_string(), "base.x");
        assert_eq!(base.extend(&["a", "b"]).to_string(), "base.a.b");
    }

    #[test]
    fn path_prefixed() {
        let path: NodePath = "osc.omega".parse().unwrap();
        assert_eq!(path.prefixed("parameters").to_string(), "parameters.osc.omega");
    }

    #[test]
    fn path_is_prefix_of() {
        let a: NodePath = "a.b".parse().unwrap();
        let b: NodePath = "a.b.c".parse().unwrap();
        assert!(a.is_prefix_of(&b));
        assert!(a.is_ancestor_of(&b));
        assert!(!b.is_prefix_of(&a));
        assert!(!a.is_ancestor_of(&a.clone()));
    }

    #[test]
    fn path_relative_to() {
        let full: NodePath = "a.b.c.d".parse().unwrap();
        let ancestor: NodePath = "a.b".parse().unwrap();
        assert_eq!(full.relative_to(&ancestor).unwrap().to_string(), "c.d");

        let other: NodePath = "x.y".parse().unwrap();
        assert!(matches!(
            full.relative_to(&other),
            Err(PathError::NotDescendant { .. })
        ));
    }

    #[test]
    fn path_from_str_rejects_bad_segments() {
        assert!(matches!(
            "a..b".parse::<NodePath>(),
            Err(PathError::EmptySegment)
        ));
        assert!(matches!(
            "a.b-c".parse::<NodePath>(),
            Err(PathError::InvalidSegment(_))
        ));
    }

    #[test]
    fn path_accepts_wildcard_segments() {
        let path: NodePath = "results.runs.$.z".parse().unwrap();
        assert!(path.has_wildcards());

        let path: NodePath = "results.runs.$set.crun.z".parse().unwrap();
        assert!(path.has_wildcards());

        // relative run indices
        let path: NodePath = "results.runs.-1.z".parse().unwrap();
        assert!(path.has_wildcards());

        let plain: NodePath = "parameters.x".parse().unwrap();
        assert!(!plain.has_wildcards());
    }

    #[test]
    fn path_display_and_join() {
        let path: NodePath = "a.b".parse().unwrap();
        assert_eq!(path.to_string(), "a.b");
        assert_eq!(path.join("/"), "a/b");
    }

    #[test]
    fn path_empty_string_is_root() {
        let path: NodePath = "".parse().unwrap();
        assert!(path.is_empty());
    }
}
