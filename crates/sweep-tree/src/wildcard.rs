//! Wildcard tokens and generated run names
//!
//! Path strings may carry symbolic segments that only gain meaning against
//! an active run index: `$`/`crun` name the active run, `$set`/`cset` name
//! its thousand-run bucket, and bare signed integers address runs by
//! (possibly negative) position. [`WildcardTable`] substitutes them before
//! tree resolution.

use crate::error::TreeError;
use crate::path::NodePath;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Runs per `run_set_XXXXX` bucket
pub const RUNS_PER_SET: usize = 1000;

/// Neutral run literal used when no run is active (index −1 semantics)
pub const NEUTRAL_RUN_NAME: &str = "run_ALL";

/// Neutral bucket literal used when no run is active
pub const NEUTRAL_SET_NAME: &str = "run_set_ALL";

static RUN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^run_(\d{8})$").expect("static pattern"));

/// Generated name for a run index, e.g. `run_00000042`
#[must_use]
pub fn run_name(idx: usize) -> String {
    format!("run_{idx:08}")
}

/// Generated bucket name for a run index, e.g. `run_set_00000`
#[must_use]
pub fn set_name(idx: usize) -> String {
    format!("run_set_{:05}", idx / RUNS_PER_SET)
}

/// Parse a generated run name back into its index
#[must_use]
pub fn parse_run_name(segment: &str) -> Option<usize> {
    RUN_NAME_RE
        .captures(segment)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// What a wildcard token resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WildcardKind {
    /// The active run's generated name
    ActiveRun,
    /// The active run's bucket name
    ActiveSet,
}

/// Token → resolver table owned by a trajectory
#[derive(Debug, Clone)]
pub struct WildcardTable {
    tokens: IndexMap<String, WildcardKind>,
}

impl Default for WildcardTable {
    fn default() -> Self {
        let mut tokens = IndexMap::new();
        tokens.insert("$".to_string(), WildcardKind::ActiveRun);
        tokens.insert("crun".to_string(), WildcardKind::ActiveRun);
        tokens.insert("$set".to_string(), WildcardKind::ActiveSet);
        tokens.insert("cset".to_string(), WildcardKind::ActiveSet);
        Self { tokens }
    }
}

impl WildcardTable {
    /// Table with the standard tokens registered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extra token
    pub fn register(&mut self, token: impl Into<String>, kind: WildcardKind) {
        self.tokens.insert(token.into(), kind);
    }

    /// Whether a segment is a registered token
    #[must_use]
    pub fn contains(&self, segment: &str) -> bool {
        self.tokens.contains_key(segment)
    }

    /// Substitute one segment against the active run index
    ///
    /// `ctx = None` means "no active run": run tokens resolve to the
    /// neutral literals, which exist for naming only. Relative integer
    /// segments need a run count and resolve even without an active run.
    ///
    /// # Errors
    /// [`TreeError::WildcardContext`] for out-of-range relative indices.
    pub fn translate_segment(
        &self,
        segment: &str,
        ctx: Option<usize>,
        run_count: usize,
    ) -> Result<String, TreeError> {
        if let Some(kind) = self.tokens.get(segment) {
            return Ok(match (kind, ctx) {
                (WildcardKind::ActiveRun, Some(i)) => run_name(i),
                (WildcardKind::ActiveRun, None) => NEUTRAL_RUN_NAME.to_string(),
                (WildcardKind::ActiveSet, Some(i)) => set_name(i),
                (WildcardKind::ActiveSet, None) => NEUTRAL_SET_NAME.to_string(),
            });
        }

        if let Ok(rel) = segment.parse::<i64>() {
            let idx = if rel < 0 {
                let back = rel.unsigned_abs() as usize;
                run_count.checked_sub(back)
            } else {
                let fwd = usize::try_from(rel).ok();
                fwd.filter(|i| *i < run_count)
            };
            return idx.map(run_name).ok_or_else(|| TreeError::WildcardContext {
                segment: segment.to_string(),
                context: ctx,
            });
        }

        Ok(segment.to_string())
    }

    /// Substitute every wildcard segment of a path
    ///
    /// # Errors
    /// Propagates [`TreeError::WildcardContext`] from segment translation.
    pub fn translate(
        &self,
        path: &NodePath,
        ctx: Option<usize>,
        run_count: usize,
    ) -> Result<NodePath, TreeError> {
        if !path.has_wildcards() {
            return Ok(path.clone());
        }
        let segments = path
            .iter()
            .map(|seg| self.translate_segment(seg, ctx, run_count))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NodePath::new(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn run_names_are_zero_padded() {
        assert_eq!(run_name(0), "run_00000000");
        assert_eq!(run_name(42), "run_00000042");
        assert_eq!(set_name(999), "run_set_00000");
        assert_eq!(set_name(1000), "run_set_00001");
    }

    #[test]
    fn parse_run_name_round_trip() {
        assert_eq!(parse_run_name(&run_name(7)), Some(7));
        assert_eq!(parse_run_name("run_ALL"), None);
        assert_eq!(parse_run_name("run_123"), None);
    }

    #[test]
    fn translate_active_run_tokens() {
        let table = WildcardTable::new();
        assert_eq!(
            table.translate_segment("$", Some(3), 10).unwrap(),
            "run_00000003"
        );
        assert_eq!(
            table.translate_segment("crun", Some(3), 10).unwrap(),
            "run_00000003"
        );
        assert_eq!(
            table.translate_segment("$set", Some(2500), 3000).unwrap(),
            "run_set_00002"
        );
    }

    #[test]
    fn translate_without_context_yields_neutral_literals() {
        let table = WildcardTable::new();
        assert_eq!(
            table.translate_segment("$", None, 0).unwrap(),
            NEUTRAL_RUN_NAME
        );
        assert_eq!(
            table.translate_segment("$set", None, 0).unwrap(),
            NEUTRAL_SET_NAME
        );
    }

    #[test]
    fn translate_relative_indices() {
        let table = WildcardTable::new();
        assert_eq!(
            table.translate_segment("-1", Some(0), 4).unwrap(),
            "run_00000003"
        );
        assert_eq!(
            table.translate_segment("2", None, 4).unwrap(),
            "run_00000002"
        );
        assert!(table.translate_segment("-5", None, 4).is_err());
        assert!(table.translate_segment("4", None, 4).is_err());
    }

    #[test]
    fn translate_path_substitutes_all_segments() {
        let table = WildcardTable::new();
        let path = NodePath::from_str("results.runs.$.z").unwrap();
        let translated = table.translate(&path, Some(2), 4).unwrap();
        assert_eq!(translated.to_string(), "results.runs.run_00000002.z");

        let plain = NodePath::from_str("parameters.x").unwrap();
        assert_eq!(table.translate(&plain, Some(2), 4).unwrap(), plain);
    }

    #[test]
    fn custom_token_registration() {
        let mut table = WildcardTable::new();
        table.register("here", WildcardKind::ActiveRun);
        assert!(table.contains("here"));
        assert_eq!(
            table.translate_segment("here", Some(1), 2).unwrap(),
            "run_00000001"
        );
    }
}
