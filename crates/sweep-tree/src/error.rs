//! Error types for the tree layer

use crate::path::PathError;
use crate::value::ValueKind;

/// Errors raised by tree construction and resolution
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A node already exists at this full name
    #[error("duplicate path: {0}")]
    DuplicatePath(String),

    /// No node matches the query
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Several nodes share the queried short name
    #[error("ambiguous short name '{query}': candidates {candidates:?}")]
    AmbiguousNode {
        /// The query that matched more than one node
        query: String,
        /// All matching full names, sorted
        candidates: Vec<String>,
    },

    /// Path parsing/validation failure
    #[error(transparent)]
    Path(#[from] PathError),

    /// Write to a locked parameter
    #[error(transparent)]
    Locked(#[from] LockedError),

    /// A wildcard segment could not be translated in this context
    #[error("cannot translate wildcard segment '{segment}' at run index {context:?}")]
    WildcardContext {
        /// The offending segment
        segment: String,
        /// Active run index, if any
        context: Option<usize>,
    },

    /// Following links revisited a node
    #[error("link cycle through '{0}'")]
    LinkCycle(String),

    /// Link target missing
    #[error("link target not found: {0}")]
    BrokenLink(String),

    /// Tried to nest children under a leaf
    #[error("'{0}' is not a group")]
    NotAGroup(String),

    /// Expected a parameter node
    #[error("'{0}' is not a parameter")]
    NotAParameter(String),

    /// Expected a result node
    #[error("'{0}' is not a result")]
    NotAResult(String),

    /// Value kind disagrees with the node's established kind
    #[error("kind mismatch at '{path}': expected {expected}, got {actual}")]
    KindMismatch {
        /// Node full name
        path: String,
        /// Established kind
        expected: ValueKind,
        /// Offending kind
        actual: ValueKind,
    },
}

/// Write to a parameter that was read inside a run
///
/// A parameter write-locks on its first in-run read. Mutation stays
/// rejected until an explicit unlock outside run context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parameter '{0}' is locked after in-run read; unlock it outside run context first")]
pub struct LockedError(pub String);
