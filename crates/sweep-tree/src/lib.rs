//! Sweep Tree
//!
//! Hierarchical naming engine for parameter-study trajectories.
//!
//! # Core Concepts
//!
//! - [`NodePath`]: dot-path addressing with wildcard-aware validation
//! - [`NamedTree`]: unique-path namespace with incremental short-name and
//!   subtree indexes
//! - [`Node`]: groups, parameters, results and links
//! - [`WildcardTable`]: symbolic segment substitution against a run index
//! - [`AmbiguityPolicy`]: explicit tie-break rule for short-name lookups
//!
//! # Example
//!
//! ```rust,ignore
//! use sweep_tree::{AmbiguityPolicy, NamedTree, Node, NodePath, ParameterNode, Value};
//!
//! let mut tree = NamedTree::new();
//! let path: NodePath = "parameters.osc.omega".parse()?;
//! tree.insert(Node::Parameter(ParameterNode::new(path, Value::from(0.5))))?;
//!
//! // short names resolve as long as they stay unique
//! let node = tree.resolve("omega", AmbiguityPolicy::Error)?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod error;
mod node;
mod path;
mod tree;
mod value;
mod wildcard;

pub use error::{LockedError, TreeError};
pub use node::{GroupNode, LinkNode, Node, NodeMeta, ParameterNode, ResultNode};
pub use path::{is_wildcard_segment, NodePath, PathError};
pub use tree::{AmbiguityPolicy, NamedTree};
pub use value::{Value, ValueKind};
pub use wildcard::{
    parse_run_name, run_name, set_name, WildcardKind, WildcardTable, NEUTRAL_RUN_NAME,
    NEUTRAL_SET_NAME, RUNS_PER_SET,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
