//! Tree node kinds
//!
//! Four node kinds live in a trajectory tree:
//! - [`GroupNode`]: interior node owning ordered children
//! - [`ParameterNode`]: leaf with a default value and, once explored, one
//!   value per run; write-locked after its first in-run read
//! - [`ResultNode`]: leaf holding named sub-items, always writable
//! - [`LinkNode`]: non-owning alias to another node's full name

use crate::error::{LockedError, TreeError};
use crate::path::NodePath;
use crate::value::{Value, ValueKind};
use indexmap::IndexMap;

/// Metadata shared by every node kind
#[derive(Debug, Clone)]
pub struct NodeMeta {
    /// Short name (last path segment)
    pub name: String,
    /// Unique dot-path within the tree
    pub full_name: NodePath,
    /// Free-form comment
    pub comment: String,
    /// Free-form annotation map
    pub annotations: IndexMap<String, serde_json::Value>,
    /// Insertion sequence number, assigned by the tree.
    /// Drives the `LastAdded` ambiguity policy.
    pub(crate) seq: u64,
}

impl NodeMeta {
    /// Create metadata for a full name
    #[must_use]
    pub fn new(full_name: NodePath) -> Self {
        let name = full_name.last().unwrap_or_default().to_string();
        Self {
            name,
            full_name,
            comment: String::new(),
            annotations: IndexMap::new(),
            seq: 0,
        }
    }

    /// Attach a comment
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Insertion sequence number assigned at insert time
    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Interior node owning ordered children
#[derive(Debug, Clone)]
pub struct GroupNode {
    /// Node metadata
    pub meta: NodeMeta,
}

impl GroupNode {
    /// Create a group at a full name
    #[must_use]
    pub fn new(full_name: NodePath) -> Self {
        Self {
            meta: NodeMeta::new(full_name),
        }
    }
}

/// Leaf holding a default value plus an optional explored sequence
#[derive(Debug, Clone)]
pub struct ParameterNode {
    /// Node metadata
    pub meta: NodeMeta,
    default: Value,
    explored: Option<Vec<Value>>,
    locked: bool,
}

impl ParameterNode {
    /// Create a parameter with a default value
    #[must_use]
    pub fn new(full_name: NodePath, default: Value) -> Self {
        Self {
            meta: NodeMeta::new(full_name),
            default,
            explored: None,
            locked: false,
        }
    }

    /// Established value kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }

    /// Default value
    #[inline]
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Replace the default value
    ///
    /// # Errors
    /// [`LockedError`] if the parameter was read inside a run;
    /// `KindMismatch` if the kind changes on an explored parameter.
    pub fn set_default(&mut self, value: Value) -> Result<(), TreeError> {
        self.check_unlocked()?;
        if self.explored.is_some() && value.kind() != self.kind() {
            return Err(TreeError::KindMismatch {
                path: self.meta.full_name.to_string(),
                expected: self.kind(),
                actual: value.kind(),
            });
        }
        self.default = value;
        Ok(())
    }

    /// Value visible at a run index; the default when `idx` is `None`
    ///
    /// # Errors
    /// `UnknownNode` when an explored parameter has no value at `idx`.
    pub fn value_at(&self, idx: Option<usize>) -> Result<&Value, TreeError> {
        match (idx, &self.explored) {
            (Some(i), Some(values)) => values.get(i).ok_or_else(|| {
                TreeError::UnknownNode(format!(
                    "{}[{i}] (explored length {})",
                    self.meta.full_name,
                    values.len()
                ))
            }),
            _ => Ok(&self.default),
        }
    }

    /// Whether an exploration sequence is installed
    #[inline]
    #[must_use]
    pub fn is_explored(&self) -> bool {
        self.explored.is_some()
    }

    /// Explored sequence, if any
    #[inline]
    #[must_use]
    pub fn explored(&self) -> Option<&[Value]> {
        self.explored.as_deref()
    }

    /// Install the exploration sequence
    ///
    /// # Errors
    /// `KindMismatch` if any value disagrees with the default's kind.
    pub fn set_explored(&mut self, values: Vec<Value>) -> Result<(), TreeError> {
        self.check_kinds(&values)?;
        self.explored = Some(values);
        Ok(())
    }

    /// Append further explored values (expansion)
    ///
    /// # Errors
    /// `NotAParameter`-style misuse is caught by the caller; this checks
    /// only kind agreement and prior exploration.
    pub fn extend_explored(&mut self, values: Vec<Value>) -> Result<(), TreeError> {
        self.check_kinds(&values)?;
        match &mut self.explored {
            Some(existing) => {
                existing.extend(values);
                Ok(())
            }
            None => Err(TreeError::NotAParameter(format!(
                "{} was never explored",
                self.meta.full_name
            ))),
        }
    }

    fn check_kinds(&self, values: &[Value]) -> Result<(), TreeError> {
        let expected = self.kind();
        for v in values {
            if v.kind() != expected {
                return Err(TreeError::KindMismatch {
                    path: self.meta.full_name.to_string(),
                    expected,
                    actual: v.kind(),
                });
            }
        }
        Ok(())
    }

    /// Write-lock the parameter (first in-run read)
    #[inline]
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Clear the write lock (legal outside run context only; the caller
    /// enforces context)
    #[inline]
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Whether the parameter is write-locked
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Fail with [`LockedError`] when locked
    pub fn check_unlocked(&self) -> Result<(), LockedError> {
        if self.locked {
            Err(LockedError(self.meta.full_name.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Leaf holding arbitrary named sub-items, always writable
#[derive(Debug, Clone)]
pub struct ResultNode {
    /// Node metadata
    pub meta: NodeMeta,
    items: IndexMap<String, Value>,
}

impl ResultNode {
    /// Create an empty result node
    #[must_use]
    pub fn new(full_name: NodePath) -> Self {
        Self {
            meta: NodeMeta::new(full_name),
            items: IndexMap::new(),
        }
    }

    /// Create a result node with a single unnamed item
    ///
    /// The item is keyed by the node's own short name, matching the
    /// persisted leaf layout.
    #[must_use]
    pub fn with_value(full_name: NodePath, value: Value) -> Self {
        let mut node = Self::new(full_name);
        let key = node.meta.name.clone();
        node.items.insert(key, value);
        node
    }

    /// Insert or replace a named item
    pub fn set_item(&mut self, name: impl Into<String>, value: Value) {
        self.items.insert(name.into(), value);
    }

    /// Item accessor
    #[must_use]
    pub fn item(&self, name: &str) -> Option<&Value> {
        self.items.get(name)
    }

    /// The single item keyed by the node's short name, if present
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.items.get(self.meta.name.as_str())
    }

    /// All items in insertion order
    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the node has no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Non-owning alias to another node
#[derive(Debug, Clone)]
pub struct LinkNode {
    /// Node metadata
    pub meta: NodeMeta,
    /// Full name of the aliased node
    pub target: String,
}

impl LinkNode {
    /// Create a link aliasing `target`
    #[must_use]
    pub fn new(full_name: NodePath, target: impl Into<String>) -> Self {
        Self {
            meta: NodeMeta::new(full_name),
            target: target.into(),
        }
    }
}

/// A node in the trajectory tree
#[derive(Debug, Clone)]
pub enum Node {
    /// Interior group
    Group(GroupNode),
    /// Parameter leaf
    Parameter(ParameterNode),
    /// Result leaf
    Result(ResultNode),
    /// Alias
    Link(LinkNode),
}

impl Node {
    /// Shared metadata
    #[must_use]
    pub fn meta(&self) -> &NodeMeta {
        match self {
            Node::Group(n) => &n.meta,
            Node::Parameter(n) => &n.meta,
            Node::Result(n) => &n.meta,
            Node::Link(n) => &n.meta,
        }
    }

    /// Shared metadata, mutable
    pub fn meta_mut(&mut self) -> &mut NodeMeta {
        match self {
            Node::Group(n) => &mut n.meta,
            Node::Parameter(n) => &mut n.meta,
            Node::Result(n) => &mut n.meta,
            Node::Link(n) => &mut n.meta,
        }
    }

    /// Kind label for diagnostics
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Group(_) => "group",
            Node::Parameter(_) => "parameter",
            Node::Result(_) => "result",
            Node::Link(_) => "link",
        }
    }

    /// Whether children may nest under this node
    #[inline]
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, Node::Group(_))
    }

    /// Parameter view
    #[must_use]
    pub fn as_parameter(&self) -> Option<&ParameterNode> {
        match self {
            Node::Parameter(n) => Some(n),
            _ => None,
        }
    }

    /// Parameter view, mutable
    pub fn as_parameter_mut(&mut self) -> Option<&mut ParameterNode> {
        match self {
            Node::Parameter(n) => Some(n),
            _ => None,
        }
    }

    /// Result view
    #[must_use]
    pub fn as_result(&self) -> Option<&ResultNode> {
        match self {
            Node::Result(n) => Some(n),
            _ => None,
        }
    }

    /// Result view, mutable
    pub fn as_result_mut(&mut self) -> Option<&mut ResultNode> {
        match self {
            Node::Result(n) => Some(n),
            _ => None,
        }
    }
}
