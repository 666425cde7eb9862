//! The named tree and its resolver
//!
//! [`NamedTree`] keys every node by its unique dot-path and keeps three
//! incremental indexes next to the node map: an ordered child set per
//! group, a radix trie over full names for subtree enumeration, and a
//! last-segment index for short-name lookup. Resolution never scans the
//! whole tree for the common cases.

use crate::error::TreeError;
use crate::node::{GroupNode, LinkNode, Node};
use crate::path::NodePath;
use indexmap::IndexSet;
use radix_trie::{Trie, TrieCommon};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

/// Tie-break rule when a short name matches several nodes
///
/// The default raises [`TreeError::AmbiguousNode`]; `LastAdded` picks the
/// most recently inserted candidate. A silent arbitrary pick is never an
/// option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Raise [`TreeError::AmbiguousNode`] listing every candidate
    #[default]
    Error,
    /// Resolve to the candidate with the highest insertion sequence
    LastAdded,
}

/// Hierarchical namespace with unique full names
#[derive(Debug)]
pub struct NamedTree {
    /// full name → node
    nodes: HashMap<String, Node>,

    /// parent full name ("" = root) → ordered child segment names
    children: HashMap<String, IndexSet<String>>,

    /// last path segment → full names carrying it
    short_names: HashMap<String, BTreeSet<String>>,

    /// all full names, for prefix/subtree enumeration
    trie: Trie<String, ()>,

    next_seq: u64,
}

impl Default for NamedTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for NamedTree {
    fn clone(&self) -> Self {
        let mut trie = Trie::new();
        for name in self.nodes.keys() {
            trie.insert(name.clone(), ());
        }
        Self {
            nodes: self.nodes.clone(),
            children: self.children.clone(),
            short_names: self.short_names.clone(),
            trie,
            next_seq: self.next_seq,
        }
    }
}

impl NamedTree {
    /// Create an empty tree
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            children: HashMap::new(),
            short_names: HashMap::new(),
            trie: Trie::new(),
            next_seq: 0,
        }
    }

    /// Number of nodes (auto-created groups included)
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a full name is taken
    #[must_use]
    pub fn contains(&self, full_name: &str) -> bool {
        self.nodes.contains_key(full_name)
    }

    /// Node by exact full name
    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<&Node> {
        self.nodes.get(full_name)
    }

    /// Node by exact full name, mutable
    pub fn get_mut(&mut self, full_name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(full_name)
    }

    /// Iterate all full names in unspecified order
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Ordered child segment names of a group ("" = root)
    pub fn children_of(&self, full_name: &str) -> impl Iterator<Item = &str> {
        self.children
            .get(full_name)
            .into_iter()
            .flat_map(|set| set.iter().map(|s| s.as_str()))
    }

    /// Insert a node at its full name
    ///
    /// Missing ancestors are auto-created as groups. Wildcard segments are
    /// rejected; translate first.
    ///
    /// # Errors
    /// [`TreeError::DuplicatePath`] if the name is taken,
    /// [`TreeError::NotAGroup`] if an ancestor is a leaf or link.
    pub fn insert(&mut self, node: Node) -> Result<(), TreeError> {
        let full = node.meta().full_name.clone();
        if full.is_empty() {
            return Err(TreeError::UnknownNode("<root>".to_string()));
        }
        if full.has_wildcards() {
            return Err(TreeError::WildcardContext {
                segment: full.to_string(),
                context: None,
            });
        }
        let full_str = full.to_string();
        if self.nodes.contains_key(&full_str) {
            return Err(TreeError::DuplicatePath(full_str));
        }

        // Validate the ancestor chain before touching any index.
        let mut missing: Vec<NodePath> = Vec::new();
        let mut cursor = full.parent();
        while let Some(ancestor) = cursor {
            if ancestor.is_empty() {
                break;
            }
            let key = ancestor.to_string();
            match self.nodes.get(&key) {
                Some(existing) if !existing.is_group() => {
                    return Err(TreeError::NotAGroup(key));
                }
                Some(_) => break,
                None => missing.push(ancestor.clone()),
            }
            cursor = ancestor.parent();
        }

        for ancestor in missing.into_iter().rev() {
            self.attach(Node::Group(GroupNode::new(ancestor)));
        }
        self.attach(node);
        Ok(())
    }

    /// Unconditionally wire a validated node into every index
    fn attach(&mut self, mut node: Node) {
        let full = node.meta().full_name.clone();
        let full_str = full.to_string();
        let parent_str = full.parent().map(|p| p.to_string()).unwrap_or_default();
        let name = node.meta().name.clone();

        node.meta_mut().seq = self.next_seq;
        self.next_seq += 1;

        self.children.entry(parent_str).or_default().insert(name.clone());
        self.short_names.entry(name).or_default().insert(full_str.clone());
        self.trie.insert(full_str.clone(), ());
        self.nodes.insert(full_str, node);
    }

    /// Full names of a node and all its descendants
    ///
    /// Returned in path order (parents before children).
    #[must_use]
    pub fn subtree_names(&self, full_name: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        if self.nodes.contains_key(full_name) {
            names.push(full_name.to_string());
        }
        // The trailing dot keeps "a.b" from matching "a.bc".
        let prefix = format!("{full_name}.");
        if let Some(subtrie) = self.trie.get_raw_descendant(&prefix) {
            names.extend(subtrie.keys().cloned());
        }
        names.sort();
        names
    }

    /// Remove a node and its descendants
    ///
    /// Returns the removed full names.
    ///
    /// # Errors
    /// [`TreeError::UnknownNode`] if the name is absent.
    pub fn remove(&mut self, full_name: &str) -> Result<Vec<String>, TreeError> {
        if !self.nodes.contains_key(full_name) {
            return Err(TreeError::UnknownNode(full_name.to_string()));
        }
        let names = self.subtree_names(full_name);
        for name in &names {
            self.detach(name);
        }
        Ok(names)
    }

    fn detach(&mut self, full_name: &str) {
        if let Some(node) = self.nodes.remove(full_name) {
            let meta = node.meta();
            let parent_str = meta
                .full_name
                .parent()
                .map(|p| p.to_string())
                .unwrap_or_default();
            if let Some(set) = self.children.get_mut(&parent_str) {
                set.shift_remove(meta.name.as_str());
            }
            if let Some(set) = self.short_names.get_mut(meta.name.as_str()) {
                set.remove(full_name);
                if set.is_empty() {
                    self.short_names.remove(meta.name.as_str());
                }
            }
            self.trie.remove(full_name);
            self.children.remove(full_name);
        }
    }

    /// Atomically rename a node, rewriting every descendant full name
    ///
    /// Links pointing into the renamed subtree are retargeted so they keep
    /// resolving.
    ///
    /// # Errors
    /// Fails without mutation when `old` is absent or any rewritten name
    /// collides with an existing node.
    pub fn rename(&mut self, old: &str, new: &NodePath) -> Result<(), TreeError> {
        if !self.nodes.contains_key(old) {
            return Err(TreeError::UnknownNode(old.to_string()));
        }
        if new.has_wildcards() {
            return Err(TreeError::WildcardContext {
                segment: new.to_string(),
                context: None,
            });
        }
        let old_path = NodePath::from_str(old)?;
        let new_str = new.to_string();
        if old_path == *new {
            return Ok(());
        }

        let moved = self.subtree_names(old);
        let moved_set: HashSet<&String> = moved.iter().collect();
        let mut moves: Vec<(String, String)> = Vec::with_capacity(moved.len());
        for name in &moved {
            let suffix = &name[old.len()..];
            let target = format!("{new_str}{suffix}");
            if self.nodes.contains_key(&target) && !moved_set.contains(&target) {
                return Err(TreeError::DuplicatePath(target));
            }
            moves.push((name.clone(), target));
        }

        // All destinations are free; apply.
        for (from, to) in &moves {
            let Some(mut node) = self.nodes.remove(from) else {
                continue;
            };
            self.trie.remove(from);
            let meta = node.meta();
            let parent_str = meta
                .full_name
                .parent()
                .map(|p| p.to_string())
                .unwrap_or_default();
            let short = meta.name.clone();
            if let Some(set) = self.children.get_mut(&parent_str) {
                set.shift_remove(short.as_str());
            }
            if let Some(set) = self.short_names.get_mut(&short) {
                set.remove(from);
                if set.is_empty() {
                    self.short_names.remove(&short);
                }
            }
            if let Some(set) = self.children.remove(from) {
                self.children.insert(to.clone(), set);
            }

            let to_path = NodePath::from_str(to)?;
            let meta = node.meta_mut();
            meta.name = to_path.last().unwrap_or_default().to_string();
            meta.full_name = to_path.clone();

            let new_parent = to_path.parent().map(|p| p.to_string()).unwrap_or_default();
            self.children
                .entry(new_parent)
                .or_default()
                .insert(meta.name.clone());
            self.short_names
                .entry(meta.name.clone())
                .or_default()
                .insert(to.clone());
            self.trie.insert(to.clone(), ());
            self.nodes.insert(to.clone(), node);
        }

        // Retarget links into the moved subtree.
        let retargets: Vec<(String, String)> = self
            .nodes
            .iter()
            .filter_map(|(name, node)| match node {
                Node::Link(link) => moves
                    .iter()
                    .find(|(from, _)| link.target == *from)
                    .map(|(_, to)| (name.clone(), to.clone())),
                _ => None,
            })
            .collect();
        for (name, to) in retargets {
            if let Some(Node::Link(link)) = self.nodes.get_mut(&name) {
                link.target = to;
            }
        }
        Ok(())
    }

    /// Create a link node aliasing `target_query`
    ///
    /// The target is resolved (links followed) before creation, and the
    /// resulting chain is checked against the new link's own path, so
    /// links stay acyclic by construction.
    ///
    /// # Errors
    /// Resolution errors for the target; [`TreeError::LinkCycle`] when the
    /// chain would reach the new link.
    pub fn add_link(
        &mut self,
        full_name: NodePath,
        target_query: &str,
        policy: AmbiguityPolicy,
    ) -> Result<(), TreeError> {
        let target = self.resolve_name(target_query, policy)?;
        let link_name = full_name.to_string();
        if target == link_name || NodePath::from_str(&target)?.is_ancestor_of(&full_name) {
            return Err(TreeError::LinkCycle(link_name));
        }
        self.insert(Node::Link(LinkNode::new(full_name, target)))
    }

    /// Resolve a query to a canonical full name
    ///
    /// Exact full names win; otherwise the trailing segments are matched
    /// through the short-name index. Links are followed transparently.
    ///
    /// # Errors
    /// [`TreeError::UnknownNode`] for zero candidates,
    /// [`TreeError::AmbiguousNode`] for several under the default policy.
    pub fn resolve_name(
        &self,
        query: &str,
        policy: AmbiguityPolicy,
    ) -> Result<String, TreeError> {
        if self.nodes.contains_key(query) {
            return self.follow_links(query);
        }

        let query_path = NodePath::from_str(query)?;
        let Some(last) = query_path.last() else {
            return Err(TreeError::UnknownNode(query.to_string()));
        };
        let Some(candidates) = self.short_names.get(last) else {
            return Err(TreeError::UnknownNode(query.to_string()));
        };

        let suffix = format!(".{query}");
        let matches: Vec<&String> = candidates
            .iter()
            .filter(|full| *full == query || full.ends_with(&suffix))
            .collect();

        let winner = match matches.len() {
            0 => return Err(TreeError::UnknownNode(query.to_string())),
            1 => matches[0],
            _ => match policy {
                AmbiguityPolicy::Error => {
                    return Err(TreeError::AmbiguousNode {
                        query: query.to_string(),
                        candidates: matches.iter().map(|s| (*s).clone()).collect(),
                    });
                }
                AmbiguityPolicy::LastAdded => {
                    let mut best = matches[0];
                    for candidate in &matches[1..] {
                        let seq = |full: &str| {
                            self.nodes.get(full).map_or(0, |n| n.meta().seq())
                        };
                        if seq(candidate) > seq(best) {
                            best = candidate;
                        }
                    }
                    best
                }
            },
        };
        self.follow_links(winner)
    }

    /// Resolve a query and return the node
    ///
    /// # Errors
    /// Same as [`Self::resolve_name`].
    pub fn resolve(&self, query: &str, policy: AmbiguityPolicy) -> Result<&Node, TreeError> {
        let name = self.resolve_name(query, policy)?;
        self.nodes
            .get(&name)
            .ok_or_else(|| TreeError::UnknownNode(name))
    }

    /// Follow link aliases to a concrete node
    fn follow_links(&self, start: &str) -> Result<String, TreeError> {
        let mut current = start.to_string();
        let mut visited: HashSet<String> = HashSet::new();
        loop {
            match self.nodes.get(&current) {
                Some(Node::Link(link)) => {
                    if !visited.insert(current.clone()) {
                        return Err(TreeError::LinkCycle(current));
                    }
                    current = link.target.clone();
                }
                Some(_) => return Ok(current),
                None => return Err(TreeError::BrokenLink(current)),
            }
        }
    }
}
