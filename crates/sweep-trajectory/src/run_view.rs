//! Per-run projections
//!
//! A [`RunView`] is a cheap projection of a trajectory fixing one run
//! index: explored parameters read their i-th value, wildcards resolve
//! against i, and results written inside the run are scoped under that
//! run's namespace so concurrent runs never collide by full name. The
//! view owns its own tree snapshot and only a reference to the shared
//! storage adapter — never its own store handle.

use crate::error::TrajectoryError;
use crate::trajectory::{
    node_value_at, Trajectory, DERIVED_GROUP, RESULTS_GROUP, RUNS_SUBGROUP,
};
use crate::persist::{parameter_leaf, result_item_leaf};
use std::str::FromStr;
use std::sync::Arc;
use sweep_storage::{StorageBackend, StoreBatch, WriteMode};
use sweep_tree::{
    AmbiguityPolicy, NamedTree, Node, NodePath, ResultNode, Value, WildcardTable,
};

/// Projection of a trajectory onto one run
#[derive(Debug)]
pub struct RunView {
    idx: usize,
    run_name: String,
    run_count: usize,
    tree: NamedTree,
    wildcards: WildcardTable,
    policy: AmbiguityPolicy,
    backend: Arc<dyn StorageBackend>,
    pending: StoreBatch,
}

impl RunView {
    pub(crate) fn new(
        trajectory: &Trajectory,
        run_name: String,
        idx: usize,
        backend: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            idx,
            run_name,
            run_count: trajectory.run_count(),
            tree: trajectory.tree().clone(),
            wildcards: trajectory.wildcards().clone(),
            policy: trajectory.policy(),
            backend,
            pending: StoreBatch::new(),
        }
    }

    /// Run index this view is bound to
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.idx
    }

    /// Generated run name, `run_XXXXXXXX`
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.run_name
    }

    /// Staged operations not yet flushed
    #[must_use]
    pub fn pending_ops(&self) -> usize {
        self.pending.len()
    }

    fn translate(&self, path: &str) -> Result<NodePath, TrajectoryError> {
        let parsed = NodePath::from_str(path).map_err(sweep_tree::TreeError::from)?;
        Ok(self
            .wildcards
            .translate(&parsed, Some(self.idx), self.run_count)?)
    }

    /// Rescope a results/derived path under this run's namespace
    ///
    /// `results.z` becomes `results.runs.run_XXXXXXXX.z`; paths already
    /// under `runs` (explicit run names, `$set` buckets) pass through.
    fn rescope(&self, path: NodePath) -> NodePath {
        let segments = path.segments();
        let scoped_root = matches!(
            segments.first().map(String::as_str),
            Some(RESULTS_GROUP | DERIVED_GROUP)
        );
        if !scoped_root || segments.get(1).map(String::as_str) == Some(RUNS_SUBGROUP) {
            return path;
        }
        let mut rescoped: Vec<String> = Vec::with_capacity(segments.len() + 2);
        rescoped.push(segments[0].clone());
        rescoped.push(RUNS_SUBGROUP.to_string());
        rescoped.push(self.run_name.clone());
        rescoped.extend(segments[1..].iter().cloned());
        NodePath::new(rescoped)
    }

    /// Read a value as seen by this run
    ///
    /// Explored parameters yield their i-th value; the first read
    /// write-locks the parameter for the remainder of the run.
    ///
    /// # Errors
    /// Resolution failures; out-of-range exploration indices.
    pub fn get_value(&mut self, query: &str) -> Result<Value, TrajectoryError> {
        let translated = self.translate(query)?;
        let full = self.tree.resolve_name(&translated.to_string(), self.policy)?;
        let node = self
            .tree
            .get_mut(&full)
            .ok_or_else(|| sweep_tree::TreeError::UnknownNode(full.clone()))?;
        if let Node::Parameter(param) = node {
            let value = param.value_at(Some(self.idx))?.clone();
            param.lock();
            return Ok(value);
        }
        node_value_at(node, Some(self.idx))
    }

    /// Write a result into this run's namespace, auto-vivifying groups
    ///
    /// Unqualified paths land under `results.runs.<run name>`. Writing to
    /// a parameter updates its default and fails with a lock error once
    /// the parameter was read in this run.
    ///
    /// # Errors
    /// Lock violations; resolution failures.
    pub fn set(&mut self, query: &str, value: Value) -> Result<String, TrajectoryError> {
        let translated = self.translate(query)?;

        // parameters and already-run-scoped results update in place;
        // anything else rescopes so sibling runs never share a path
        if let Ok(full) = self
            .tree
            .resolve_name(&translated.to_string(), self.policy)
        {
            let in_run_scope = full
                .split('.')
                .any(|segment| segment == self.run_name);
            let node = self
                .tree
                .get_mut(&full)
                .ok_or_else(|| sweep_tree::TreeError::UnknownNode(full.clone()))?;
            match node {
                Node::Parameter(param) => {
                    param.set_default(value)?;
                    let leaf = parameter_leaf(param);
                    self.pending.write_leaf(full.clone(), leaf);
                    return Ok(full);
                }
                Node::Result(result) if in_run_scope => {
                    let key = result.meta.name.clone();
                    result.set_item(key.clone(), value.clone());
                    let (path, data) = result_item_leaf(result, &key, &value);
                    self.pending.write_leaf(path, data);
                    return Ok(full);
                }
                _ => {}
            }
        }

        let full = self.rescope(Self::qualify_results(translated));
        let name = full.to_string();

        // a second write through a different spelling updates in place
        if let Some(result) = self.tree.get_mut(&name).and_then(Node::as_result_mut) {
            let key = result.meta.name.clone();
            result.set_item(key.clone(), value.clone());
            let (path, data) = result_item_leaf(result, &key, &value);
            self.pending.write_leaf(path, data);
            return Ok(name);
        }

        if let Some(parent) = full.parent() {
            let mut chain = Vec::new();
            let mut cursor = Some(parent);
            while let Some(p) = cursor {
                if p.is_empty() || self.tree.contains(&p.to_string()) {
                    break;
                }
                chain.push(p.to_string());
                cursor = p.parent();
            }
            for group in chain.into_iter().rev() {
                self.pending.create_group(group);
            }
        }
        let node = ResultNode::with_value(full, value.clone());
        let key = node.meta.name.clone();
        let (path, data) = result_item_leaf(&node, &key, &value);
        self.tree.insert(Node::Result(node))?;
        self.pending.write_leaf(path, data);
        Ok(name)
    }

    fn qualify_results(path: NodePath) -> NodePath {
        match path.first() {
            Some(first)
                if [
                    crate::trajectory::PARAMETERS_GROUP,
                    DERIVED_GROUP,
                    RESULTS_GROUP,
                    crate::trajectory::CONFIG_GROUP,
                ]
                .contains(&first) =>
            {
                path
            }
            _ => path.prefixed(RESULTS_GROUP),
        }
    }

    /// Flush staged writes through the shared backend ("store now")
    ///
    /// Within one view, batches apply in call order; across views the
    /// adapter guarantees a single writer at a time.
    ///
    /// # Errors
    /// Storage contention escalated to fatal; transport failures.
    pub async fn store(&mut self) -> Result<(), TrajectoryError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        tracing::debug!(run = %self.run_name, ops = batch.len(), "storing run batch");
        self.backend.store(batch, WriteMode::Overwrite).await?;
        Ok(())
    }
}
