//! The trajectory: one complete hierarchical store for a parameter study
//!
//! Owns the tree, the run records, the explored-parameter set, the
//! wildcard table and a handle to the shared storage backend. Run-scoped
//! access goes through [`crate::RunView`]; the trajectory itself always
//! reads defaults (the active-index convenience is deliberately scoped to
//! run views, never process-wide).

use crate::builder::ExplorationPlan;
use crate::error::{ExplorationError, TrajectoryError};
use crate::persist::{
    apply_meta_attrs, link_leaf, parameter_leaf, result_item_leaf, ATTR_EXPLORED, ATTR_NODE_KIND,
    ATTR_OWNER,
};
use crate::run::RunInfo;
use crate::run_view::RunView;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use std::str::FromStr;
use std::sync::Arc;
use sweep_storage::{LeafData, LoadMode, StorageBackend, StoreBatch, WriteMode};
use sweep_tree::{
    AmbiguityPolicy, GroupNode, NamedTree, Node, NodePath, ParameterNode, ResultNode, Value,
    WildcardTable,
};

/// Top-level group for study parameters
pub const PARAMETERS_GROUP: &str = "parameters";
/// Top-level group for derived parameters
pub const DERIVED_GROUP: &str = "derived_parameters";
/// Top-level group for results
pub const RESULTS_GROUP: &str = "results";
/// Top-level group for configuration
pub const CONFIG_GROUP: &str = "config";

/// Subgroup collecting run-scoped data under results/derived_parameters
pub const RUNS_SUBGROUP: &str = "runs";

/// Bookkeeping subtree (name, run records); not user data
pub(crate) const META_PREFIX: &str = "config.trajectory";

const TOP_GROUPS: &[&str] = &[PARAMETERS_GROUP, DERIVED_GROUP, RESULTS_GROUP, CONFIG_GROUP];

/// One complete hierarchical store for a parameter study
#[derive(Debug)]
pub struct Trajectory {
    name: String,
    created: DateTime<Utc>,
    tree: NamedTree,
    runs: Vec<RunInfo>,
    explored: IndexSet<String>,
    wildcards: WildcardTable,
    backend: Arc<dyn StorageBackend>,
    policy: AmbiguityPolicy,
}

impl Trajectory {
    /// Fresh trajectory over a storage backend
    ///
    /// The four top-level groups exist from the start, matching the
    /// persisted layout.
    #[must_use]
    pub fn new(name: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        let mut tree = NamedTree::new();
        for group in TOP_GROUPS {
            // fresh tree, single-segment paths: cannot fail
            let _ = tree.insert(Node::Group(GroupNode::new(NodePath::single(*group))));
        }
        Self {
            name: name.into(),
            created: Utc::now(),
            tree,
            runs: Vec::new(),
            explored: IndexSet::new(),
            wildcards: WildcardTable::new(),
            backend,
            policy: AmbiguityPolicy::default(),
        }
    }

    /// Study name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time
    #[inline]
    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Shared storage backend handle
    #[must_use]
    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.backend)
    }

    /// Number of runs
    #[inline]
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Run records in index order
    #[inline]
    #[must_use]
    pub fn runs(&self) -> &[RunInfo] {
        &self.runs
    }

    /// One run record
    ///
    /// # Errors
    /// [`TrajectoryError::RunIndexOutOfRange`].
    pub fn run(&self, idx: usize) -> Result<&RunInfo, TrajectoryError> {
        self.runs
            .get(idx)
            .ok_or(TrajectoryError::RunIndexOutOfRange {
                idx,
                count: self.runs.len(),
            })
    }

    /// Full names of explored parameters, exploration order
    pub fn explored_names(&self) -> impl Iterator<Item = &str> {
        self.explored.iter().map(|s| s.as_str())
    }

    /// Tie-break rule for short-name resolution
    pub fn set_ambiguity_policy(&mut self, policy: AmbiguityPolicy) {
        self.policy = policy;
    }

    /// Wildcard table, for registering custom tokens
    pub fn wildcards_mut(&mut self) -> &mut WildcardTable {
        &mut self.wildcards
    }

    /// Direct tree access (read-only)
    #[must_use]
    pub fn tree(&self) -> &NamedTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut NamedTree {
        &mut self.tree
    }

    pub(crate) fn runs_mut(&mut self) -> &mut Vec<RunInfo> {
        &mut self.runs
    }

    pub(crate) fn explored_mut(&mut self) -> &mut IndexSet<String> {
        &mut self.explored
    }

    pub(crate) fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    pub(crate) fn wildcards(&self) -> &WildcardTable {
        &self.wildcards
    }

    /// Parse and wildcard-translate a path (no active run: `$` names the
    /// neutral literal)
    fn translate(&self, path: &str) -> Result<NodePath, TrajectoryError> {
        let parsed = NodePath::from_str(path).map_err(sweep_tree::TreeError::from)?;
        Ok(self.wildcards.translate(&parsed, None, self.runs.len())?)
    }

    fn qualify(path: NodePath, default_root: &str) -> NodePath {
        match path.first() {
            Some(first) if TOP_GROUPS.contains(&first) => path,
            _ => path.prefixed(default_root),
        }
    }

    /// Add a parameter with a default value; returns the full name
    ///
    /// Paths outside the four top groups land under `parameters`.
    ///
    /// # Errors
    /// Duplicate paths, leaf ancestors, wildcard misuse.
    pub fn add_parameter(
        &mut self,
        path: &str,
        default: Value,
    ) -> Result<String, TrajectoryError> {
        let full = Self::qualify(self.translate(path)?, PARAMETERS_GROUP);
        let name = full.to_string();
        self.tree
            .insert(Node::Parameter(ParameterNode::new(full, default)))?;
        Ok(name)
    }

    /// Add a derived parameter (computed from others, still lockable)
    ///
    /// # Errors
    /// Same as [`Self::add_parameter`].
    pub fn add_derived_parameter(
        &mut self,
        path: &str,
        default: Value,
    ) -> Result<String, TrajectoryError> {
        let full = Self::qualify(self.translate(path)?, DERIVED_GROUP);
        let name = full.to_string();
        self.tree
            .insert(Node::Parameter(ParameterNode::new(full, default)))?;
        Ok(name)
    }

    /// Add a config entry
    ///
    /// # Errors
    /// Same as [`Self::add_parameter`].
    pub fn add_config(&mut self, path: &str, value: Value) -> Result<String, TrajectoryError> {
        let full = Self::qualify(self.translate(path)?, CONFIG_GROUP);
        let name = full.to_string();
        self.tree
            .insert(Node::Parameter(ParameterNode::new(full, value)))?;
        Ok(name)
    }

    /// Add a result leaf
    ///
    /// # Errors
    /// Same as [`Self::add_parameter`].
    pub fn add_result(&mut self, path: &str, value: Value) -> Result<String, TrajectoryError> {
        let full = Self::qualify(self.translate(path)?, RESULTS_GROUP);
        let name = full.to_string();
        self.tree
            .insert(Node::Result(ResultNode::with_value(full, value)))?;
        Ok(name)
    }

    /// Add an empty group at an explicit path
    ///
    /// # Errors
    /// Same as [`Self::add_parameter`].
    pub fn add_group(&mut self, path: &str) -> Result<String, TrajectoryError> {
        let full = self.translate(path)?;
        let name = full.to_string();
        self.tree.insert(Node::Group(GroupNode::new(full)))?;
        Ok(name)
    }

    /// Add a link aliasing `target` (full or short name)
    ///
    /// # Errors
    /// Resolution failures for the target; cycle rejection.
    pub fn add_link(&mut self, path: &str, target: &str) -> Result<String, TrajectoryError> {
        let full = self.translate(path)?;
        let name = full.to_string();
        let target = self.translate(target)?;
        self.tree
            .add_link(full, &target.to_string(), self.policy)?;
        Ok(name)
    }

    /// Resolve a query to a node
    ///
    /// # Errors
    /// Unknown/ambiguous names per the active [`AmbiguityPolicy`].
    pub fn get(&self, query: &str) -> Result<&Node, TrajectoryError> {
        let translated = self.translate(query)?;
        Ok(self.tree.resolve(&translated.to_string(), self.policy)?)
    }

    /// Read the value visible outside any run (parameter defaults)
    ///
    /// # Errors
    /// Resolution failures; leaf-less nodes.
    pub fn get_value(&self, query: &str) -> Result<Value, TrajectoryError> {
        let node = self.get(query)?;
        node_value(node, None)
    }

    /// Write through the key-path accessor, auto-vivifying result leaves
    ///
    /// Existing parameters update their default (respecting locks);
    /// existing results update their item; missing paths create a result
    /// leaf (under `results` unless another top group is named).
    ///
    /// # Errors
    /// [`sweep_tree::LockedError`] through
    /// [`TrajectoryError::Locked`] for locked parameters.
    pub fn set(&mut self, query: &str, value: Value) -> Result<String, TrajectoryError> {
        let translated = self.translate(query)?;
        match self.tree.resolve_name(&translated.to_string(), self.policy) {
            Ok(full) => {
                let node = self
                    .tree
                    .get_mut(&full)
                    .ok_or_else(|| sweep_tree::TreeError::UnknownNode(full.clone()))?;
                match node {
                    Node::Parameter(param) => param.set_default(value)?,
                    Node::Result(result) => {
                        let key = result.meta.name.clone();
                        result.set_item(key, value);
                    }
                    other => {
                        return Err(TrajectoryError::Tree(
                            sweep_tree::TreeError::NotAResult(other.meta().full_name.to_string()),
                        ));
                    }
                }
                Ok(full)
            }
            Err(sweep_tree::TreeError::UnknownNode(_)) => {
                let full = Self::qualify(translated, RESULTS_GROUP);
                let name = full.to_string();
                self.tree
                    .insert(Node::Result(ResultNode::with_value(full, value)))?;
                Ok(name)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Clear a parameter's in-run write lock (legal here: the trajectory
    /// is outside any run context)
    ///
    /// # Errors
    /// Resolution failures; non-parameter targets.
    pub fn unlock(&mut self, query: &str) -> Result<(), TrajectoryError> {
        let full = {
            let translated = self.translate(query)?;
            self.tree.resolve_name(&translated.to_string(), self.policy)?
        };
        let node = self
            .tree
            .get_mut(&full)
            .ok_or_else(|| sweep_tree::TreeError::UnknownNode(full.clone()))?;
        match node {
            Node::Parameter(param) => {
                param.unlock();
                Ok(())
            }
            _ => Err(TrajectoryError::Tree(sweep_tree::TreeError::NotAParameter(
                full,
            ))),
        }
    }

    /// Attach a comment to a node
    ///
    /// # Errors
    /// Resolution failures.
    pub fn set_comment(&mut self, query: &str, comment: &str) -> Result<(), TrajectoryError> {
        let full = {
            let translated = self.translate(query)?;
            self.tree.resolve_name(&translated.to_string(), self.policy)?
        };
        if let Some(node) = self.tree.get_mut(&full) {
            node.meta_mut().comment = comment.to_string();
        }
        Ok(())
    }

    /// Attach an annotation to a node
    ///
    /// # Errors
    /// Resolution failures.
    pub fn annotate(
        &mut self,
        query: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), TrajectoryError> {
        let full = {
            let translated = self.translate(query)?;
            self.tree.resolve_name(&translated.to_string(), self.policy)?
        };
        if let Some(node) = self.tree.get_mut(&full) {
            node.meta_mut().annotations.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Remove a node and its descendants
    ///
    /// # Errors
    /// Resolution failures.
    pub fn remove(&mut self, query: &str) -> Result<Vec<String>, TrajectoryError> {
        let full = {
            let translated = self.translate(query)?;
            self.tree.resolve_name(&translated.to_string(), self.policy)?
        };
        let removed = self.tree.remove(&full)?;
        for name in &removed {
            self.explored.shift_remove(name);
        }
        Ok(removed)
    }

    /// Atomically rename a node, rewriting descendants
    ///
    /// # Errors
    /// Collision on any rewritten name fails without mutation.
    pub fn rename(&mut self, old_query: &str, new_path: &str) -> Result<(), TrajectoryError> {
        let old = {
            let translated = self.translate(old_query)?;
            self.tree.resolve_name(&translated.to_string(), self.policy)?
        };
        let new = self.translate(new_path)?;
        self.tree.rename(&old, &new)?;

        let renamed: Vec<String> = self
            .explored
            .iter()
            .filter(|name| {
                **name == old || name.starts_with(&format!("{old}."))
            })
            .cloned()
            .collect();
        for name in renamed {
            self.explored.shift_remove(&name);
            let suffix = &name[old.len()..];
            self.explored.insert(format!("{new}{suffix}"));
        }
        Ok(())
    }

    /// Install an exploration, creating one run per matrix row
    ///
    /// Must precede all runs. Validation is two-phase, so a failing plan
    /// leaves the trajectory untouched.
    ///
    /// # Errors
    /// [`ExplorationError::RunsExist`] after the first explore;
    /// [`ExplorationError::AlreadyExplored`] re-exploring a parameter;
    /// kind mismatches via the tree layer.
    pub fn explore(&mut self, plan: &ExplorationPlan) -> Result<(), TrajectoryError> {
        if !self.runs.is_empty() {
            return Err(ExplorationError::RunsExist(self.runs.len()).into());
        }
        if plan.names().next().is_none() || plan.is_empty() {
            return Err(ExplorationError::EmptyValues("<plan>".to_string()).into());
        }

        // validate everything before mutating anything
        let mut resolved: Vec<(String, &[Value])> = Vec::new();
        for (name, values) in plan.iter() {
            let full = {
                let translated = self.translate(name)?;
                self.tree.resolve_name(&translated.to_string(), self.policy)?
            };
            let Some(param) = self.tree.get(&full).and_then(Node::as_parameter) else {
                return Err(TrajectoryError::Tree(sweep_tree::TreeError::NotAParameter(
                    full,
                )));
            };
            if param.is_explored() || self.explored.contains(&full) {
                return Err(ExplorationError::AlreadyExplored(full).into());
            }
            for value in values {
                if value.kind() != param.kind() {
                    return Err(TrajectoryError::Tree(sweep_tree::TreeError::KindMismatch {
                        path: full,
                        expected: param.kind(),
                        actual: value.kind(),
                    }));
                }
            }
            resolved.push((full, values));
        }

        for (full, values) in resolved {
            if let Some(param) = self.tree.get_mut(&full).and_then(Node::as_parameter_mut) {
                param.set_explored(values.to_vec())?;
            }
            self.explored.insert(full);
        }
        for idx in 0..plan.len() {
            self.runs.push(RunInfo::new(idx));
        }
        tracing::info!(
            trajectory = %self.name,
            runs = plan.len(),
            parameters = self.explored.len(),
            "exploration installed"
        );
        Ok(())
    }

    /// Append further rows to an existing exploration
    ///
    /// The plan must cover exactly the explored parameter set.
    ///
    /// # Errors
    /// [`ExplorationError::NeverExplored`] without a prior explore;
    /// [`ExplorationError::KeySetMismatch`] for set drift; kind
    /// mismatches via the tree layer.
    pub fn expand(&mut self, plan: &ExplorationPlan) -> Result<(), TrajectoryError> {
        if self.runs.is_empty() || self.explored.is_empty() {
            return Err(ExplorationError::NeverExplored.into());
        }

        let mut resolved: Vec<(String, &[Value])> = Vec::new();
        let mut covered: IndexSet<String> = IndexSet::new();
        for (name, values) in plan.iter() {
            let full = {
                let translated = self.translate(name)?;
                self.tree.resolve_name(&translated.to_string(), self.policy)?
            };
            if !self.explored.contains(&full) {
                return Err(ExplorationError::KeySetMismatch(full).into());
            }
            let Some(param) = self.tree.get(&full).and_then(Node::as_parameter) else {
                return Err(TrajectoryError::Tree(sweep_tree::TreeError::NotAParameter(
                    full,
                )));
            };
            for value in values {
                if value.kind() != param.kind() {
                    return Err(TrajectoryError::Tree(sweep_tree::TreeError::KindMismatch {
                        path: full,
                        expected: param.kind(),
                        actual: value.kind(),
                    }));
                }
            }
            covered.insert(full.clone());
            resolved.push((full, values));
        }
        for name in &self.explored {
            if !covered.contains(name) {
                return Err(ExplorationError::KeySetMismatch(name.clone()).into());
            }
        }

        for (full, values) in resolved {
            if let Some(param) = self.tree.get_mut(&full).and_then(Node::as_parameter_mut) {
                param.extend_explored(values.to_vec())?;
            }
        }
        let offset = self.runs.len();
        for idx in 0..plan.len() {
            self.runs.push(RunInfo::new(offset + idx));
        }
        tracing::info!(
            trajectory = %self.name,
            appended = plan.len(),
            total = self.runs.len(),
            "exploration expanded"
        );
        Ok(())
    }

    /// Project the trajectory onto one run, sharing the study backend
    ///
    /// # Errors
    /// [`TrajectoryError::RunIndexOutOfRange`].
    pub fn make_run_view(&self, idx: usize) -> Result<RunView, TrajectoryError> {
        self.make_run_view_with(idx, Arc::clone(&self.backend))
    }

    /// Project onto one run through an explicit backend handle (piped
    /// topologies hand each worker its own endpoint)
    ///
    /// # Errors
    /// [`TrajectoryError::RunIndexOutOfRange`].
    pub fn make_run_view_with(
        &self,
        idx: usize,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<RunView, TrajectoryError> {
        let info = self.run(idx)?;
        Ok(RunView::new(self, info.name.clone(), idx, backend))
    }

    /// Record a completed run
    ///
    /// # Errors
    /// [`TrajectoryError::RunIndexOutOfRange`].
    pub fn mark_run_completed(
        &mut self,
        idx: usize,
        summary: impl Into<String>,
    ) -> Result<(), TrajectoryError> {
        let count = self.runs.len();
        self.runs
            .get_mut(idx)
            .ok_or(TrajectoryError::RunIndexOutOfRange { idx, count })?
            .complete(summary);
        Ok(())
    }

    /// Record a failed run (the failure aborts only that run)
    ///
    /// # Errors
    /// [`TrajectoryError::RunIndexOutOfRange`].
    pub fn mark_run_failed(
        &mut self,
        idx: usize,
        error: impl Into<String>,
    ) -> Result<(), TrajectoryError> {
        let count = self.runs.len();
        self.runs
            .get_mut(idx)
            .ok_or(TrajectoryError::RunIndexOutOfRange { idx, count })?
            .fail(error);
        Ok(())
    }

    // --- consolidation support (used by the merger) ---

    /// Insert a pre-built node at its full name
    ///
    /// # Errors
    /// Same as tree insertion.
    pub fn insert_node(&mut self, node: Node) -> Result<(), TrajectoryError> {
        Ok(self.tree.insert(node)?)
    }

    /// Remove a node by exact full name (no short-name resolution)
    ///
    /// # Errors
    /// Unknown names.
    pub fn remove_exact(&mut self, full_name: &str) -> Result<Vec<String>, TrajectoryError> {
        let removed = self.tree.remove(full_name)?;
        for name in &removed {
            self.explored.shift_remove(name);
        }
        Ok(removed)
    }

    /// Append a renumbered run record
    pub fn append_run_record(&mut self, info: RunInfo) {
        self.runs.push(info);
    }

    /// Explored sequence of one parameter
    ///
    /// # Errors
    /// Unknown or unexplored parameters.
    pub fn explored_values(&self, full_name: &str) -> Result<Vec<Value>, TrajectoryError> {
        let param = self
            .tree
            .get(full_name)
            .and_then(Node::as_parameter)
            .ok_or_else(|| {
                TrajectoryError::Tree(sweep_tree::TreeError::NotAParameter(full_name.to_string()))
            })?;
        param
            .explored()
            .map(<[Value]>::to_vec)
            .ok_or_else(|| ExplorationError::NeverExplored.into())
    }

    /// Append values to one explored parameter's sequence
    ///
    /// The caller appends matching run records; invariant 2 (sequence
    /// length == run count) must hold again once the consolidation step
    /// completes.
    ///
    /// # Errors
    /// Kind mismatches; unexplored parameters.
    pub fn extend_exploration(
        &mut self,
        full_name: &str,
        values: Vec<Value>,
    ) -> Result<(), TrajectoryError> {
        let param = self
            .tree
            .get_mut(full_name)
            .and_then(Node::as_parameter_mut)
            .ok_or_else(|| {
                TrajectoryError::Tree(sweep_tree::TreeError::NotAParameter(full_name.to_string()))
            })?;
        param.extend_explored(values)?;
        Ok(())
    }

    /// Promote an unexplored parameter to an exploration dimension by
    /// repeating its default over every existing run
    ///
    /// Used when a trial disambiguator becomes an added dimension.
    ///
    /// # Errors
    /// Unknown or non-parameter targets.
    pub fn promote_to_explored(&mut self, query: &str) -> Result<String, TrajectoryError> {
        let full = {
            let translated = self.translate(query)?;
            self.tree.resolve_name(&translated.to_string(), self.policy)?
        };
        let run_count = self.runs.len();
        let param = self
            .tree
            .get_mut(&full)
            .and_then(Node::as_parameter_mut)
            .ok_or_else(|| {
                TrajectoryError::Tree(sweep_tree::TreeError::NotAParameter(full.clone()))
            })?;
        if !param.is_explored() {
            let default = param.default_value().clone();
            param.set_explored(vec![default; run_count])?;
        }
        self.explored.insert(full.clone());
        Ok(full)
    }

    /// Compact the run list to the given indices (ascending), renumbering
    /// records and every explored sequence consistently
    ///
    /// Duplicate elimination funnels through here so invariant 2 can
    /// never be violated halfway.
    ///
    /// # Errors
    /// Out-of-range indices.
    pub fn retain_runs(&mut self, keep: &[usize]) -> Result<(), TrajectoryError> {
        for &idx in keep {
            if idx >= self.runs.len() {
                return Err(TrajectoryError::RunIndexOutOfRange {
                    idx,
                    count: self.runs.len(),
                });
            }
        }

        let mut new_runs = Vec::with_capacity(keep.len());
        for (new_idx, &old_idx) in keep.iter().enumerate() {
            new_runs.push(self.runs[old_idx].renumbered(new_idx));
        }
        self.runs = new_runs;

        let explored: Vec<String> = self.explored.iter().cloned().collect();
        for name in explored {
            if let Some(param) = self.tree.get_mut(&name).and_then(Node::as_parameter_mut) {
                if let Some(values) = param.explored().map(<[Value]>::to_vec) {
                    let filtered: Vec<Value> =
                        keep.iter().filter_map(|&i| values.get(i).cloned()).collect();
                    param.set_explored(filtered)?;
                }
            }
        }
        Ok(())
    }

    /// Serialize the whole trajectory into one batch
    #[must_use]
    pub fn to_batch(&self) -> StoreBatch {
        let mut batch = StoreBatch::new();

        let mut names: Vec<&str> = self.tree.node_names().collect();
        names.sort_unstable();
        for name in names {
            let Some(node) = self.tree.get(name) else {
                continue;
            };
            match node {
                Node::Group(_) => batch.create_group(name),
                Node::Parameter(param) => batch.write_leaf(name, parameter_leaf(param)),
                Node::Result(result) => {
                    for (key, value) in result.items() {
                        let (path, data) = result_item_leaf(result, key, value);
                        batch.write_leaf(path, data);
                    }
                }
                Node::Link(link) => batch.write_leaf(name, link_leaf(link)),
            }
        }

        batch.write_leaf(
            format!("{META_PREFIX}.name"),
            LeafData::new(Value::from(self.name.clone())),
        );
        batch.write_leaf(
            format!("{META_PREFIX}.created"),
            LeafData::new(Value::from(self.created.to_rfc3339())),
        );
        for run in &self.runs {
            if let Ok(json) = serde_json::to_value(run) {
                batch.write_leaf(
                    format!("{META_PREFIX}.{RUNS_SUBGROUP}.{}", run.name),
                    LeafData::new(Value::Json(json)),
                );
            }
        }
        batch
    }

    /// Persist the whole trajectory through the shared backend
    ///
    /// # Errors
    /// Storage contention escalated to fatal; transport failures.
    pub async fn store(&self) -> Result<(), TrajectoryError> {
        let batch = self.to_batch();
        tracing::debug!(trajectory = %self.name, ops = batch.len(), "storing trajectory");
        self.backend.store(batch, WriteMode::Overwrite).await?;
        Ok(())
    }

    /// Rebuild a trajectory from a store
    ///
    /// # Errors
    /// [`TrajectoryError::MalformedStore`] for missing bookkeeping;
    /// storage failures (including version mismatch at backend setup).
    pub async fn load(backend: Arc<dyn StorageBackend>) -> Result<Self, TrajectoryError> {
        let name_leaf = backend
            .load(&format!("{META_PREFIX}.name"), LoadMode::Single)
            .await
            .map_err(|_| {
                TrajectoryError::MalformedStore("missing trajectory name leaf".to_string())
            })?;
        let name = name_leaf
            .first()
            .and_then(|(_, data)| data.value.as_str())
            .ok_or_else(|| {
                TrajectoryError::MalformedStore("trajectory name is not a string".to_string())
            })?
            .to_string();

        let created = match backend
            .load(&format!("{META_PREFIX}.created"), LoadMode::Single)
            .await
        {
            Ok(leaves) => leaves
                .first()
                .and_then(|(_, data)| data.value.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc)),
            Err(_) => Utc::now(),
        };

        let mut trajectory = Self::new(name, Arc::clone(&backend));
        trajectory.created = created;

        // runs first, so exploration lengths can be sanity-checked
        let run_prefix = format!("{META_PREFIX}.{RUNS_SUBGROUP}");
        let mut runs: Vec<RunInfo> = Vec::new();
        for (_, data) in backend.load(&run_prefix, LoadMode::Subtree).await? {
            if let Value::Json(json) = data.value {
                let info: RunInfo = serde_json::from_value(json).map_err(|e| {
                    TrajectoryError::MalformedStore(format!("bad run record: {e}"))
                })?;
                runs.push(info);
            }
        }
        runs.sort_by_key(|r| r.idx);
        trajectory.runs = runs;

        let mut links: Vec<(NodePath, String)> = Vec::new();
        for root in TOP_GROUPS {
            for (path, data) in backend.load(root, LoadMode::Subtree).await? {
                if path == format!("{META_PREFIX}.name")
                    || path == format!("{META_PREFIX}.created")
                    || path.starts_with(&format!("{run_prefix}."))
                {
                    continue;
                }
                let node_path = NodePath::from_str(&path)
                    .map_err(|e| TrajectoryError::MalformedStore(format!("{path}: {e}")))?;
                match data.attrs.get(ATTR_NODE_KIND).map(String::as_str) {
                    Some("parameter") => {
                        let mut param = ParameterNode::new(node_path, data.value.clone());
                        apply_meta_attrs(&mut param.meta, &data.attrs);
                        if let Some(json) = data.attrs.get(ATTR_EXPLORED) {
                            let values: Vec<Value> =
                                serde_json::from_str(json).map_err(|e| {
                                    TrajectoryError::MalformedStore(format!(
                                        "bad explored sequence at {path}: {e}"
                                    ))
                                })?;
                            param.set_explored(values)?;
                            trajectory.explored.insert(path.clone());
                        }
                        trajectory.tree.insert(Node::Parameter(param))?;
                    }
                    Some("link") => {
                        if let Some(target) = data.value.as_str() {
                            links.push((node_path, target.to_string()));
                        }
                    }
                    _ => {
                        let owner = data.attrs.get(ATTR_OWNER).cloned();
                        insert_result_item(&mut trajectory.tree, &path, owner, data.value)?;
                    }
                }
            }
        }
        // links last: their targets exist now
        for (path, target) in links {
            trajectory.tree.add_link(path, &target, AmbiguityPolicy::Error)?;
        }

        tracing::info!(
            trajectory = %trajectory.name,
            runs = trajectory.runs.len(),
            nodes = trajectory.tree.len(),
            "trajectory loaded"
        );
        Ok(trajectory)
    }
}

pub(crate) fn node_value(node: &Node, idx: Option<usize>) -> Result<Value, TrajectoryError> {
    match node {
        Node::Parameter(param) => Ok(param.value_at(idx)?.clone()),
        Node::Result(result) => result
            .value()
            .or_else(|| result.items().next().map(|(_, v)| v))
            .cloned()
            .ok_or_else(|| {
                TrajectoryError::Tree(sweep_tree::TreeError::NotAResult(
                    node.meta().full_name.to_string(),
                ))
            }),
        other => Err(TrajectoryError::Tree(sweep_tree::TreeError::NotAParameter(
            other.meta().full_name.to_string(),
        ))),
    }
}

/// Re-attach a loaded result leaf, merging into an owning node when the
/// leaf was a named sub-item
fn insert_result_item(
    tree: &mut NamedTree,
    path: &str,
    owner: Option<String>,
    value: Value,
) -> Result<(), TrajectoryError> {
    match owner {
        Some(owner_name) if owner_name != path => {
            let key = path
                .strip_prefix(&format!("{owner_name}."))
                .unwrap_or(path)
                .to_string();
            if let Some(result) = tree.get_mut(&owner_name).and_then(Node::as_result_mut) {
                result.set_item(key, value);
                return Ok(());
            }
            let owner_path = NodePath::from_str(&owner_name)
                .map_err(|e| TrajectoryError::MalformedStore(format!("{owner_name}: {e}")))?;
            let mut node = ResultNode::new(owner_path);
            node.set_item(key, value);
            tree.insert(Node::Result(node))?;
            Ok(())
        }
        _ => {
            let node_path = NodePath::from_str(path)
                .map_err(|e| TrajectoryError::MalformedStore(format!("{path}: {e}")))?;
            tree.insert(Node::Result(ResultNode::with_value(node_path, value)))?;
            Ok(())
        }
    }
}

pub(crate) use node_value as node_value_at;
