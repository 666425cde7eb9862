//! The merge algorithm
//!
//! Consolidates a source trajectory into a target:
//! 1. schema check (atomic rejection on mismatch, nothing written)
//! 2. renumber + relocate run-scoped subtrees (checkpointable)
//! 3. explored-value concatenation
//! 4. optional duplicate elimination (the trial parameter absorbs
//!    multiplicity)
//! 5. non-run-scoped merge by path union, ignore-list aware
//!
//! Bulk vs item-wise relocation is a performance knob only; the merged
//! store is identical either way.

use crate::checkpoint::MergeCheckpoint;
use crate::error::MergeError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use sweep_core::CancelFlag;
use sweep_storage::{LoadMode, StorageBackend, StoreBatch, WriteMode};
use sweep_trajectory::{Trajectory, DERIVED_GROUP, RESULTS_GROUP, RUNS_SUBGROUP};
use sweep_tree::{
    run_name, set_name, GroupNode, LinkNode, Node, NodePath, ParameterNode, ResultNode, TreeError,
    Value,
};

static SET_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^run_set_\d{5}$").expect("static pattern"));

/// Relocation strategy; affects batching only, never the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelocationStrategy {
    /// One batch per relocated run
    #[default]
    Bulk,
    /// One batch per leaf (lower peak memory, more round trips)
    ItemWise,
}

/// Merge configuration
#[derive(Debug, Clone, Default)]
pub struct MergeConfig {
    /// Delete relocated subtrees from the source store (move) instead of
    /// leaving them (copy)
    pub move_data: bool,
    /// Relocation batching
    pub strategy: RelocationStrategy,
    /// Parameter allowed to differ between the trajectories; its
    /// differing values become an added exploration dimension
    pub trial_parameter: Option<String>,
    /// Collapse runs identical modulo the trial parameter
    pub remove_duplicates: bool,
    /// Non-run-scoped paths whose conflicting content is acceptable
    /// (target wins)
    pub ignore: Vec<String>,
    /// Write checkpoints so a crashed merge resumes without re-copying
    pub checkpointed: bool,
}

impl MergeConfig {
    /// Copy-based merge with checkpointing on
    #[must_use]
    pub fn new() -> Self {
        Self {
            checkpointed: true,
            ..Self::default()
        }
    }

    /// Designate the trial disambiguator
    #[must_use]
    pub fn with_trial(mut self, name: impl Into<String>) -> Self {
        self.trial_parameter = Some(name.into());
        self
    }

    /// Enable duplicate elimination
    #[must_use]
    pub fn removing_duplicates(mut self) -> Self {
        self.remove_duplicates = true;
        self
    }

    /// Move subtrees out of the source store instead of copying
    #[must_use]
    pub fn moving_data(mut self) -> Self {
        self.move_data = true;
        self
    }

    /// Accept conflicts under a path (target content wins)
    #[must_use]
    pub fn ignoring(mut self, path: impl Into<String>) -> Self {
        self.ignore.push(path.into());
        self
    }
}

/// What the merge did
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Source runs appended
    pub runs_merged: usize,
    /// Runs collapsed by duplicate elimination
    pub duplicates_removed: usize,
    /// Final run index → number of source+target runs it represents
    /// (only entries > 1)
    pub trial_counts: BTreeMap<usize, usize>,
    /// Store leaves relocated
    pub relocated_leaves: usize,
    /// Whether a checkpoint skipped already-copied runs
    pub resumed: bool,
}

/// Merge `source` into `target`
///
/// The target's tree, run list and explored sequences are updated in
/// memory and persisted at the end through the target's backend;
/// run-scoped subtrees relocate store-to-store (checkpointable). The
/// source trajectory is only mutated on its store, and only with
/// [`MergeConfig::move_data`].
///
/// # Errors
/// [`MergeError::SchemaMismatch`] before anything is written;
/// [`MergeError::Conflict`] for non-ignored content conflicts;
/// [`MergeError::Cancelled`] between relocation steps.
pub async fn merge(
    target: &mut Trajectory,
    source: &Trajectory,
    config: &MergeConfig,
    cancel: &CancelFlag,
) -> Result<MergeReport, MergeError> {
    let mut report = MergeReport::default();

    let trial = resolve_trial(target, source, config)?;
    schema_check(target, source, config, trial.as_deref())?;

    let offset = target.run_count();
    let source_runs = source.run_count();
    tracing::info!(
        target = %target.name(),
        source = %source.name(),
        offset,
        source_runs,
        "merge starting"
    );

    // 3a. the trial parameter becomes an exploration dimension before any
    // sequence grows, so every extension below stays length-consistent
    if let Some(trial_name) = trial.as_deref() {
        target.promote_to_explored(trial_name)?;
    }

    // 3b. explored-value concatenation, same order and offset as the run
    // records appended next
    let explored: Vec<String> = target.explored_names().map(String::from).collect();
    for full in &explored {
        let appended = source_sequence(source, full, source_runs)?;
        target.extend_exploration(full, appended)?;
    }

    // 2a. renumbered run records
    for info in source.runs() {
        target.append_run_record(info.renumbered(offset + info.idx));
    }
    report.runs_merged = source_runs;

    // 2b. relocate run-scoped subtrees, checkpoint between steps
    let mut checkpoint = if config.checkpointed {
        match MergeCheckpoint::load(&target.backend()).await {
            Some(existing)
                if existing.source == source.name() && existing.offset == offset =>
            {
                report.resumed = !existing.completed.is_empty();
                existing
            }
            _ => MergeCheckpoint::new(source.name(), offset),
        }
    } else {
        MergeCheckpoint::new(source.name(), offset)
    };

    let grouped = load_run_leaves(source).await?;
    for info in source.runs() {
        if !cancel.accepting_work() {
            tracing::warn!(run = info.idx, "merge observed cancellation");
            return Err(MergeError::Cancelled);
        }
        relocate_run_tree(target, source, &info.name, offset + info.idx)?;

        if checkpoint.completed.contains(&info.idx) {
            continue;
        }
        let leaves = grouped.get(info.name.as_str()).map_or(&[][..], Vec::as_slice);
        report.relocated_leaves +=
            relocate_run_store(target, source, leaves, &info.name, offset + info.idx, config)
                .await?;
        checkpoint.completed.insert(info.idx);
        if config.checkpointed {
            checkpoint.save(&target.backend()).await?;
        }
    }

    // 4. duplicate elimination
    if config.remove_duplicates {
        eliminate_duplicates(target, trial.as_deref(), &mut report).await?;
    }

    // 5. non-run-scoped merge by path union
    merge_global_data(target, source, config)?;

    if report.duplicates_removed > 0 {
        // compaction renumbered the run list; drop the stale records
        // before the overwrite below rewrites the current ones
        let mut batch = StoreBatch::new();
        batch.delete(format!("config.trajectory.{RUNS_SUBGROUP}"));
        target.backend().store(batch, WriteMode::Overwrite).await?;
    }
    target.store().await?;
    if config.checkpointed {
        MergeCheckpoint::clear(&target.backend()).await?;
    }
    tracing::info!(
        merged = report.runs_merged,
        duplicates = report.duplicates_removed,
        leaves = report.relocated_leaves,
        "merge finished"
    );
    Ok(report)
}

/// Resolve the trial disambiguator in both trajectories; full names must
/// agree
fn resolve_trial(
    target: &Trajectory,
    source: &Trajectory,
    config: &MergeConfig,
) -> Result<Option<String>, MergeError> {
    let Some(query) = config.trial_parameter.as_deref() else {
        return Ok(None);
    };
    let in_target = target.get(query)?.meta().full_name.to_string();
    let in_source = source.get(query)?.meta().full_name.to_string();
    if in_target != in_source {
        return Err(MergeError::SchemaMismatch {
            path: in_target,
            reason: format!("trial parameter resolves to '{in_source}' in the source"),
        });
    }
    Ok(Some(in_target))
}

fn parameter_schema(traj: &Trajectory) -> BTreeMap<String, &ParameterNode> {
    let mut schema = BTreeMap::new();
    for name in traj.tree().subtree_names(sweep_trajectory::PARAMETERS_GROUP) {
        if let Some(param) = traj.tree().get(&name).and_then(Node::as_parameter) {
            schema.insert(name, param);
        }
    }
    schema
}

/// Non-exploration parameter names and kinds must match exactly; the
/// trial parameter may differ in value, nothing else may
fn schema_check(
    target: &Trajectory,
    source: &Trajectory,
    config: &MergeConfig,
    trial: Option<&str>,
) -> Result<(), MergeError> {
    let target_schema = parameter_schema(target);
    let source_schema = parameter_schema(source);

    for name in target_schema.keys() {
        if !source_schema.contains_key(name) {
            return Err(MergeError::SchemaMismatch {
                path: name.clone(),
                reason: "missing in source".to_string(),
            });
        }
    }
    for name in source_schema.keys() {
        if !target_schema.contains_key(name) {
            return Err(MergeError::SchemaMismatch {
                path: name.clone(),
                reason: "missing in target".to_string(),
            });
        }
    }

    for (name, target_param) in &target_schema {
        let source_param = &source_schema[name];
        if target_param.kind() != source_param.kind() {
            return Err(MergeError::SchemaMismatch {
                path: name.clone(),
                reason: format!(
                    "kind {} vs {}",
                    target_param.kind(),
                    source_param.kind()
                ),
            });
        }
        if Some(name.as_str()) == trial {
            continue;
        }
        if target_param.is_explored() != source_param.is_explored() {
            return Err(MergeError::SchemaMismatch {
                path: name.clone(),
                reason: "explored in one trajectory only".to_string(),
            });
        }
        if !target_param.is_explored()
            && target_param.default_value() != source_param.default_value()
            && !is_ignored(name, &config.ignore)
        {
            return Err(MergeError::SchemaMismatch {
                path: name.clone(),
                reason: "differing values on a non-trial parameter".to_string(),
            });
        }
    }
    Ok(())
}

/// Per-run values the source contributes for one explored target
/// parameter (its sequence, or its default repeated for a promoted trial)
fn source_sequence(
    source: &Trajectory,
    full: &str,
    source_runs: usize,
) -> Result<Vec<Value>, MergeError> {
    if let Ok(values) = source.explored_values(full) {
        return Ok(values);
    }
    let param = source
        .tree()
        .get(full)
        .and_then(Node::as_parameter)
        .ok_or_else(|| MergeError::SchemaMismatch {
            path: full.to_string(),
            reason: "missing in source".to_string(),
        })?;
    Ok(vec![param.default_value().clone(); source_runs])
}

/// Rewrite a run-scoped path for a new run index, bucket segment included
fn rewrite_run_path(path: &str, old_run: &str, new_idx: usize) -> String {
    let new_run = run_name(new_idx);
    let mut out: Vec<String> = Vec::new();
    for segment in path.split('.') {
        if segment == old_run {
            if let Some(last) = out.last_mut() {
                if SET_NAME_RE.is_match(last) {
                    *last = set_name(new_idx);
                }
            }
            out.push(new_run.clone());
        } else {
            out.push(segment.to_string());
        }
    }
    out.join(".")
}

/// All run-scoped source leaves, grouped by run name
async fn load_run_leaves(
    source: &Trajectory,
) -> Result<HashMap<String, Vec<(String, sweep_storage::LeafData)>>, MergeError> {
    let mut grouped: HashMap<String, Vec<(String, sweep_storage::LeafData)>> = HashMap::new();
    for root in [RESULTS_GROUP, DERIVED_GROUP] {
        let prefix = format!("{root}.{RUNS_SUBGROUP}");
        for (path, data) in source.backend().load(&prefix, LoadMode::Subtree).await? {
            if let Some(run_segment) = path
                .split('.')
                .find(|s| sweep_tree::parse_run_name(s).is_some())
            {
                grouped
                    .entry(run_segment.to_string())
                    .or_default()
                    .push((path, data));
            }
        }
    }
    Ok(grouped)
}

/// Relocate one run's store subtree into the target store
async fn relocate_run_store(
    target: &Trajectory,
    source: &Trajectory,
    leaves: &[(String, sweep_storage::LeafData)],
    old_run: &str,
    new_idx: usize,
    config: &MergeConfig,
) -> Result<usize, MergeError> {
    if leaves.is_empty() {
        return Ok(0);
    }
    let target_backend = target.backend();
    match config.strategy {
        RelocationStrategy::Bulk => {
            let mut batch = StoreBatch::new();
            for (path, data) in leaves {
                batch.write_leaf(rewrite_run_path(path, old_run, new_idx), data.clone());
            }
            target_backend.store(batch, WriteMode::Overwrite).await?;
        }
        RelocationStrategy::ItemWise => {
            for (path, data) in leaves {
                let mut batch = StoreBatch::new();
                batch.write_leaf(rewrite_run_path(path, old_run, new_idx), data.clone());
                target_backend.store(batch, WriteMode::Overwrite).await?;
            }
        }
    }
    if config.move_data {
        let mut batch = StoreBatch::new();
        for (path, _) in leaves {
            batch.delete(path);
        }
        source.backend().store(batch, WriteMode::Overwrite).await?;
    }
    Ok(leaves.len())
}

/// Mirror one run's tree nodes into the target tree under its new name
fn relocate_run_tree(
    target: &mut Trajectory,
    source: &Trajectory,
    old_run: &str,
    new_idx: usize,
) -> Result<(), MergeError> {
    for root in [RESULTS_GROUP, DERIVED_GROUP] {
        let prefix = format!("{root}.{RUNS_SUBGROUP}");
        for name in source.tree().subtree_names(&prefix) {
            if !name.split('.').any(|s| s == old_run) {
                continue;
            }
            let Some(node) = source.tree().get(&name) else {
                continue;
            };
            if node.is_group() {
                continue; // groups auto-create under their leaves
            }
            let new_name = rewrite_run_path(&name, old_run, new_idx);
            if target.tree().contains(&new_name) {
                continue; // checkpoint resume repeats in-memory steps
            }
            let path = NodePath::from_str(&new_name).map_err(TreeError::from)?;
            target.insert_node(reroot(node, path))?;
        }
    }
    Ok(())
}

/// Rebuild a node at a new full name, carrying values and metadata
fn reroot(node: &Node, path: NodePath) -> Node {
    let mut rebuilt = match node {
        Node::Group(_) => Node::Group(GroupNode::new(path)),
        Node::Parameter(p) => {
            let mut new = ParameterNode::new(path, p.default_value().clone());
            if let Some(values) = p.explored() {
                // same values, same kind: cannot fail
                let _ = new.set_explored(values.to_vec());
            }
            Node::Parameter(new)
        }
        Node::Result(r) => {
            let mut new = ResultNode::new(path);
            let new_short = new.meta.name.clone();
            for (key, value) in r.items() {
                let key = if key == r.meta.name {
                    new_short.clone()
                } else {
                    key.to_string()
                };
                new.set_item(key, value.clone());
            }
            Node::Result(new)
        }
        Node::Link(l) => Node::Link(LinkNode::new(path, l.target.clone())),
    };
    rebuilt.meta_mut().comment = node.meta().comment.clone();
    rebuilt.meta_mut().annotations = node.meta().annotations.clone();
    rebuilt
}

/// Collapse runs identical modulo the trial parameter
async fn eliminate_duplicates(
    target: &mut Trajectory,
    trial: Option<&str>,
    report: &mut MergeReport,
) -> Result<(), MergeError> {
    let explored: Vec<String> = target
        .explored_names()
        .map(String::from)
        .filter(|name| Some(name.as_str()) != trial)
        .collect();
    let sequences: Vec<(String, Vec<Value>)> = explored
        .iter()
        .map(|name| Ok((name.clone(), target.explored_values(name)?)))
        .collect::<Result<_, MergeError>>()?;

    let total = target.run_count();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut keep: Vec<usize> = Vec::new();
    let mut multiplicity: HashMap<usize, usize> = HashMap::new();
    let mut doomed: Vec<usize> = Vec::new();

    for idx in 0..total {
        let key = sequences
            .iter()
            .map(|(name, values)| format!("{name}={:?}", values.get(idx)))
            .collect::<Vec<_>>()
            .join(";");
        match first_seen.get(&key) {
            Some(&representative) => {
                *multiplicity.entry(representative).or_insert(1) += 1;
                doomed.push(idx);
            }
            None => {
                first_seen.insert(key, idx);
                keep.push(idx);
            }
        }
    }
    if doomed.is_empty() {
        return Ok(());
    }

    let run_names: Vec<String> = target.runs().iter().map(|r| r.name.clone()).collect();
    let target_backend = target.backend();

    // drop redundant subtrees from store and tree
    let mut batch = StoreBatch::new();
    for &idx in &doomed {
        for root in [RESULTS_GROUP, DERIVED_GROUP] {
            batch.delete(format!("{root}.{RUNS_SUBGROUP}.{}", run_names[idx]));
            batch.delete(format!(
                "{root}.{RUNS_SUBGROUP}.{}.{}",
                set_name(idx),
                run_names[idx]
            ));
        }
        for root in [RESULTS_GROUP, DERIVED_GROUP] {
            let scoped = format!("{root}.{RUNS_SUBGROUP}.{}", run_names[idx]);
            if target.tree().contains(&scoped) {
                target.remove_exact(&scoped)?;
            }
        }
    }
    target_backend.store(batch, WriteMode::Overwrite).await?;

    // shift kept runs down to their new indices, store-side
    for (new_idx, &old_idx) in keep.iter().enumerate() {
        if new_idx == old_idx {
            continue;
        }
        let old_run = &run_names[old_idx];
        for root in [RESULTS_GROUP, DERIVED_GROUP] {
            let prefix = format!("{root}.{RUNS_SUBGROUP}");
            let leaves = target_backend.load(&prefix, LoadMode::Subtree).await?;
            let mut batch = StoreBatch::new();
            for (path, data) in leaves {
                if path.split('.').any(|s| s == old_run.as_str()) {
                    batch.write_leaf(rewrite_run_path(&path, old_run, new_idx), data);
                    batch.delete(path);
                }
            }
            if !batch.is_empty() {
                target_backend.store(batch, WriteMode::Overwrite).await?;
            }
        }
        // tree-side shift
        for root in [RESULTS_GROUP, DERIVED_GROUP] {
            let scoped = format!("{root}.{RUNS_SUBGROUP}.{old_run}");
            if target.tree().contains(&scoped) {
                let new_scoped = rewrite_run_path(&scoped, old_run, new_idx);
                target.rename(&scoped, &new_scoped)?;
            }
        }
    }

    report.duplicates_removed = doomed.len();
    for (representative, count) in multiplicity {
        // representative index after compaction
        if let Ok(new_idx) = keep.binary_search(&representative) {
            report.trial_counts.insert(new_idx, count);
        }
    }
    target.retain_runs(&keep)?;
    Ok(())
}

/// Union-merge non-run-scoped derived parameters, results and config
fn merge_global_data(
    target: &mut Trajectory,
    source: &Trajectory,
    config: &MergeConfig,
) -> Result<(), MergeError> {
    for root in [DERIVED_GROUP, RESULTS_GROUP, sweep_trajectory::CONFIG_GROUP] {
        for name in source.tree().subtree_names(root) {
            if is_run_scoped(&name) || is_bookkeeping(&name) {
                continue;
            }
            let Some(source_node) = source.tree().get(&name) else {
                continue;
            };
            if source_node.is_group() {
                continue;
            }
            match target.tree().get(&name) {
                None => {
                    let path = NodePath::from_str(&name).map_err(TreeError::from)?;
                    target.insert_node(reroot(source_node, path))?;
                }
                Some(existing) => {
                    if nodes_agree(existing, source_node) || is_ignored(&name, &config.ignore) {
                        continue;
                    }
                    return Err(MergeError::Conflict(name));
                }
            }
        }
    }
    Ok(())
}

fn is_run_scoped(name: &str) -> bool {
    let mut segments = name.split('.');
    let _root = segments.next();
    segments.next() == Some(RUNS_SUBGROUP)
}

fn is_bookkeeping(name: &str) -> bool {
    name == "config.trajectory"
        || name.starts_with("config.trajectory.")
        || name == "config.merge"
        || name.starts_with("config.merge.")
}

fn is_ignored(name: &str, ignore: &[String]) -> bool {
    ignore
        .iter()
        .any(|prefix| name == prefix || name.starts_with(&format!("{prefix}.")))
}

fn nodes_agree(a: &Node, b: &Node) -> bool {
    match (a, b) {
        (Node::Parameter(pa), Node::Parameter(pb)) => {
            pa.default_value() == pb.default_value() && pa.explored() == pb.explored()
        }
        (Node::Result(ra), Node::Result(rb)) => {
            let items_a: Vec<_> = ra.items().collect();
            let items_b: Vec<_> = rb.items().collect();
            items_a == items_b
        }
        (Node::Link(la), Node::Link(lb)) => la.target == lb.target,
        _ => false,
    }
}
