//! Tree reconciliation
//!
//! Transforms a live subtree into the shape of a candidate subtree while
//! reusing as many live nodes as possible.
//!
//! Matching runs from the deepest level up to the roots. Every unmatched
//! candidate record takes the first unmatched live record with the same
//! path, and the match is grown upward while both parents are still free
//! ("longest common branch"). Leftover live records are deleted and
//! leftover candidate records are inserted next to their nearest matched
//! sibling. This is a greedy heuristic, not a minimum edit script.

use std::collections::HashMap;

use thiserror::Error;

use crate::index::{flatten, NodeRecord, Operation};
use crate::node::Attribute;
use crate::{DomError, DomResult, DomTree, NodeId};

/// Reconciliation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The two roots do not share an identity key
    #[error("cannot reconcile live root `{live}` with candidate root `{candidate}`")]
    RootMismatch { live: String, candidate: String },
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Which flattened sequence a step refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Live,
    Candidate,
}

/// One entry of the ordered application plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub side: Side,
    pub index: usize,
}

/// Counters reported by [`apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub kept: usize,
    pub moved: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub attributes: usize,
}

impl PatchStats {
    /// True when applying the patch left the live tree untouched
    pub fn is_noop(&self) -> bool {
        self.moved == 0 && self.inserted == 0 && self.deleted == 0 && self.attributes == 0
    }
}

/// Surface the patcher mutates.
///
/// Hosts that attach state to nodes (component instances) override the
/// removal and transfer hooks to tear that state down or move it.
pub trait ReconcileHost {
    fn tree(&self) -> &DomTree;

    fn tree_mut(&mut self) -> &mut DomTree;

    /// Remove a node that is no longer part of the result
    fn remove_node(&mut self, node: NodeId) -> DomResult<()> {
        self.tree_mut().remove(node)
    }

    /// Move the instance mounted on a discarded candidate node to the
    /// live node that replaces it
    fn transfer_instance(&mut self, from: NodeId, to: NodeId) {
        let tree = self.tree_mut();
        let instance = tree.set_instance(from, None);
        tree.set_instance(to, instance);
    }
}

impl ReconcileHost for DomTree {
    fn tree(&self) -> &DomTree {
        self
    }

    fn tree_mut(&mut self) -> &mut DomTree {
        self
    }
}

/// Annotated records of both trees
#[derive(Debug, Clone)]
pub struct Patch {
    pub live: Vec<NodeRecord>,
    pub candidate: Vec<NodeRecord>,
}

impl Patch {
    /// Live node standing in for a candidate record: its counterpart when
    /// kept, the candidate node itself otherwise
    fn resolve(&self, index: usize) -> NodeId {
        let record = &self.candidate[index];
        match record.op {
            Some(Operation::Keep { counterpart }) => self.live[counterpart].node,
            _ => record.node,
        }
    }

    /// Closest preceding sibling of a candidate record, resolved
    fn preceding_sibling(&self, index: usize) -> Option<NodeId> {
        let depth = self.candidate[index].depth;
        self.candidate[..index]
            .iter()
            .rev()
            .take_while(|record| record.depth >= depth)
            .find(|record| record.depth == depth)
            .map(|record| self.resolve(record.index))
    }

    fn live_position(&self, index: usize) -> usize {
        match self.live[index].op {
            Some(Operation::Keep { counterpart }) => counterpart,
            Some(Operation::Delete { position }) => position,
            _ => index,
        }
    }

    /// Application order: live records sort by their operation position,
    /// candidate records by pre-order index; live records go first on ties
    pub fn steps(&self) -> Vec<Step> {
        let mut steps: Vec<(usize, Step)> = (0..self.live.len())
            .map(|index| (self.live_position(index), Step { side: Side::Live, index }))
            .chain((0..self.candidate.len()).map(|index| {
                (index, Step { side: Side::Candidate, index })
            }))
            .collect();
        steps.sort_by_key(|(position, _)| *position);
        steps.into_iter().map(|(_, step)| step).collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.live
            .iter()
            .chain(&self.candidate)
            .filter(|record| record.op.as_ref().is_some_and(|o| o.as_str() == op))
            .count()
    }

    pub fn inserts(&self) -> usize {
        self.count("insert")
    }

    pub fn deletes(&self) -> usize {
        self.count("delete")
    }
}

fn take_first_unmatched(
    pool: &mut HashMap<String, Vec<usize>>,
    path: &str,
    live: &[NodeRecord],
) -> Option<usize> {
    let slots = pool.get_mut(path)?;
    slots.retain(|&index| live[index].op.is_none());
    if slots.is_empty() {
        None
    } else {
        Some(slots.remove(0))
    }
}

fn keep_branch(live: &mut [NodeRecord], candidate: &mut [NodeRecord], mut old: usize, mut new: usize) {
    loop {
        live[old].op = Some(Operation::Keep { counterpart: new });
        candidate[new].op = Some(Operation::Keep { counterpart: old });
        match (live[old].parent, candidate[new].parent) {
            (Some(old_parent), Some(new_parent))
                if live[old_parent].op.is_none()
                    && candidate[new_parent].op.is_none()
                    && live[old_parent].key == candidate[new_parent].key =>
            {
                old = old_parent;
                new = new_parent;
            }
            _ => break,
        }
    }
}

/// Compute the operation of every record in both subtrees
pub fn diff(tree: &DomTree, live: NodeId, candidate: NodeId) -> Result<Patch, ReconcileError> {
    let mut old = flatten(tree, live)?;
    let mut new = flatten(tree, candidate)?;
    if old[0].key != new[0].key {
        return Err(ReconcileError::RootMismatch {
            live: old[0].key.clone(),
            candidate: new[0].key.clone(),
        });
    }

    let mut pool: HashMap<String, Vec<usize>> = HashMap::new();
    for record in &old {
        pool.entry(record.path.clone()).or_default().push(record.index);
    }

    let max_depth = old.iter().chain(&new).map(|r| r.depth).max().unwrap_or(1);
    for depth in (1..=max_depth).rev() {
        for index in 0..new.len() {
            if new[index].depth != depth || new[index].op.is_some() {
                continue;
            }
            if let Some(matched) = take_first_unmatched(&mut pool, &new[index].path, &old) {
                keep_branch(&mut old, &mut new, matched, index);
            }
        }
    }

    for index in 0..old.len() {
        if old[index].op.is_some() {
            continue;
        }
        let position = match index.checked_sub(1).and_then(|prev| old[prev].op.as_ref()) {
            Some(Operation::Keep { counterpart }) => counterpart + 1,
            Some(Operation::Delete { position }) => position + 1,
            _ => 0,
        };
        old[index].op = Some(Operation::Delete { position });
    }

    let mut patch = Patch { live: old, candidate: new };
    for index in 0..patch.candidate.len() {
        if patch.candidate[index].op.is_some() {
            continue;
        }
        let Some(parent) = patch.candidate[index].parent else {
            continue;
        };
        let parent_inserted = patch.candidate[parent]
            .op
            .as_ref()
            .is_some_and(Operation::is_insert);
        let op = if parent_inserted {
            Operation::InsertIgnore
        } else {
            Operation::Insert {
                target: patch.resolve(parent),
                after: patch.preceding_sibling(index),
            }
        };
        patch.candidate[index].op = Some(op);
    }

    tracing::trace!(
        "Diff {} -> {}: {} live, {} candidate, {} inserts, {} deletes",
        candidate,
        live,
        patch.live.len(),
        patch.candidate.len(),
        patch.inserts(),
        patch.deletes()
    );
    Ok(patch)
}

fn is_data_channel(attr: &Attribute) -> bool {
    attr.name.starts_with("data-")
}

/// Merge candidate attributes into the live element; returns the number
/// of changes made
fn sync_attributes(tree: &mut DomTree, candidate: NodeId, live: NodeId) -> usize {
    let Some(source) = tree.element(candidate).map(|elem| elem.attrs.clone()) else {
        return 0;
    };
    let Some(target) = tree.element_mut(live) else {
        return 0;
    };
    let mut changed = 0;

    let stale: Vec<String> = target
        .attrs
        .iter()
        .filter(|attr| !is_data_channel(attr) && !source.iter().any(|s| s.name == attr.name))
        .map(|attr| attr.name.clone())
        .collect();
    for name in stale {
        target.remove_attr(&name);
        changed += 1;
    }
    for attr in source.iter().filter(|attr| !is_data_channel(attr)) {
        if target.set_attr(&attr.name, attr.value.as_str()) {
            changed += 1;
        }
    }

    let live_data: Vec<&Attribute> = target.attrs.iter().filter(|a| is_data_channel(a)).collect();
    let candidate_data: Vec<&Attribute> = source.iter().filter(|a| is_data_channel(a)).collect();
    if live_data != candidate_data {
        target.attrs.retain(|attr| !is_data_channel(attr));
        target
            .attrs
            .extend(source.iter().filter(|a| is_data_channel(a)).cloned());
        changed += 1;
    }
    changed
}

/// Apply a computed patch to the live tree.
///
/// Deletes run after every keep and insert so live nodes that moved out
/// of a deleted subtree survive. Kept candidate nodes are discarded last.
pub fn apply<H: ReconcileHost + ?Sized>(host: &mut H, patch: &Patch) -> Result<PatchStats, ReconcileError> {
    let mut stats = PatchStats::default();
    let mut deletes = Vec::new();
    let mut discards = Vec::new();

    for step in patch.steps() {
        if step.side == Side::Live {
            let record = &patch.live[step.index];
            if matches!(record.op, Some(Operation::Delete { .. })) {
                deletes.push(record.node);
            }
            continue;
        }

        let record = &patch.candidate[step.index];
        match &record.op {
            Some(Operation::Keep { counterpart }) => {
                let live = patch.live[*counterpart].node;
                if let Some(parent) = record.parent.map(|p| patch.resolve(p)) {
                    let after = patch.preceding_sibling(step.index);
                    let tree = host.tree_mut();
                    if tree.parent(live) != Some(parent) || tree.prev_sibling(live) != after {
                        match after {
                            Some(prev) => tree.insert_after(prev, live)?,
                            None => tree.prepend_child(parent, live)?,
                        }
                        stats.moved += 1;
                    }
                }
                stats.attributes += sync_attributes(host.tree_mut(), record.node, live);
                if host.tree().instance(record.node).is_some() {
                    host.transfer_instance(record.node, live);
                }
                discards.push(record.node);
                stats.kept += 1;
            }
            Some(Operation::Insert { target, after }) => {
                let tree = host.tree_mut();
                match after {
                    Some(prev) => tree.insert_after(*prev, record.node)?,
                    None => tree.prepend_child(*target, record.node)?,
                }
                stats.inserted += 1;
            }
            _ => {}
        }
    }

    for node in deletes {
        host.remove_node(node)?;
        stats.deleted += 1;
    }
    for node in discards {
        host.remove_node(node)?;
    }

    tracing::trace!("Applied patch: {:?}", stats);
    Ok(stats)
}

/// Diff `candidate` against `live` and apply the result
pub fn reconcile<H: ReconcileHost + ?Sized>(
    host: &mut H,
    live: NodeId,
    candidate: NodeId,
) -> Result<PatchStats, ReconcileError> {
    let patch = diff(host.tree(), live, candidate)?;
    apply(host, &patch)
}
