//! Ancestor fallback: find something drawable while the ideal tile streams in.

use crate::node::{LoadState, NodeId};
use crate::tree::TileTree;

/// Limits on which ancestors may stand in for a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Nodes coarser than this are never considered.
    pub min_level: u8,
    /// Do not report missing nodes that sit beneath a failed node.
    pub skip_beneath_failed: bool,
}

/// The nearest loaded node at or above a target, and the next loaded one above that.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolvedAncestors {
    /// Nearest loaded node, inclusive of the target.
    pub hi: Option<NodeId>,
    /// Next coarser loaded node above `hi`.
    pub lo: Option<NodeId>,
}

/// Walk from `target` toward the root and pick `hi` and `lo`.
///
/// Every node on the walk that has no data yet (`NeedRequest` or `Requested`)
/// is reported to `on_missing`, up to the point where `lo` is found. With
/// `skip_beneath_failed`, nodes strictly beneath a `Failed` node are not reported.
pub fn resolve_ancestors<const D: usize, const B: usize, P, R>(
    tree: &TileTree<D, B, P, R>,
    target: NodeId,
    policy: ResolvePolicy,
    mut on_missing: impl FnMut(NodeId, u8),
) -> ResolvedAncestors {
    let chain: Vec<(NodeId, u8, LoadState)> = tree
        .ancestors(target)
        .take_while(|(_, n)| n.level() >= policy.min_level)
        .map(|(id, n)| (id, n.level(), n.load_state()))
        .collect();

    // Chain is nearest first, so anything before the last failed entry is beneath it.
    let blocked_below = if policy.skip_beneath_failed {
        chain.iter().rposition(|(_, _, s)| *s == LoadState::Failed)
    } else {
        None
    };

    let mut resolved = ResolvedAncestors::default();
    for (i, &(id, level, state)) in chain.iter().enumerate() {
        match state {
            LoadState::Loaded if resolved.hi.is_none() => resolved.hi = Some(id),
            LoadState::Loaded => {
                resolved.lo = Some(id);
                break;
            }
            LoadState::NeedRequest | LoadState::Requested => {
                if blocked_below.is_none_or(|b| i >= b) {
                    on_missing(id, level);
                }
            }
            LoadState::Failed => {}
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RequestHandle;
    use crate::tree::QuadTree;

    type Tree = QuadTree<u8, ()>;

    /// A chain of `depth + 1` nodes from the root down slot 1; returns ids by level.
    fn chain(depth: u8) -> (Tree, Vec<NodeId>) {
        let mut tree = Tree::new();
        let mut ids = vec![tree.root()];
        for _ in 0..depth {
            let last = *ids.last().expect("non-empty");
            ids.push(tree.child_or_create(last, 1));
        }
        (tree, ids)
    }

    fn load(tree: &mut Tree, id: NodeId) {
        let node = tree.node_mut(id);
        let level = node.level();
        node.begin_request(RequestHandle(u64::from(level) + 1), 0.0);
        node.finish_loaded(level);
    }

    fn fail(tree: &mut Tree, id: NodeId) {
        let node = tree.node_mut(id);
        node.begin_request(RequestHandle(100), 0.0);
        node.finish_failed();
    }

    const OPEN: ResolvePolicy = ResolvePolicy {
        min_level: 0,
        skip_beneath_failed: false,
    };

    /// Target at level 10 with levels 6 and 4 loaded resolves to (6, 4).
    #[test]
    fn test_hi_and_lo_ancestors() {
        let (mut tree, ids) = chain(10);
        load(&mut tree, ids[6]);
        load(&mut tree, ids[4]);
        let mut missing = Vec::new();
        let resolved = resolve_ancestors(&tree, ids[10], OPEN, |_, level| missing.push(level));
        assert_eq!(resolved.hi, Some(ids[6]));
        assert_eq!(resolved.lo, Some(ids[4]));
        assert_eq!(missing, vec![10, 9, 8, 7, 5]);
    }

    #[test]
    fn test_loaded_target_is_its_own_hi() {
        let (mut tree, ids) = chain(3);
        load(&mut tree, ids[3]);
        let resolved = resolve_ancestors(&tree, ids[3], OPEN, |_, _| {});
        assert_eq!(resolved.hi, Some(ids[3]));
        assert_eq!(resolved.lo, None);
    }

    /// Ancestors coarser than the minimum level never stand in.
    #[test]
    fn test_min_level_excludes_coarse_ancestors() {
        let (mut tree, ids) = chain(6);
        load(&mut tree, ids[1]);
        let policy = ResolvePolicy {
            min_level: 2,
            ..OPEN
        };
        let mut missing = Vec::new();
        let resolved = resolve_ancestors(&tree, ids[6], policy, |_, level| missing.push(level));
        assert_eq!(resolved, ResolvedAncestors::default());
        assert_eq!(missing, vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_nothing_loaded_resolves_empty() {
        let (tree, ids) = chain(4);
        let resolved = resolve_ancestors(&tree, ids[4], OPEN, |_, _| {});
        assert_eq!(resolved.hi, None);
        assert_eq!(resolved.lo, None);
    }

    /// Beneath a failed node nothing is reported; above it the walk continues.
    #[test]
    fn test_skip_beneath_failed() {
        let (mut tree, ids) = chain(10);
        fail(&mut tree, ids[8]);
        load(&mut tree, ids[6]);
        let policy = ResolvePolicy {
            skip_beneath_failed: true,
            ..OPEN
        };
        let mut missing = Vec::new();
        let resolved = resolve_ancestors(&tree, ids[10], policy, |_, level| missing.push(level));
        assert_eq!(resolved.hi, Some(ids[6]));
        assert_eq!(missing, vec![7, 5, 4, 3, 2, 1, 0]);

        missing.clear();
        resolve_ancestors(&tree, ids[10], OPEN, |_, level| missing.push(level));
        assert_eq!(missing, vec![10, 9, 7, 5, 4, 3, 2, 1, 0]);
    }
}
