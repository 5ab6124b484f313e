//! Arena-backed spatial tree with lazily created children.
//!
//! Nodes live in a [`Slab`]; a parent owns its children through index slots
//! and each child keeps a plain index back to its parent, so walking toward
//! the root is O(1) per step and there are no reference cycles.
//!
//! Template parameters:
//! * `D` is the number of tiled dimensions, 2 for quadtrees and 3 for octrees.
//! * `B` is the fan-out, `1 << D`. The relation is checked at construction.

use slab::Slab;

use crate::address::TileAddress;
use crate::node::{NodeId, TileNode};
use crate::provider::RequestHandle;

/// The spatial hierarchy of tile nodes.
#[derive(Debug)]
pub struct TileTree<const D: usize, const B: usize, P, R> {
    nodes: Slab<TileNode<D, B, P, R>>,
    root: NodeId,
}

/// Quadtree of image tiles.
pub type QuadTree<P, R> = TileTree<2, 4, P, R>;
/// Octree of volumetric tiles.
pub type OctTree<P, R> = TileTree<3, 8, P, R>;

impl<const D: usize, const B: usize, P, R> TileTree<D, B, P, R> {
    /// Create a tree holding only the root node.
    ///
    /// # Panics
    ///
    /// Panics if `B != 1 << D`.
    #[must_use]
    pub fn new() -> Self {
        assert_eq!(1 << D, B, "fan-out B must equal 2^D");
        let mut nodes = Slab::with_capacity(64);
        let root = NodeId(nodes.insert(TileNode::new(TileAddress::root(), None)));
        Self { nodes, root }
    }

    /// The root node's id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// A node by id, or `None` if it was removed.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&TileNode<D, B, P, R>> {
        self.nodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut TileNode<D, B, P, R>> {
        self.nodes.get_mut(id.0)
    }

    /// A node by id. Ids produced by this tree stay valid until the node is removed.
    ///
    /// # Panics
    ///
    /// Panics if the node was removed.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &TileNode<D, B, P, R> {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TileNode<D, B, P, R> {
        &mut self.nodes[id.0]
    }

    /// The existing child in `slot`, if traversal ever created it.
    #[must_use]
    pub fn child(&self, id: NodeId, slot: usize) -> Option<NodeId> {
        self.nodes[id.0].children[slot]
    }

    /// The child in `slot`, creating it if absent. The only way nodes come into being.
    pub fn child_or_create(&mut self, id: NodeId, slot: usize) -> NodeId {
        if let Some(child) = self.nodes[id.0].children[slot] {
            return child;
        }
        let address = self.nodes[id.0].address.child(slot);
        let child = NodeId(self.nodes.insert(TileNode::new(address, Some(id))));
        self.nodes[id.0].children[slot] = Some(child);
        child
    }

    /// Follow existing child links from the root to `address`.
    #[must_use]
    pub fn find(&self, address: &TileAddress<D>) -> Option<NodeId> {
        let mut current = self.root;
        for level in 1..=address.level {
            let step = address.ancestor_at(level)?;
            current = self.nodes[current.0].children[step.child_slot()]?;
        }
        Some(current)
    }

    /// `id` and its ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, D, B, P, R> {
        Ancestors {
            tree: self,
            next: Some(id),
        }
    }

    /// Every node in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TileNode<D, B, P, R>)> {
        self.nodes.iter().map(|(i, n)| (NodeId(i), n))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut TileNode<D, B, P, R>)> {
        self.nodes.iter_mut().map(|(i, n)| (NodeId(i), n))
    }

    /// Remove a childless non-root node, unlinking it from its parent.
    pub(crate) fn remove_leaf(&mut self, id: NodeId) -> Option<TileNode<D, B, P, R>> {
        let node = self.nodes.get(id.0)?;
        if id == self.root || node.has_children() {
            return None;
        }
        let slot = node.address.child_slot();
        if let Some(parent) = node.parent {
            self.nodes[parent.0].children[slot] = None;
        }
        Some(self.nodes.remove(id.0))
    }

    /// Tear down the subtree below `id` (and `id` itself unless it is the root,
    /// which is reset in place). For each node, the outstanding request is
    /// handed to `cancel` first, then render resources and payload are dropped,
    /// then its children are visited. Returns the number of nodes removed.
    pub fn dispose_subtree(&mut self, id: NodeId, mut cancel: impl FnMut(RequestHandle)) -> usize {
        let Some(node) = self.nodes.get(id.0) else {
            return 0;
        };
        let slot = node.address.child_slot();
        let parent = node.parent;

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            if let Some(handle) = node.cancel_request() {
                cancel(handle);
            }
            node.release_renderables();
            node.evict();
            stack.extend(node.children.iter_mut().filter_map(Option::take));
            if current != self.root {
                self.nodes.remove(current.0);
                removed += 1;
            }
        }

        if id != self.root
            && let Some(parent) = parent
        {
            self.nodes[parent.0].children[slot] = None;
        }
        removed
    }
}

impl<const D: usize, const B: usize, P, R> Default for TileTree<D, B, P, R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator from a node up to the root.
pub struct Ancestors<'a, const D: usize, const B: usize, P, R> {
    tree: &'a TileTree<D, B, P, R>,
    next: Option<NodeId>,
}

impl<'a, const D: usize, const B: usize, P, R> Iterator for Ancestors<'a, D, B, P, R> {
    type Item = (NodeId, &'a TileNode<D, B, P, R>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let node = self.tree.nodes.get(id.0)?;
        self.next = node.parent;
        Some((id, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::QuadAddress;
    use crate::node::LoadState;

    type Tree = QuadTree<u32, ()>;

    #[test]
    fn test_new_tree_has_only_root() {
        let tree = Tree::new();
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert_eq!(tree.node(tree.root()).address(), QuadAddress::root());
        assert_eq!(tree.node(tree.root()).parent(), None);
    }

    #[test]
    #[should_panic(expected = "fan-out")]
    fn test_mismatched_fanout_panics() {
        let _ = TileTree::<3, 4, u32, ()>::new();
    }

    /// Children appear only in the slots that were descended through.
    #[test]
    fn test_children_created_lazily() {
        let mut tree = Tree::new();
        let root = tree.root();
        let c = tree.child_or_create(root, 2);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.child_or_create(root, 2), c);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.child(root, 0), None);
        assert_eq!(tree.node(c).address(), QuadAddress::new(1, [0, 1]));
        assert_eq!(tree.node(c).parent(), Some(root));
    }

    #[test]
    fn test_find_follows_existing_links() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.child_or_create(root, 3);
        let b = tree.child_or_create(a, 1);
        assert_eq!(tree.find(&QuadAddress::new(2, [3, 2])), Some(b));
        assert_eq!(tree.find(&QuadAddress::root()), Some(root));
        assert_eq!(tree.find(&QuadAddress::new(2, [0, 0])), None);
    }

    /// Ancestor chains are walkable even when nothing on them is loaded.
    #[test]
    fn test_ancestors_nearest_first() {
        let mut tree = Tree::new();
        let mut id = tree.root();
        for _ in 0..5 {
            id = tree.child_or_create(id, 0);
        }
        let levels: Vec<u8> = tree.ancestors(id).map(|(_, n)| n.level()).collect();
        assert_eq!(levels, vec![5, 4, 3, 2, 1, 0]);
        assert!(
            tree.ancestors(id)
                .all(|(_, n)| n.load_state() == LoadState::NeedRequest)
        );
    }

    #[test]
    fn test_remove_leaf_requires_childless() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.child_or_create(root, 0);
        let b = tree.child_or_create(a, 0);
        assert!(tree.remove_leaf(a).is_none());
        assert!(tree.remove_leaf(root).is_none());
        assert!(tree.remove_leaf(b).is_some());
        assert!(tree.remove_leaf(a).is_some());
        assert_eq!(tree.child(root, 0), None);
        assert_eq!(tree.len(), 1);
    }

    /// Disposing cancels outstanding requests and unlinks the subtree.
    #[test]
    fn test_dispose_subtree_cancels_and_removes() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.child_or_create(root, 1);
        let b = tree.child_or_create(a, 0);
        let c = tree.child_or_create(a, 3);
        tree.node_mut(b).begin_request(RequestHandle(11), 1.0);
        tree.node_mut(c).begin_request(RequestHandle(12), 1.0);
        tree.node_mut(c).finish_loaded(5);

        let mut cancelled = Vec::new();
        let removed = tree.dispose_subtree(a, |h| cancelled.push(h));
        assert_eq!(removed, 3);
        assert_eq!(cancelled, vec![RequestHandle(11)]);
        assert_eq!(tree.child(root, 1), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_dispose_root_resets_in_place() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.node_mut(root).begin_request(RequestHandle(1), 0.0);
        tree.node_mut(root).finish_loaded(1);
        tree.child_or_create(root, 0);
        let removed = tree.dispose_subtree(root, |_| {});
        assert_eq!(removed, 1);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node(root).load_state(), LoadState::NeedRequest);
    }
}
