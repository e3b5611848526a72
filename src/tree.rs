//! Pharmacophore trees and their cut operations.
//!
//! A [`PharmacophoreTree`] is a free tree of [`FeatureNode`]s stored in a
//! petgraph `UnGraph`. Cutting one edge splits the tree into two rooted
//! [`Subtree`]s; each subtree records a breadth-first edge list starting
//! with the cut edge itself, which the [`cut`](crate::cut) module uses to
//! enumerate extension cuts.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::connected_components;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::feature::{FeatureNode, FeatureProfile};

/// Orientation of a cut through edge `(a, b)`.
///
/// `Left` treats `a` as the source and `b` as the target, `Right` the
/// reverse. A [`Subtree`] built with direction `d` is the side containing
/// the target of `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CutDirection {
    Left,
    Right,
}

impl CutDirection {
    pub const BOTH: [CutDirection; 2] = [Self::Left, Self::Right];

    pub fn bit(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    pub fn from_bit(bit: usize) -> Self {
        if bit & 1 == 0 {
            Self::Left
        } else {
            Self::Right
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// `(source, target)` of an edge with endpoints `(a, b)`.
    pub fn orient(self, (a, b): (NodeIndex, NodeIndex)) -> (NodeIndex, NodeIndex) {
        match self {
            Self::Left => (a, b),
            Self::Right => (b, a),
        }
    }
}

/// Dense index of the subtree hanging off `edge` in `direction`, in
/// `0..2 * edge_count`.
pub fn subtree_key(edge: EdgeIndex, direction: CutDirection) -> usize {
    2 * edge.index() + direction.bit()
}

/// Error returned by [`PharmacophoreTree::from_parts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// An edge refers to a node index that does not exist.
    EndpointOutOfBounds { edge: usize, node: usize },
    /// An edge connects a node to itself.
    SelfLoop { edge: usize, node: usize },
    /// A tree over `nodes` nodes needs exactly `nodes - 1` edges.
    EdgeCount { nodes: usize, edges: usize },
    /// The edges do not connect all nodes.
    Disconnected { components: usize },
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndpointOutOfBounds { edge, node } => {
                write!(f, "edge {edge} refers to missing node {node}")
            }
            Self::SelfLoop { edge, node } => {
                write!(f, "edge {edge} connects node {node} to itself")
            }
            Self::EdgeCount { nodes, edges } => {
                write!(f, "a tree with {nodes} nodes cannot have {edges} edges")
            }
            Self::Disconnected { components } => {
                write!(f, "tree is split into {components} components")
            }
        }
    }
}

impl std::error::Error for TreeError {}

/// An undirected, connected, acyclic graph of feature nodes.
#[derive(Debug, Clone, Default)]
pub struct PharmacophoreTree {
    graph: UnGraph<FeatureNode, ()>,
}

impl PharmacophoreTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a node table and an edge list of node indices,
    /// checking that the edges form a spanning tree.
    pub fn from_parts(
        nodes: Vec<FeatureNode>,
        edges: &[(usize, usize)],
    ) -> Result<Self, TreeError> {
        let n = nodes.len();
        if edges.len() + 1 != n.max(1) {
            return Err(TreeError::EdgeCount {
                nodes: n,
                edges: edges.len(),
            });
        }
        let mut tree = Self::new();
        for node in nodes {
            tree.add_node(node);
        }
        for (i, &(a, b)) in edges.iter().enumerate() {
            if let Some(&node) = [a, b].iter().find(|&&x| x >= n) {
                return Err(TreeError::EndpointOutOfBounds { edge: i, node });
            }
            if a == b {
                return Err(TreeError::SelfLoop { edge: i, node: a });
            }
            tree.add_edge(NodeIndex::new(a), NodeIndex::new(b));
        }
        let components = connected_components(&tree.graph);
        if n > 0 && components != 1 {
            return Err(TreeError::Disconnected { components });
        }
        Ok(tree)
    }

    pub fn graph(&self) -> &UnGraph<FeatureNode, ()> {
        &self.graph
    }

    pub fn add_node(&mut self, node: FeatureNode) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// Connect `a` and `b`. The order fixes the edge's `Left` direction.
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex) -> EdgeIndex {
        self.graph.add_edge(a, b, ())
    }

    pub fn node(&self, idx: NodeIndex) -> &FeatureNode {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut FeatureNode {
        &mut self.graph[idx]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(idx)
    }

    pub fn edge_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    pub fn total_size(&self) -> f64 {
        self.graph.node_weights().map(FeatureNode::size).sum()
    }

    /// Aggregate features of the nodes `indices`.
    pub fn profile(&self, indices: &[NodeIndex]) -> FeatureProfile {
        FeatureProfile::of_nodes(self, indices)
    }

    /// Set each atom's weight to `1 / (number of nodes containing it)`.
    pub fn rescale_shared_atoms(&mut self) {
        let mut shares: HashMap<usize, usize> = HashMap::new();
        for node in self.graph.node_weights() {
            for &atom in node.atoms() {
                *shares.entry(atom).or_insert(0) += 1;
            }
        }
        for node in self.graph.node_weights_mut() {
            node.reweight(|atom| 1.0 / shares.get(&atom).copied().unwrap_or(1) as f64);
        }
    }

    /// Remove `idx` and its incident edges. Higher node and edge indices
    /// shift down by one per removed element, keeping their order.
    pub fn remove_node(&mut self, idx: NodeIndex) -> Option<FeatureNode> {
        if idx.index() >= self.node_count() {
            return None;
        }
        let (nodes, edges) = std::mem::take(&mut self.graph).into_nodes_edges();
        let shift = |n: NodeIndex| {
            if n > idx {
                NodeIndex::new(n.index() - 1)
            } else {
                n
            }
        };
        let mut removed = None;
        for (i, node) in nodes.into_iter().enumerate() {
            if i == idx.index() {
                removed = Some(node.weight);
            } else {
                self.graph.add_node(node.weight);
            }
        }
        for edge in edges {
            let (a, b) = (edge.source(), edge.target());
            if a != idx && b != idx {
                self.graph.add_edge(shift(a), shift(b), ());
            }
        }
        removed
    }

    /// Union of both endpoints of every edge after the first, without
    /// duplicates, in first-seen order. The first edge is the root edge of
    /// a subtree whose head the caller tracks separately.
    pub fn nodes_from_edges(&self, edges: &[EdgeIndex]) -> Vec<NodeIndex> {
        let mut seen = vec![false; self.node_count()];
        let mut nodes = Vec::new();
        for &edge in edges.iter().skip(1) {
            let (a, b) = self.endpoints(edge);
            for n in [a, b] {
                if !seen[n.index()] {
                    seen[n.index()] = true;
                    nodes.push(n);
                }
            }
        }
        nodes
    }

    /// The side of `edge` containing the target of `direction`, walked
    /// breadth-first from that target.
    pub fn subtree(&self, edge: EdgeIndex, direction: CutDirection) -> Subtree {
        let (_, head) = direction.orient(self.endpoints(edge));
        let capacity = self.edge_count();
        let mut subtree = Subtree {
            edges: Vec::with_capacity(capacity),
            parents: Vec::with_capacity(capacity),
            far: Vec::with_capacity(capacity),
            directions: Vec::with_capacity(capacity),
        };
        subtree.push(edge, None, head, direction);

        // The edge list doubles as the BFS queue: entry `cursor` is expanded
        // from its far endpoint.
        let mut cursor = 0;
        while cursor < subtree.edges.len() {
            let node = subtree.far[cursor];
            let via = subtree.edges[cursor];
            for e in self.graph.edges(node) {
                if e.id() == via {
                    continue;
                }
                let next = if e.source() == node {
                    e.target()
                } else {
                    e.source()
                };
                let dir = self.direction_toward(e.id(), next);
                subtree.push(e.id(), Some(cursor), next, dir);
            }
            cursor += 1;
            debug_assert!(subtree.edges.len() <= capacity, "graph is not a tree");
        }
        subtree
    }

    /// Split the tree at `edge`.
    pub fn initial_cut(&self, direction: CutDirection, edge: EdgeIndex) -> InitialCut {
        InitialCut {
            source: self.subtree(edge, direction.reverse()),
            target: self.subtree(edge, direction),
        }
    }

    /// Every subtree of the tree, indexed by [`subtree_key`].
    pub fn subtrees(&self) -> Vec<Subtree> {
        self.edges()
            .flat_map(|e| CutDirection::BOTH.map(|d| self.subtree(e, d)))
            .collect()
    }

    fn endpoints(&self, edge: EdgeIndex) -> (NodeIndex, NodeIndex) {
        self.graph
            .edge_endpoints(edge)
            .expect("edge index must belong to this tree")
    }

    fn direction_toward(&self, edge: EdgeIndex, head: NodeIndex) -> CutDirection {
        let (_, b) = self.endpoints(edge);
        if b == head {
            CutDirection::Left
        } else {
            CutDirection::Right
        }
    }
}

/// The two halves produced by [`PharmacophoreTree::initial_cut`].
#[derive(Debug, Clone, PartialEq)]
pub struct InitialCut {
    pub source: Subtree,
    pub target: Subtree,
}

/// One side of a cut edge, in breadth-first order.
///
/// Entry `0` is the cut edge itself; its far endpoint is the head. Every
/// later entry stores the index of its parent edge within the same list,
/// the edge whose far endpoint it hangs off. Each entry's far endpoint is
/// a distinct node, so the far endpoints are exactly the subtree's nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtree {
    pub(crate) edges: Vec<EdgeIndex>,
    pub(crate) parents: Vec<Option<usize>>,
    pub(crate) far: Vec<NodeIndex>,
    pub(crate) directions: Vec<CutDirection>,
}

impl Subtree {
    pub(crate) fn push(
        &mut self,
        edge: EdgeIndex,
        parent: Option<usize>,
        far: NodeIndex,
        direction: CutDirection,
    ) {
        self.edges.push(edge);
        self.parents.push(parent);
        self.far.push(far);
        self.directions.push(direction);
    }

    pub fn head(&self) -> NodeIndex {
        self.far[0]
    }

    pub fn root_edge(&self) -> EdgeIndex {
        self.edges[0]
    }

    pub fn direction(&self) -> CutDirection {
        self.directions[0]
    }

    pub fn key(&self) -> usize {
        subtree_key(self.root_edge(), self.direction())
    }

    pub fn edges(&self) -> &[EdgeIndex] {
        &self.edges
    }

    pub fn parents(&self) -> &[Option<usize>] {
        &self.parents
    }

    /// Nodes of the subtree, head first, in breadth-first order.
    pub fn nodes(&self) -> &[NodeIndex] {
        &self.far
    }

    pub fn node_count(&self) -> usize {
        self.far.len()
    }

    pub fn total_size(&self, tree: &PharmacophoreTree) -> f64 {
        self.far.iter().map(|&n| tree.node(n).size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(atom: usize) -> FeatureNode {
        FeatureNode::new([1, 0, 0, 0, 0, 0], [(atom, 1.0)])
    }

    //   0 - 1 - 2
    //       |
    //       3 - 4
    fn branched() -> PharmacophoreTree {
        let nodes = (0..5).map(leaf).collect();
        PharmacophoreTree::from_parts(nodes, &[(0, 1), (1, 2), (1, 3), (3, 4)]).unwrap()
    }

    #[test]
    fn from_parts_rejects_malformed_input() {
        let nodes = || (0..3).map(leaf).collect::<Vec<_>>();
        assert_eq!(
            PharmacophoreTree::from_parts(nodes(), &[(0, 1)]).unwrap_err(),
            TreeError::EdgeCount { nodes: 3, edges: 1 }
        );
        assert_eq!(
            PharmacophoreTree::from_parts(nodes(), &[(0, 1), (1, 5)]).unwrap_err(),
            TreeError::EndpointOutOfBounds { edge: 1, node: 5 }
        );
        assert_eq!(
            PharmacophoreTree::from_parts(nodes(), &[(0, 1), (2, 2)]).unwrap_err(),
            TreeError::SelfLoop { edge: 1, node: 2 }
        );
        assert_eq!(
            PharmacophoreTree::from_parts(nodes(), &[(0, 1), (1, 0)]).unwrap_err(),
            TreeError::Disconnected { components: 2 }
        );
        assert!(PharmacophoreTree::from_parts(Vec::new(), &[]).is_ok());
        assert!(PharmacophoreTree::from_parts(vec![leaf(0)], &[]).is_ok());
    }

    #[test]
    fn initial_cut_splits_at_edge() {
        let tree = branched();
        let cut = tree.initial_cut(CutDirection::Left, EdgeIndex::new(2));
        assert_eq!(cut.source.head(), NodeIndex::new(1));
        assert_eq!(cut.target.head(), NodeIndex::new(3));

        let mut source: Vec<usize> = cut.source.nodes().iter().map(|n| n.index()).collect();
        source.sort();
        assert_eq!(source, vec![0, 1, 2]);
        let target: Vec<usize> = cut.target.nodes().iter().map(|n| n.index()).collect();
        assert_eq!(target, vec![3, 4]);

        assert_eq!(cut.source.root_edge(), EdgeIndex::new(2));
        assert_eq!(cut.source.parents()[0], None);
        assert!(cut.source.parents()[1..].iter().all(|p| *p == Some(0)));
        assert_eq!(cut.target.parents(), &[None, Some(0)]);
    }

    #[test]
    fn subtree_directions_point_to_heads() {
        let tree = branched();
        let cut = tree.initial_cut(CutDirection::Right, EdgeIndex::new(0));
        assert_eq!(cut.source.head(), NodeIndex::new(1));
        assert_eq!(cut.target.head(), NodeIndex::new(0));
        assert_eq!(cut.target.direction(), CutDirection::Right);
        assert_eq!(cut.source.direction(), CutDirection::Left);
        assert_ne!(cut.source.key(), cut.target.key());

        for sub in [&cut.source, &cut.target] {
            for i in 0..sub.edges().len() {
                let (_, head) = sub.directions[i].orient(tree.edge_endpoints(sub.edges[i]).unwrap());
                assert_eq!(head, sub.far[i]);
            }
        }
    }

    #[test]
    fn parents_precede_children() {
        let tree = branched();
        for sub in tree.subtrees() {
            for (i, parent) in sub.parents().iter().enumerate().skip(1) {
                let p = parent.unwrap();
                assert!(p < i);
                let (a, b) = tree.edge_endpoints(sub.edges()[i]).unwrap();
                assert!(a == sub.far[p] || b == sub.far[p]);
            }
        }
    }

    #[test]
    fn subtrees_are_indexed_by_key() {
        let tree = branched();
        let subtrees = tree.subtrees();
        assert_eq!(subtrees.len(), 2 * tree.edge_count());
        for (key, sub) in subtrees.iter().enumerate() {
            assert_eq!(sub.key(), key);
        }
    }

    #[test]
    fn nodes_from_edges_skips_root_edge() {
        let tree = branched();
        let sub = tree.subtree(EdgeIndex::new(0), CutDirection::Right);
        assert_eq!(sub.head(), NodeIndex::new(0));
        assert!(tree.nodes_from_edges(sub.edges()).is_empty());

        let sub = tree.subtree(EdgeIndex::new(0), CutDirection::Left);
        let mut nodes: Vec<usize> = tree
            .nodes_from_edges(sub.edges())
            .iter()
            .map(|n| n.index())
            .collect();
        nodes.sort();
        assert_eq!(nodes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn remove_node_compacts_indices() {
        let mut tree = branched();
        let removed = tree.remove_node(NodeIndex::new(1)).unwrap();
        assert_eq!(removed.atoms(), &[1]);
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.edge_count(), 1);
        for (i, idx) in tree.nodes().enumerate() {
            let expected = if i == 0 { 0 } else { i + 1 };
            assert_eq!(tree.node(idx).atoms(), &[expected]);
        }
        // Former edge (3, 4) is now (2, 3).
        assert_eq!(
            tree.edge_endpoints(EdgeIndex::new(0)),
            Some((NodeIndex::new(2), NodeIndex::new(3)))
        );
        assert!(tree.remove_node(NodeIndex::new(9)).is_none());
    }

    #[test]
    fn rescale_shared_atoms_counts_atoms_once() {
        let mut tree = PharmacophoreTree::new();
        let a = tree.add_node(FeatureNode::new([0, 0, 0, 0, 1, 0], [(0, 1.0), (1, 1.0)]));
        let b = tree.add_node(FeatureNode::new([0, 0, 0, 0, 1, 0], [(1, 1.0), (2, 1.0)]));
        let c = tree.add_node(FeatureNode::new([0, 0, 0, 0, 1, 0], [(1, 1.0), (3, 1.0)]));
        tree.add_edge(a, b);
        tree.add_edge(b, c);
        assert_eq!(tree.total_size(), 6.0);
        tree.rescale_shared_atoms();
        assert!((tree.total_size() - 4.0).abs() < 1e-12);
        assert!((tree.node(b).weight_of(1).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(tree.node(b).weight_of(2), Some(1.0));
    }

    #[test]
    fn rescale_handles_sparse_atom_indices() {
        let mut tree = PharmacophoreTree::new();
        let far = 1usize << 40;
        let a = tree.add_node(FeatureNode::new([0, 0, 0, 0, 1, 0], [(far, 1.0), (usize::MAX, 1.0)]));
        let b = tree.add_node(FeatureNode::new([0, 0, 0, 0, 1, 0], [(far, 1.0), (7, 1.0)]));
        tree.add_edge(a, b);
        tree.rescale_shared_atoms();
        assert_eq!(tree.node(a).weight_of(far), Some(0.5));
        assert_eq!(tree.node(a).weight_of(usize::MAX), Some(1.0));
        assert!((tree.total_size() - 3.0).abs() < 1e-12);
    }
}
