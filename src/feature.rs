//! Feature nodes and the node-level similarity model.
//!
//! A [`FeatureNode`] abstracts one or more atoms of a molecule into a
//! vector of pharmacophoric functionality counts plus a steric size and
//! volume. Nodes are compared either one-to-one or, more commonly during
//! tree matching, as aggregated node sets through [`FeatureProfile`].
//!
//! The similarity of two profiles blends a steric term (size and volume
//! agreement) with a chemical term (weighted overlap of functionality
//! counts). Profiles whose sizes differ by more than [`SIZE_RATIO`] score
//! zero outright.

use bitflags::bitflags;
use petgraph::graph::NodeIndex;

use crate::tree::PharmacophoreTree;

/// Number of functionality categories carried by every node.
pub const FUNCTIONALITY_COUNT: usize = 6;

/// Per-category weights of the chemical similarity term, indexed like
/// [`Functionality::ALL`]. Ionizable and hydrogen-bonding features count
/// three times as much as lipophilic and aromatic ones.
pub const CATEGORY_WEIGHTS: [f64; FUNCTIONALITY_COUNT] = [3.0, 3.0, 3.0, 3.0, 1.0, 1.0];

/// Largest tolerated ratio between two aggregate sizes before the pair is
/// considered incomparable.
pub const SIZE_RATIO: f64 = 2.0;

const STERIC_WEIGHT: f64 = 0.3;
const CHEMICAL_WEIGHT: f64 = 0.7;
const EPSILON: f64 = 1e-9;

/// Pharmacophoric functionality categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Functionality {
    Donor,
    Acceptor,
    NegIonizable,
    PosIonizable,
    Lipophilic,
    Aromatic,
}

impl Functionality {
    pub const ALL: [Functionality; FUNCTIONALITY_COUNT] = [
        Self::Donor,
        Self::Acceptor,
        Self::NegIonizable,
        Self::PosIonizable,
        Self::Lipophilic,
        Self::Aromatic,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn weight(self) -> f64 {
        CATEGORY_WEIGHTS[self.index()]
    }
}

bitflags! {
    /// Special roles a node can play in a tree.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeRole: u8 {
        /// Atom-less placeholder inserted to break a cycle.
        const ZERO_NODE = 0b0000_0001;
        /// Wildcard attachment point; two link nodes always match.
        const LINK_NODE = 0b0000_0010;
    }
}

/// Size and volume derived from a node's per-atom weights and volumes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeMetrics {
    pub size: f64,
    pub volume: f64,
}

impl NodeMetrics {
    fn compute(weights: &[f64], volumes: &[f64]) -> Self {
        let size = weights.iter().sum();
        let volume = weights.iter().zip(volumes).map(|(w, v)| w * v).sum();
        Self { size, volume }
    }
}

/// A node of a pharmacophore tree.
///
/// Atoms are stored with a parallel weight and volume each. Weights start
/// at `1.0`; a tree rescales them with
/// [`PharmacophoreTree::rescale_shared_atoms`] so that an atom shared by
/// several nodes contributes its size only once in total.
///
/// # Examples
///
/// ```
/// use pharmtree::{FeatureNode, Functionality};
///
/// let mut f = [0; 6];
/// f[Functionality::Donor.index()] = 1;
/// let hydroxyl = FeatureNode::new(f, [(4, 9.0)]);
/// assert_eq!(hydroxyl.size(), 1.0);
/// assert_eq!(hydroxyl.volume(), 9.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureNode {
    functionalities: [u32; FUNCTIONALITY_COUNT],
    atoms: Vec<usize>,
    weights: Vec<f64>,
    volumes: Vec<f64>,
    role: NodeRole,
    metrics: NodeMetrics,
}

impl FeatureNode {
    /// Build a node from its functionality counts and `(atom, volume)`
    /// pairs. Repeated atoms are ignored after their first occurrence.
    pub fn new(
        functionalities: [u32; FUNCTIONALITY_COUNT],
        atoms: impl IntoIterator<Item = (usize, f64)>,
    ) -> Self {
        let mut node = Self {
            functionalities,
            atoms: Vec::new(),
            weights: Vec::new(),
            volumes: Vec::new(),
            role: NodeRole::empty(),
            metrics: NodeMetrics::default(),
        };
        for (atom, volume) in atoms {
            if node.atoms.contains(&atom) {
                continue;
            }
            node.atoms.push(atom);
            node.weights.push(1.0);
            node.volumes.push(volume);
        }
        node.metrics = NodeMetrics::compute(&node.weights, &node.volumes);
        node
    }

    /// A placeholder node without atoms or features.
    pub fn zero() -> Self {
        Self::new([0; FUNCTIONALITY_COUNT], []).with_role(NodeRole::ZERO_NODE)
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn set_role(&mut self, role: NodeRole) {
        self.role = role;
    }

    pub fn is_zero_node(&self) -> bool {
        self.role.contains(NodeRole::ZERO_NODE)
    }

    pub fn is_link_node(&self) -> bool {
        self.role.contains(NodeRole::LINK_NODE)
    }

    pub fn functionalities(&self) -> &[u32; FUNCTIONALITY_COUNT] {
        &self.functionalities
    }

    pub fn functionality(&self, kind: Functionality) -> u32 {
        self.functionalities[kind.index()]
    }

    pub fn set_functionalities(&mut self, functionalities: [u32; FUNCTIONALITY_COUNT]) {
        self.functionalities = functionalities;
    }

    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn weight_of(&self, atom: usize) -> Option<f64> {
        self.atoms
            .iter()
            .position(|&a| a == atom)
            .map(|i| self.weights[i])
    }

    pub fn size(&self) -> f64 {
        self.metrics.size
    }

    pub fn volume(&self) -> f64 {
        self.metrics.volume
    }

    pub fn metrics(&self) -> NodeMetrics {
        self.metrics
    }

    /// Replace every atom weight with `weight_of(atom)` and return the
    /// recomputed metrics.
    pub fn reweight(&mut self, mut weight_of: impl FnMut(usize) -> f64) -> NodeMetrics {
        for (weight, &atom) in self.weights.iter_mut().zip(&self.atoms) {
            *weight = weight_of(atom);
        }
        self.metrics = NodeMetrics::compute(&self.weights, &self.volumes);
        self.metrics
    }

    /// Set the volume of one atom. Returns `None` if the node does not
    /// contain `atom`.
    pub fn set_volume(&mut self, atom: usize, volume: f64) -> Option<NodeMetrics> {
        let i = self.atoms.iter().position(|&a| a == atom)?;
        self.volumes[i] = volume;
        self.metrics = NodeMetrics::compute(&self.weights, &self.volumes);
        Some(self.metrics)
    }

    /// Fold `other` into this node.
    ///
    /// Functionality counts add up. Atoms are unioned; an atom present in
    /// both keeps the larger of its two weights and volumes. The merged
    /// node stays a zero node only if both inputs were.
    pub fn merge(&mut self, other: &FeatureNode) -> NodeMetrics {
        for (mine, theirs) in self.functionalities.iter_mut().zip(&other.functionalities) {
            *mine += theirs;
        }
        for ((&atom, &weight), &volume) in other.atoms.iter().zip(&other.weights).zip(&other.volumes) {
            match self.atoms.iter().position(|&a| a == atom) {
                Some(i) => {
                    self.weights[i] = self.weights[i].max(weight);
                    self.volumes[i] = self.volumes[i].max(volume);
                }
                None => {
                    self.atoms.push(atom);
                    self.weights.push(weight);
                    self.volumes.push(volume);
                }
            }
        }
        let zero = self.is_zero_node() && other.is_zero_node();
        self.role |= other.role;
        self.role.set(NodeRole::ZERO_NODE, zero);
        self.metrics = NodeMetrics::compute(&self.weights, &self.volumes);
        self.metrics
    }

    /// Similarity of two single nodes, in `[0, 1]`.
    pub fn similarity(&self, other: &FeatureNode) -> f64 {
        FeatureProfile::of(self).similarity(&FeatureProfile::of(other))
    }
}

/// Aggregated features of a set of nodes, the unit of comparison used by
/// the matcher when node groups are merged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureProfile {
    functionalities: [u32; FUNCTIONALITY_COUNT],
    size: f64,
    volume: f64,
    node_count: usize,
    link_count: usize,
}

impl FeatureProfile {
    pub fn of(node: &FeatureNode) -> Self {
        Self::aggregate([node])
    }

    pub fn aggregate<'n>(nodes: impl IntoIterator<Item = &'n FeatureNode>) -> Self {
        let mut profile = Self::default();
        for node in nodes {
            for (sum, &count) in profile.functionalities.iter_mut().zip(&node.functionalities) {
                *sum += count;
            }
            profile.size += node.size();
            profile.volume += node.volume();
            profile.node_count += 1;
            if node.is_link_node() {
                profile.link_count += 1;
            }
        }
        profile
    }

    /// Aggregate the nodes `indices` of `tree`.
    pub fn of_nodes(tree: &PharmacophoreTree, indices: &[NodeIndex]) -> Self {
        Self::aggregate(indices.iter().map(|&idx| tree.node(idx)))
    }

    pub fn functionalities(&self) -> &[u32; FUNCTIONALITY_COUNT] {
        &self.functionalities
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }

    fn is_single_link(&self) -> bool {
        self.node_count == 1 && self.link_count == 1
    }

    /// Weighted blend of steric and chemical similarity, in `[0, 1]`.
    pub fn similarity(&self, other: &FeatureProfile) -> f64 {
        let (steric, chemical) = self.sub_scores(other);
        STERIC_WEIGHT * steric + CHEMICAL_WEIGHT * chemical
    }

    fn sub_scores(&self, other: &FeatureProfile) -> (f64, f64) {
        if self.is_single_link() && other.is_single_link() {
            return (1.0, 1.0);
        }
        if self.is_empty() || other.is_empty() || size_ratio_exceeded(self.size, other.size) {
            return (0.0, 0.0);
        }
        (self.steric_similarity(other), self.chemical_similarity(other))
    }

    /// Mean of the size and volume ratio similarities.
    pub fn steric_similarity(&self, other: &FeatureProfile) -> f64 {
        0.5 * ratio_sim(self.size, other.size) + 0.5 * ratio_sim(self.volume, other.volume)
    }

    /// Weighted Dice overlap of functionality counts; 0 when neither side
    /// carries any functionality.
    pub fn chemical_similarity(&self, other: &FeatureProfile) -> f64 {
        let mut shared = 0.0;
        let mut total = 0.0;
        for ((&a, &b), weight) in self
            .functionalities
            .iter()
            .zip(&other.functionalities)
            .zip(CATEGORY_WEIGHTS)
        {
            shared += weight * f64::from(a.min(b));
            total += weight * (f64::from(a) + f64::from(b));
        }
        if total <= 0.0 {
            0.0
        } else {
            2.0 * shared / total
        }
    }
}

/// `2·min(a,b)/(a+b)`, or `1` when both values vanish.
pub fn ratio_sim(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum.abs() < EPSILON {
        return 1.0;
    }
    2.0 * a.min(b) / sum
}

/// Whether two sizes are too imbalanced to compare. A vanishing size on
/// either side always counts as imbalanced.
pub fn size_ratio_exceeded(a: f64, b: f64) -> bool {
    if a <= EPSILON || b <= EPSILON {
        return true;
    }
    a / b > SIZE_RATIO || b / a > SIZE_RATIO
}

/// Similarity of the node set `nodes1` of `tree1` against `nodes2` of
/// `tree2`, comparing summed features and sizes. Empty sets score 0.
pub fn set_similarity(
    tree1: &PharmacophoreTree,
    nodes1: &[NodeIndex],
    tree2: &PharmacophoreTree,
    nodes2: &[NodeIndex],
) -> f64 {
    FeatureProfile::of_nodes(tree1, nodes1).similarity(&FeatureProfile::of_nodes(tree2, nodes2))
}
