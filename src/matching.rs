//! Results of the match search.

use petgraph::graph::NodeIndex;

use crate::feature::set_similarity;
use crate::tree::PharmacophoreTree;

/// Default weight of the larger tree's size in the [`TreeMatching`]
/// denominator.
pub const NULL_MATCH_SCALING: f64 = 0.5;

/// A correspondence between a node set of each tree.
///
/// Either side may be empty, making it a null match: the other side's mass
/// counts toward the total size but contributes no similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatch {
    nodes1: Vec<NodeIndex>,
    nodes2: Vec<NodeIndex>,
    sim: f64,
    size1: f64,
    size2: f64,
}

impl FeatureMatch {
    pub fn new(
        tree1: &PharmacophoreTree,
        nodes1: Vec<NodeIndex>,
        tree2: &PharmacophoreTree,
        nodes2: Vec<NodeIndex>,
    ) -> Self {
        let sim = if nodes1.is_empty() || nodes2.is_empty() {
            0.0
        } else {
            set_similarity(tree1, &nodes1, tree2, &nodes2)
        };
        let size1 = nodes1.iter().map(|&n| tree1.node(n).size()).sum();
        let size2 = nodes2.iter().map(|&n| tree2.node(n).size()).sum();
        Self {
            nodes1,
            nodes2,
            sim,
            size1,
            size2,
        }
    }

    /// `nodes1` of the first tree matched against nothing.
    pub fn null_first(tree1: &PharmacophoreTree, nodes1: Vec<NodeIndex>) -> Self {
        let size1 = nodes1.iter().map(|&n| tree1.node(n).size()).sum();
        Self {
            nodes1,
            nodes2: Vec::new(),
            sim: 0.0,
            size1,
            size2: 0.0,
        }
    }

    /// `nodes2` of the second tree matched against nothing.
    pub fn null_second(tree2: &PharmacophoreTree, nodes2: Vec<NodeIndex>) -> Self {
        let size2 = nodes2.iter().map(|&n| tree2.node(n).size()).sum();
        Self {
            nodes1: Vec::new(),
            nodes2,
            sim: 0.0,
            size1: 0.0,
            size2,
        }
    }

    pub fn nodes1(&self) -> &[NodeIndex] {
        &self.nodes1
    }

    pub fn nodes2(&self) -> &[NodeIndex] {
        &self.nodes2
    }

    pub fn sim(&self) -> f64 {
        self.sim
    }

    pub fn size1(&self) -> f64 {
        self.size1
    }

    pub fn size2(&self) -> f64 {
        self.size2
    }

    /// Combined mass of both sides.
    pub fn size(&self) -> f64 {
        self.size1 + self.size2
    }

    pub fn is_null(&self) -> bool {
        self.nodes1.is_empty() || self.nodes2.is_empty()
    }
}

/// A set of [`FeatureMatch`]es covering (parts of) two trees, with their
/// aggregate similarity
///
/// `0.5·Σ(size·sim) / (s·max(size1, size2) + (1−s)·min(size1, size2))`
///
/// where `size1`, `size2` sum the two sides over all matches and `s` is
/// the null-match scaling. Every mutation updates the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeMatching {
    matches: Vec<FeatureMatch>,
    null_match_scaling: f64,
    weighted: f64,
    size1: f64,
    size2: f64,
    sim: f64,
}

impl TreeMatching {
    pub fn new(null_match_scaling: f64) -> Self {
        Self {
            matches: Vec::new(),
            null_match_scaling,
            weighted: 0.0,
            size1: 0.0,
            size2: 0.0,
            sim: 0.0,
        }
    }

    pub fn add_match(&mut self, m: FeatureMatch) {
        self.weighted += m.size() * m.sim;
        self.size1 += m.size1;
        self.size2 += m.size2;
        self.matches.push(m);
        self.calculate();
    }

    /// Move all matches of `other` into `self`.
    pub fn merge(&mut self, other: TreeMatching) {
        self.weighted += other.weighted;
        self.size1 += other.size1;
        self.size2 += other.size2;
        self.matches.extend(other.matches);
        self.calculate();
    }

    fn calculate(&mut self) {
        let s = self.null_match_scaling;
        let denominator = s * self.size1.max(self.size2) + (1.0 - s) * self.size1.min(self.size2);
        self.sim = if denominator > 0.0 {
            0.5 * self.weighted / denominator
        } else {
            0.0
        };
    }

    pub fn sim(&self) -> f64 {
        self.sim
    }

    pub fn matches(&self) -> &[FeatureMatch] {
        &self.matches
    }

    pub fn size1(&self) -> f64 {
        self.size1
    }

    pub fn size2(&self) -> f64 {
        self.size2
    }
}

impl Default for TreeMatching {
    fn default() -> Self {
        Self::new(NULL_MATCH_SCALING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureNode;

    fn pair() -> PharmacophoreTree {
        let nodes = vec![
            FeatureNode::new([1, 0, 0, 0, 0, 0], [(0, 10.0)]),
            FeatureNode::new([0, 1, 0, 0, 1, 0], [(1, 10.0), (2, 10.0)]),
        ];
        PharmacophoreTree::from_parts(nodes, &[(0, 1)]).unwrap()
    }

    #[test]
    fn self_match_is_perfect() {
        let t = pair();
        let all: Vec<_> = t.nodes().collect();
        let m = FeatureMatch::new(&t, all.clone(), &t, all);
        assert!((m.sim() - 1.0).abs() < 1e-12);
        assert_eq!(m.size(), 6.0);

        let mut matching = TreeMatching::default();
        matching.add_match(m);
        assert!((matching.sim() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn null_matches_dilute_similarity() {
        let t = pair();
        let (a, b) = (NodeIndex::new(0), NodeIndex::new(1));
        let mut matching = TreeMatching::default();
        matching.add_match(FeatureMatch::new(&t, vec![a], &t, vec![a]));
        assert!((matching.sim() - 1.0).abs() < 1e-12);

        let null = FeatureMatch::null_first(&t, vec![b]);
        assert!(null.is_null());
        assert_eq!(null.sim(), 0.0);
        matching.add_match(null);
        // 0.5 * 2 / (0.5 * 3 + 0.5 * 1)
        assert!((matching.sim() - 0.5).abs() < 1e-12);
        assert_eq!(matching.matches().len(), 2);
    }

    #[test]
    fn merge_combines_sums() {
        let t = pair();
        let (a, b) = (NodeIndex::new(0), NodeIndex::new(1));
        let mut left = TreeMatching::default();
        left.add_match(FeatureMatch::new(&t, vec![a], &t, vec![a]));
        let mut right = TreeMatching::default();
        right.add_match(FeatureMatch::new(&t, vec![b], &t, vec![b]));
        left.merge(right);
        assert!((left.sim() - 1.0).abs() < 1e-12);
        assert_eq!((left.size1(), left.size2()), (3.0, 3.0));
    }

    #[test]
    fn empty_matching_scores_zero() {
        let t = pair();
        let mut matching = TreeMatching::default();
        assert_eq!(matching.sim(), 0.0);
        matching.add_match(FeatureMatch::null_second(&t, Vec::new()));
        assert_eq!(matching.sim(), 0.0);
    }
}
