//! Recursive match search between two pharmacophore trees.
//!
//! The search first splits both trees at one edge each, choosing a few
//! promising split pairs by a cheap score. Each pair of halves is then
//! matched by [`TreeMatcher::extension_match`]: a small extension region
//! around both heads is matched directly, and the child subtrees left
//! over are matched recursively and paired up by an optimal assignment.
//! Results for subtree pairs are memoized, so every pair is solved at most
//! once per matcher.

use std::fmt;

use log::{debug, trace, warn};
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::assignment::{assign, AssignmentSolver, MunkresSolver};
use crate::cut::{CutNodes, CutString};
use crate::feature::{set_similarity, FeatureProfile};
use crate::matching::{FeatureMatch, TreeMatching};
use crate::top_k::{top_k, ScoreMatrix};
use crate::tree::{subtree_key, CutDirection, PharmacophoreTree, Subtree};

/// Tuning knobs of the match search.
///
/// The defaults are the tuned values rankings are calibrated against.
/// Missing fields take their default when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Number of initial split pairs explored.
    pub initial_splits: usize,
    /// Extension cut pairs explored per subtree pair, minus one.
    pub extension_matches: usize,
    /// Largest extension region, in nodes.
    pub extension_node_limit: usize,
    /// Weight of extension-region similarity when ranking extension cuts.
    pub alpha: f64,
    /// Weight of split balance when ranking initial splits.
    pub beta: f64,
    /// Largest size ratio at which two node sets are paired directly.
    pub match_balance: f64,
    /// Subtrees lighter than this are matched without further cuts.
    pub match_size_limit: f64,
    /// Weight of the larger side in the aggregate denominator.
    pub null_match_scaling: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            initial_splits: 5,
            extension_matches: 3,
            extension_node_limit: 2,
            alpha: 0.8,
            beta: 0.6,
            match_balance: 2.0,
            match_size_limit: 3.0,
            null_match_scaling: 0.5,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_splits == 0 {
            return Err(ConfigError::ZeroSplits);
        }
        if self.extension_node_limit == 0 {
            return Err(ConfigError::ZeroNodeLimit);
        }
        for (name, value) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("null_match_scaling", self.null_match_scaling),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::WeightOutOfRange { name, value });
            }
        }
        if !(self.match_balance >= 1.0) {
            return Err(ConfigError::ThresholdOutOfRange {
                name: "match_balance",
                value: self.match_balance,
            });
        }
        if !(self.match_size_limit >= 0.0) {
            return Err(ConfigError::ThresholdOutOfRange {
                name: "match_size_limit",
                value: self.match_size_limit,
            });
        }
        Ok(())
    }
}

/// Error returned when a [`MatcherConfig`] is unusable.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `initial_splits` is zero, so no split would be explored.
    ZeroSplits,
    /// `extension_node_limit` is zero, so no extension cut exists.
    ZeroNodeLimit,
    /// A blending weight lies outside `[0, 1]`.
    WeightOutOfRange { name: &'static str, value: f64 },
    /// A balance or size threshold is out of range.
    ThresholdOutOfRange { name: &'static str, value: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSplits => write!(f, "initial_splits must be at least 1"),
            Self::ZeroNodeLimit => write!(f, "extension_node_limit must be at least 1"),
            Self::WeightOutOfRange { name, value } => {
                write!(f, "{name} must lie in [0, 1], got {value}")
            }
            Self::ThresholdOutOfRange { name, value } => {
                write!(f, "{name} is out of range: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Similarity of two trees under the default configuration, roughly in
/// `[0, 1]`.
///
/// # Examples
///
/// ```
/// use pharmtree::{similarity, FeatureNode, PharmacophoreTree};
///
/// let donor = || FeatureNode::new([1, 0, 0, 0, 0, 0], [(0, 10.0)]);
/// let tree = PharmacophoreTree::from_parts(vec![donor(), donor()], &[(0, 1)]).unwrap();
/// assert!((similarity(&tree, &tree) - 1.0).abs() < 1e-9);
/// ```
pub fn similarity(tree1: &PharmacophoreTree, tree2: &PharmacophoreTree) -> f64 {
    TreeMatcher::new(tree1, tree2).match_search().sim()
}

/// Match search state for one ordered pair of trees.
///
/// The memo table holds one slot per pair of subtrees, indexed by their
/// [`subtree_key`]s, and stays valid for the lifetime of the matcher.
pub struct TreeMatcher<'a, S = MunkresSolver> {
    tree1: &'a PharmacophoreTree,
    tree2: &'a PharmacophoreTree,
    config: MatcherConfig,
    solver: S,
    memo: Vec<Option<Option<TreeMatching>>>,
    keys2: usize,
}

impl<'a> TreeMatcher<'a, MunkresSolver> {
    pub fn new(tree1: &'a PharmacophoreTree, tree2: &'a PharmacophoreTree) -> Self {
        Self::build(tree1, tree2, MatcherConfig::default(), MunkresSolver)
    }

    pub fn with_config(
        tree1: &'a PharmacophoreTree,
        tree2: &'a PharmacophoreTree,
        config: MatcherConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_solver(tree1, tree2, config, MunkresSolver)
    }
}

impl<'a, S: AssignmentSolver> TreeMatcher<'a, S> {
    pub fn with_solver(
        tree1: &'a PharmacophoreTree,
        tree2: &'a PharmacophoreTree,
        config: MatcherConfig,
        solver: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(tree1, tree2, config, solver))
    }

    fn build(
        tree1: &'a PharmacophoreTree,
        tree2: &'a PharmacophoreTree,
        config: MatcherConfig,
        solver: S,
    ) -> Self {
        let keys1 = 2 * tree1.edge_count();
        let keys2 = 2 * tree2.edge_count();
        Self {
            tree1,
            tree2,
            config,
            solver,
            memo: vec![None; keys1 * keys2],
            keys2,
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Find the best matching of the two trees.
    pub fn match_search(&mut self) -> TreeMatching {
        let (tree1, tree2) = (self.tree1, self.tree2);
        let all1: Vec<NodeIndex> = tree1.nodes().collect();
        let all2: Vec<NodeIndex> = tree2.nodes().collect();
        if all1.is_empty() || all2.is_empty() || tree1.edge_count() == 0 || tree2.edge_count() == 0
        {
            return self
                .assess_match(&all1, &all2)
                .unwrap_or_else(|| self.null_matching(all1, all2));
        }

        let subtrees1 = tree1.subtrees();
        let subtrees2 = tree2.subtrees();
        let splits = self.split_scores(&subtrees1, &subtrees2);

        let mut best: Option<TreeMatching> = None;
        for candidate in top_k(&splits, self.config.initial_splits) {
            let edge1 = EdgeIndex::new(candidate.row);
            let edge2 = EdgeIndex::new(candidate.col / 2);
            let dir2 = CutDirection::from_bit(candidate.col);
            debug!(
                "split candidate: edge {} vs edge {} ({:?}), score {:.4}",
                edge1.index(),
                edge2.index(),
                dir2,
                candidate.value
            );

            let source1 = &subtrees1[subtree_key(edge1, CutDirection::Right)];
            let target1 = &subtrees1[subtree_key(edge1, CutDirection::Left)];
            let source2 = &subtrees2[subtree_key(edge2, dir2.reverse())];
            let target2 = &subtrees2[subtree_key(edge2, dir2)];

            let Some(mut matching) = self.extension_match(source1, source2) else {
                continue;
            };
            let Some(target) = self.extension_match(target1, target2) else {
                continue;
            };
            matching.merge(target);
            debug!("split candidate matched with similarity {:.4}", matching.sim());
            if best.as_ref().map_or(true, |b| matching.sim() > b.sim()) {
                best = Some(matching);
            }
        }

        match best {
            Some(matching) => matching,
            None => {
                debug!("no split candidate produced a matching");
                self.null_matching(all1, all2)
            }
        }
    }

    /// Score every `(edge1, edge2, direction2)` split; the first tree is
    /// always cut `Left`. Columns are `subtree_key(edge2, direction2)`.
    fn split_scores(&self, subtrees1: &[Subtree], subtrees2: &[Subtree]) -> ScoreMatrix {
        let profiles1: Vec<FeatureProfile> =
            subtrees1.iter().map(|s| self.tree1.profile(s.nodes())).collect();
        let profiles2: Vec<FeatureProfile> =
            subtrees2.iter().map(|s| self.tree2.profile(s.nodes())).collect();
        let beta = self.config.beta;

        ScoreMatrix::from_fn(self.tree1.edge_count(), self.keys2, |row, col| {
            let edge1 = EdgeIndex::new(row);
            let src1 = subtree_key(edge1, CutDirection::Right);
            let tgt1 = subtree_key(edge1, CutDirection::Left);
            let tgt2 = col;
            let src2 = col ^ 1;

            let direct = 0.5
                * (profiles1[src1].similarity(&profiles2[src2])
                    + profiles1[tgt1].similarity(&profiles2[tgt2]));
            let fraction = |src: &Subtree, tgt: &Subtree| {
                src.node_count() as f64 / (src.node_count() + tgt.node_count()) as f64
            };
            let balance = 1.0
                - (fraction(&subtrees1[src1], &subtrees1[tgt1])
                    - fraction(&subtrees2[src2], &subtrees2[tgt2]))
                .abs();
            (1.0 - beta) * direct + beta * balance
        })
    }

    /// Best matching of two subtrees, or `None` when no extension cut pair
    /// could be matched.
    pub fn extension_match(&mut self, sub1: &Subtree, sub2: &Subtree) -> Option<TreeMatching> {
        let slot = sub1.key() * self.keys2 + sub2.key();
        if let Some(cached) = &self.memo[slot] {
            trace!("memo hit for subtrees {} / {}", sub1.key(), sub2.key());
            return cached.clone();
        }
        let result = match self.assess_match(sub1.nodes(), sub2.nodes()) {
            Some(simple) => Some(simple),
            None => self.expand(sub1, sub2),
        };
        self.memo[slot] = Some(result.clone());
        result
    }

    /// Base case. Small node sets are matched as a whole, or as two null
    /// matches when their sizes are too far apart. Returns `None` when
    /// both sets are big enough to be cut further.
    fn assess_match(&self, nodes1: &[NodeIndex], nodes2: &[NodeIndex]) -> Option<TreeMatching> {
        let size1 = self.tree1.profile(nodes1).size();
        let size2 = self.tree2.profile(nodes2).size();
        let limit = self.config.match_size_limit;
        let simple = size1 < limit || size2 < limit || nodes1.len() < 2 || nodes2.len() < 2;
        if !simple {
            return None;
        }
        if within_balance(size1, size2, self.config.match_balance) {
            let mut matching = TreeMatching::new(self.config.null_match_scaling);
            matching.add_match(FeatureMatch::new(
                self.tree1,
                nodes1.to_vec(),
                self.tree2,
                nodes2.to_vec(),
            ));
            Some(matching)
        } else {
            Some(self.null_matching(nodes1.to_vec(), nodes2.to_vec()))
        }
    }

    /// Extension regions are paired only if both are non-empty and they
    /// are not both large and imbalanced.
    fn assess_extension_match(&self, ext1: &[NodeIndex], ext2: &[NodeIndex]) -> bool {
        if ext1.is_empty() || ext2.is_empty() {
            return false;
        }
        let size1 = self.tree1.profile(ext1).size();
        let size2 = self.tree2.profile(ext2).size();
        within_balance(size1, size2, self.config.match_balance)
            || size1.max(size2) < self.config.match_size_limit
    }

    fn expand(&mut self, sub1: &Subtree, sub2: &Subtree) -> Option<TreeMatching> {
        let limit = self.config.extension_node_limit;
        let cuts1: Vec<CutString> = sub1.extension_cuts(limit).collect();
        let cuts2: Vec<CutString> = sub2.extension_cuts(limit).collect();
        let fast1: Vec<CutNodes> = cuts1.iter().map(|c| sub1.enumerate_fast(c)).collect();
        let fast2: Vec<CutNodes> = cuts2.iter().map(|c| sub2.enumerate_fast(c)).collect();

        let scores = ScoreMatrix::from_fn(cuts1.len(), cuts2.len(), |i, j| {
            self.score_extension_pair(&fast1[i], &fast2[j])
        });

        let mut best: Option<TreeMatching> = None;
        for ranked in top_k(&scores, self.config.extension_matches.saturating_add(1)) {
            trace!(
                "extension pair {}/{} for subtrees {} / {}, score {:.4}",
                ranked.row,
                ranked.col,
                sub1.key(),
                sub2.key(),
                ranked.value
            );
            let Some(matching) =
                self.match_extension_pair(sub1, &cuts1[ranked.row], sub2, &cuts2[ranked.col])
            else {
                continue;
            };
            if best.as_ref().map_or(true, |b| matching.sim() > b.sim()) {
                best = Some(matching);
            }
        }
        best
    }

    fn score_extension_pair(&self, cut1: &CutNodes, cut2: &CutNodes) -> f64 {
        let alpha = self.config.alpha;
        let extension = set_similarity(self.tree1, &cut1.extension, self.tree2, &cut2.extension);
        let sources = set_similarity(self.tree1, &cut1.sources, self.tree2, &cut2.sources);
        alpha * extension + (1.0 - alpha) * sources
    }

    fn match_extension_pair(
        &mut self,
        sub1: &Subtree,
        cut1: &CutString,
        sub2: &Subtree,
        cut2: &CutString,
    ) -> Option<TreeMatching> {
        let full1 = sub1.enumerate_full(cut1);
        let full2 = sub2.enumerate_full(cut2);
        if !self.assess_extension_match(&full1.extension, &full2.extension) {
            return None;
        }

        let mut matching = TreeMatching::new(self.config.null_match_scaling);
        matching.add_match(FeatureMatch::new(
            self.tree1,
            full1.extension,
            self.tree2,
            full2.extension,
        ));

        let (n1, n2) = (full1.children.len(), full2.children.len());
        let mut children: Vec<Option<TreeMatching>> = Vec::with_capacity(n1 * n2);
        for child1 in &full1.children {
            for child2 in &full2.children {
                children.push(self.extension_match(child1, child2));
            }
        }
        let scores = ScoreMatrix::from_fn(n1, n2, |i, j| {
            children[i * n2 + j].as_ref().map_or(0.0, TreeMatching::sim)
        });
        let pairs = match assign(&self.solver, &scores) {
            Ok(pairs) => pairs,
            Err(err) => {
                warn!("child assignment failed for subtrees {} / {}: {err}", sub1.key(), sub2.key());
                return None;
            }
        };

        let mut paired1 = vec![false; n1];
        let mut paired2 = vec![false; n2];
        for (i, j) in pairs {
            if let Some(child) = children[i * n2 + j].take() {
                matching.merge(child);
                paired1[i] = true;
                paired2[j] = true;
            }
        }
        for (child, _) in full1.children.iter().zip(&paired1).filter(|(_, &p)| !p) {
            matching.add_match(FeatureMatch::null_first(self.tree1, child.nodes().to_vec()));
        }
        for (child, _) in full2.children.iter().zip(&paired2).filter(|(_, &p)| !p) {
            matching.add_match(FeatureMatch::null_second(self.tree2, child.nodes().to_vec()));
        }
        Some(matching)
    }

    fn null_matching(&self, nodes1: Vec<NodeIndex>, nodes2: Vec<NodeIndex>) -> TreeMatching {
        let mut matching = TreeMatching::new(self.config.null_match_scaling);
        matching.add_match(FeatureMatch::null_first(self.tree1, nodes1));
        matching.add_match(FeatureMatch::null_second(self.tree2, nodes2));
        matching
    }
}

/// Whether the larger of two sizes is at most `balance` times the smaller.
/// Two vanishing sizes are balanced; one vanishing size is not.
fn within_balance(a: f64, b: f64, balance: f64) -> bool {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    if hi <= 0.0 {
        return true;
    }
    lo > 0.0 && hi <= balance * lo
}
