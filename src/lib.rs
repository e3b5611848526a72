pub mod assignment;
pub mod cut;
pub mod feature;
pub mod matcher;
pub mod matching;
pub mod top_k;
pub mod tree;

pub use assignment::{assign, AssignmentError, AssignmentSolver, MunkresSolver};
pub use cut::{CutNodes, CutState, CutString, ExtensionCut, ExtensionCuts};
pub use feature::{
    ratio_sim, set_similarity, size_ratio_exceeded, FeatureNode, FeatureProfile, Functionality,
    NodeMetrics, NodeRole, CATEGORY_WEIGHTS, FUNCTIONALITY_COUNT, SIZE_RATIO,
};
pub use matcher::{similarity, ConfigError, MatcherConfig, TreeMatcher};
pub use matching::{FeatureMatch, TreeMatching, NULL_MATCH_SCALING};
pub use top_k::{top_k, Ranked, ScoreMatrix};
pub use tree::{subtree_key, CutDirection, InitialCut, PharmacophoreTree, Subtree, TreeError};
