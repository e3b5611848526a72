use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pharmtree::{
    similarity, top_k, CutDirection, FeatureNode, PharmacophoreTree, ScoreMatrix, TreeMatcher,
};

const TRIALS: usize = 40;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A random tree of `n` nodes. Every node gets a distinct lipophilic count
/// so no two nodes look alike.
fn random_tree(rng: &mut StdRng, n: usize) -> PharmacophoreTree {
    let mut next_atom = 0;
    let nodes = (0..n)
        .map(|i| {
            let mut f = [0u32; 6];
            for count in f.iter_mut().take(4) {
                *count = rng.gen_range(0..=1);
            }
            f[4] = i as u32 + 1;
            f[5] = rng.gen_range(0..=1);
            let atoms = rng.gen_range(1..=4);
            let volumes: Vec<(usize, f64)> = (next_atom..next_atom + atoms)
                .map(|a| (a, rng.gen_range(5.0..20.0)))
                .collect();
            next_atom += atoms;
            FeatureNode::new(f, volumes)
        })
        .collect();
    let edges: Vec<(usize, usize)> = (1..n).map(|i| (rng.gen_range(0..i), i)).collect();
    PharmacophoreTree::from_parts(nodes, &edges).unwrap()
}

#[test]
fn random_trees_match_themselves() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..TRIALS {
        let n = rng.gen_range(1..=10);
        let tree = random_tree(&mut rng, n);
        let sim = similarity(&tree, &tree);
        assert!((sim - 1.0).abs() < 1e-9, "{n} nodes: {sim}");
    }
}

#[test]
fn random_pairs_stay_in_range() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..TRIALS {
        let n1 = rng.gen_range(1..=9);
        let n2 = rng.gen_range(1..=9);
        let t1 = random_tree(&mut rng, n1);
        let t2 = random_tree(&mut rng, n2);
        for sim in [similarity(&t1, &t2), similarity(&t2, &t1)] {
            assert!((0.0..=1.0 + 1e-9).contains(&sim), "{n1} vs {n2}: {sim}");
        }
    }
}

#[test]
fn matchings_cover_both_trees() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..TRIALS {
        let n1 = rng.gen_range(1..=8);
        let n2 = rng.gen_range(1..=8);
        let t1 = random_tree(&mut rng, n1);
        let t2 = random_tree(&mut rng, n2);
        let matching = TreeMatcher::new(&t1, &t2).match_search();

        let mut covered1 = vec![0usize; n1];
        let mut covered2 = vec![0usize; n2];
        for m in matching.matches() {
            for n in m.nodes1() {
                covered1[n.index()] += 1;
            }
            for n in m.nodes2() {
                covered2[n.index()] += 1;
            }
        }
        assert!(covered1.iter().all(|&c| c == 1), "{covered1:?}");
        assert!(covered2.iter().all(|&c| c == 1), "{covered2:?}");
    }
}

#[test]
fn top_k_agrees_with_full_sort() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..TRIALS {
        let rows = rng.gen_range(0..8);
        let cols = rng.gen_range(0..8);
        let k = rng.gen_range(0..12);
        let matrix = ScoreMatrix::from_fn(rows, cols, |_, _| rng.gen::<f64>());

        let mut expected: Vec<f64> = matrix.values().to_vec();
        expected.sort_by(|a, b| b.total_cmp(a));
        expected.truncate(k);

        let got: Vec<f64> = top_k(&matrix, k).iter().map(|r| r.value).collect();
        assert_eq!(got, expected);
        for r in top_k(&matrix, k) {
            assert_eq!(matrix[(r.row, r.col)], r.value);
        }
    }
}

#[test]
fn extension_cuts_respect_the_node_limit() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..TRIALS {
        let n = rng.gen_range(2..=10);
        let tree = random_tree(&mut rng, n);
        let limit = rng.gen_range(1..=4);
        for sub in tree.subtrees() {
            let cuts: Vec<_> = sub.extension_cuts(limit).collect();
            assert!(!cuts.is_empty());
            assert!(cuts.len() <= limit.min(sub.node_count()));
            for (i, cut) in cuts.iter().enumerate() {
                assert_eq!(cut.extension_node_count(), i + 1);

                let full = sub.enumerate_full(cut);
                let mut nodes: Vec<usize> = full.extension.iter().map(|n| n.index()).collect();
                for child in &full.children {
                    nodes.extend(child.nodes().iter().map(|n| n.index()));
                }
                nodes.sort_unstable();
                let mut expected: Vec<usize> = sub.nodes().iter().map(|n| n.index()).collect();
                expected.sort_unstable();
                assert_eq!(nodes, expected);

                let fast = sub.enumerate_fast(cut);
                assert_eq!(fast.extension, full.extension);
                let heads: Vec<_> = full.children.iter().map(|c| c.head()).collect();
                assert_eq!(fast.sources, heads);
            }
        }
    }
}

#[test]
fn opposite_subtrees_partition_the_tree() {
    let mut rng = StdRng::seed_from_u64(19);
    for _ in 0..TRIALS {
        let n = rng.gen_range(2..=10);
        let tree = random_tree(&mut rng, n);
        for edge in tree.edges() {
            let left = tree.subtree(edge, CutDirection::Left);
            let right = tree.subtree(edge, CutDirection::Right);
            assert_eq!(left.node_count() + right.node_count(), n);
            assert!(left.nodes().iter().all(|x| !right.nodes().contains(x)));
        }
    }
}
