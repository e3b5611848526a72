//! Extension cuts of a subtree.
//!
//! A cut string labels every edge of a [`Subtree`] (in its breadth-first
//! order) with a [`CutState`]. Edges labelled [`CutState::Extension`]
//! form the extension match, a connected region around the head that is
//! compared directly against the other tree. Each [`CutState::CutPoint`]
//! edge leaves that region and starts a child subtree; the rest of that
//! child is labelled [`CutState::Inside`].

use petgraph::graph::NodeIndex;

use crate::tree::Subtree;

/// Label of one edge in a cut string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CutState {
    Extension,
    CutPoint,
    Inside,
}

impl CutState {
    /// Numeric code: `0`, `1` and `-1` respectively.
    pub fn code(self) -> i8 {
        match self {
            Self::Extension => 0,
            Self::CutPoint => 1,
            Self::Inside => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CutString {
    states: Vec<CutState>,
}

impl CutString {
    /// The starting string: the root edge is the only cut point, so the
    /// whole subtree is one child and the extension region is empty.
    pub fn seed(len: usize) -> Self {
        let mut states = vec![CutState::Inside; len];
        if let Some(first) = states.first_mut() {
            *first = CutState::CutPoint;
        }
        Self { states }
    }

    pub fn states(&self) -> &[CutState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn codes(&self) -> Vec<i8> {
        self.states.iter().map(|s| s.code()).collect()
    }

    /// Number of nodes in the extension region.
    pub fn extension_node_count(&self) -> usize {
        self.states
            .iter()
            .filter(|&&s| s == CutState::Extension)
            .count()
    }

    pub fn cut_points(&self) -> impl Iterator<Item = usize> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, &s)| s == CutState::CutPoint)
            .map(|(i, _)| i)
    }
}

/// Iterator over the extension cuts of a subtree.
///
/// Starting from [`CutString::seed`], each step moves the boundary one
/// edge further along the breadth-first order: the boundary edge joins
/// the extension region and the edges hanging off its far endpoint
/// become cut points. Because parents precede children in the order,
/// every prefix is connected and the boundary edge is always a cut point
/// before it is absorbed. Iteration ends once the region would hold more
/// than `node_limit` nodes or the last edge has been absorbed.
/// A cut string over the limit is never yielded.
#[derive(Debug, Clone)]
pub struct ExtensionCuts<'s> {
    subtree: &'s Subtree,
    current: CutString,
    boundary: usize,
    node_limit: usize,
}

impl Iterator for ExtensionCuts<'_> {
    type Item = CutString;

    fn next(&mut self) -> Option<CutString> {
        let b = self.boundary;
        if b >= self.current.len() || b + 1 > self.node_limit {
            return None;
        }
        debug_assert_eq!(self.current.states[b], CutState::CutPoint);
        self.current.states[b] = CutState::Extension;
        for i in b + 1..self.current.len() {
            if self.subtree.parents[i] == Some(b) {
                self.current.states[i] = CutState::CutPoint;
            }
        }
        self.boundary += 1;
        Some(self.current.clone())
    }
}

/// Flat node sets of a cut, enough to score it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutNodes {
    /// Nodes of the extension region, head first.
    pub extension: Vec<NodeIndex>,
    /// Head node of every child subtree.
    pub sources: Vec<NodeIndex>,
}

/// A cut with its child subtrees materialized for recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionCut {
    pub extension: Vec<NodeIndex>,
    pub children: Vec<Subtree>,
}

impl Subtree {
    /// Enumerate extension cuts whose region holds at most `node_limit`
    /// nodes.
    pub fn extension_cuts(&self, node_limit: usize) -> ExtensionCuts<'_> {
        ExtensionCuts {
            subtree: self,
            current: CutString::seed(self.edges.len()),
            boundary: 0,
            node_limit,
        }
    }

    pub fn enumerate_fast(&self, cut: &CutString) -> CutNodes {
        let mut extension = Vec::new();
        let mut sources = Vec::new();
        for (i, state) in cut.states.iter().enumerate() {
            match state {
                CutState::Extension => extension.push(self.far[i]),
                CutState::CutPoint => sources.push(self.far[i]),
                CutState::Inside => {}
            }
        }
        CutNodes { extension, sources }
    }

    /// Like [`enumerate_fast`](Self::enumerate_fast), but rebuild each
    /// child's own breadth-first edge and parent lists from this
    /// subtree's parent pointers.
    pub fn enumerate_full(&self, cut: &CutString) -> ExtensionCut {
        let len = cut.len();
        let mut extension = Vec::new();
        let mut children: Vec<Subtree> = Vec::new();
        // (child, position within child) of every edge outside the region
        let mut owner: Vec<Option<(usize, usize)>> = vec![None; len];

        for i in 0..len {
            match cut.states[i] {
                CutState::Extension => extension.push(self.far[i]),
                CutState::CutPoint => {
                    let mut child = Subtree {
                        edges: Vec::new(),
                        parents: Vec::new(),
                        far: Vec::new(),
                        directions: Vec::new(),
                    };
                    child.push(self.edges[i], None, self.far[i], self.directions[i]);
                    owner[i] = Some((children.len(), 0));
                    children.push(child);
                }
                CutState::Inside => {
                    let Some((k, local_parent)) = self.parents[i].and_then(|p| owner[p]) else {
                        continue;
                    };
                    let child = &mut children[k];
                    owner[i] = Some((k, child.edges.len()));
                    child.push(self.edges[i], Some(local_parent), self.far[i], self.directions[i]);
                }
            }
        }
        ExtensionCut {
            extension,
            children,
        }
    }
}
