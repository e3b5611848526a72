//! Maximum-weight bipartite assignment.
//!
//! The matcher pairs the child subtrees of two extension cuts through an
//! [`AssignmentSolver`]. Solvers only need to handle `rows <= cols`;
//! [`assign`] takes care of orientation and empty inputs.

use std::fmt;

use munkres::{solve_assignment, WeightMatrix};

use crate::top_k::ScoreMatrix;

/// Error returned by an [`AssignmentSolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    /// The score matrix contains NaN or infinite entries.
    NonFinite,
    /// The solver could not produce a complete assignment.
    Unsolvable,
}

impl fmt::Display for AssignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite => write!(f, "score matrix contains non-finite entries"),
            Self::Unsolvable => write!(f, "no complete assignment exists"),
        }
    }
}

impl std::error::Error for AssignmentError {}

/// Solves the assignment problem for a score matrix with `rows <= cols`,
/// maximizing the summed score. Returns `(row, col)` pairs, one per row.
pub trait AssignmentSolver {
    fn solve(&self, scores: &ScoreMatrix) -> Result<Vec<(usize, usize)>, AssignmentError>;
}

/// Hungarian-algorithm solver backed by the `munkres` crate.
///
/// The score matrix is padded to a square cost matrix: real entries cost
/// `max - score`, padded rows cost nothing, so the optimum over real rows
/// is the maximum-weight assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct MunkresSolver;

impl AssignmentSolver for MunkresSolver {
    fn solve(&self, scores: &ScoreMatrix) -> Result<Vec<(usize, usize)>, AssignmentError> {
        let (rows, cols) = (scores.rows(), scores.cols());
        if scores.is_empty() {
            return Ok(Vec::new());
        }
        if scores.values().iter().any(|v| !v.is_finite()) {
            return Err(AssignmentError::NonFinite);
        }
        let max = scores.max_value().unwrap_or(0.0);
        let n = rows.max(cols);
        let mut weights = WeightMatrix::from_fn(n, |(r, c)| {
            if r < rows && c < cols {
                max - scores[(r, c)]
            } else {
                0.0
            }
        });
        let positions =
            solve_assignment(&mut weights).map_err(|_| AssignmentError::Unsolvable)?;
        let mut pairs: Vec<(usize, usize)> = positions
            .into_iter()
            .filter(|p| p.row < rows && p.column < cols)
            .map(|p| (p.row, p.column))
            .collect();
        pairs.sort_unstable();
        Ok(pairs)
    }
}

/// Run `solver` on `scores` in whichever orientation it accepts.
///
/// Returns an empty assignment when either dimension is zero. When there
/// are more rows than columns the matrix is transposed before solving and
/// the pairs are flipped back, so they always index `scores` as
/// `(row, col)`, sorted by row.
pub fn assign<S: AssignmentSolver + ?Sized>(
    solver: &S,
    scores: &ScoreMatrix,
) -> Result<Vec<(usize, usize)>, AssignmentError> {
    if scores.is_empty() {
        return Ok(Vec::new());
    }
    if scores.rows() <= scores.cols() {
        return solver.solve(scores);
    }
    let mut pairs: Vec<(usize, usize)> = solver
        .solve(&scores.transpose())?
        .into_iter()
        .map(|(c, r)| (r, c))
        .collect();
    pairs.sort_unstable();
    Ok(pairs)
}
