//! Dense score matrices and partial top-K selection over them.

use std::ops::{Index, IndexMut};

/// Row-major matrix of scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ScoreMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                data.push(f(row, col));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    pub fn transpose(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |row, col| self[(col, row)])
    }

    /// Largest entry, ignoring NaN. `None` for an empty matrix.
    pub fn max_value(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |best, v| Some(best.map_or(v, |b: f64| b.max(v))))
    }
}

impl Index<(usize, usize)> for ScoreMatrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(row < self.rows && col < self.cols, "score matrix index out of bounds");
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for ScoreMatrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(row < self.rows && col < self.cols, "score matrix index out of bounds");
        &mut self.data[row * self.cols + col]
    }
}

/// One selected matrix entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub value: f64,
    pub row: usize,
    pub col: usize,
}

/// The `k` largest entries of `matrix`, highest first.
///
/// Entries are kept in an insertion-sorted buffer of at most `k`
/// elements, so only entries that beat the current `k`-th best pay for a
/// binary search and shift. Equal values keep row-major order. NaN
/// entries are skipped.
pub fn top_k(matrix: &ScoreMatrix, k: usize) -> Vec<Ranked> {
    if k == 0 {
        return Vec::new();
    }
    let mut best: Vec<Ranked> = Vec::with_capacity(k.min(matrix.rows * matrix.cols) + 1);
    for row in 0..matrix.rows {
        for col in 0..matrix.cols {
            let value = matrix[(row, col)];
            if value.is_nan() {
                continue;
            }
            if best.len() == k && value <= best[k - 1].value {
                continue;
            }
            let pos = best.partition_point(|r| r.value >= value);
            best.insert(pos, Ranked { value, row, col });
            best.truncate(k);
        }
    }
    best
}
