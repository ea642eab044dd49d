//! Sparse linear algebra for the global flattening solve.
//!
//! A minimal square CSR matrix plus a conjugate gradient solver. The solver
//! is deliberately best-effort: hitting the iteration cap is reported through
//! [`CgOutcome::converged`], never as an error, because the caller treats a
//! partially converged layout as a usable (if warned-about) result.

use nalgebra::DVector;

/// Square sparse matrix in compressed sparse row format.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Build an `n`×`n` matrix from (row, col, value) triplets.
    ///
    /// Triplets may arrive in any order; duplicates at the same position are
    /// summed. Entries are bucketed per row, then each row is sorted and
    /// merged, so construction is O(nnz log k) for rows of k entries.
    pub fn from_triplets(n: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut row_buckets: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for &(row, col, val) in triplets {
            debug_assert!(row < n && col < n);
            row_buckets[row].push((col, val));
        }

        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::with_capacity(triplets.len());
        let mut values = Vec::with_capacity(triplets.len());

        row_ptr.push(0);
        for bucket in &mut row_buckets {
            bucket.sort_unstable_by_key(|&(col, _)| col);
            let mut last_col = usize::MAX;
            for &(col, val) in bucket.iter() {
                if col == last_col {
                    *values.last_mut().unwrap() += val;
                } else {
                    col_idx.push(col);
                    values.push(val);
                    last_col = col;
                }
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            n,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Matrix dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Number of stored non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.n, "vector dimension mismatch");

        let mut y = DVector::zeros(self.n);
        for i in 0..self.n {
            let mut sum = 0.0;
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            y[i] = sum;
        }
        y
    }
}

/// Result of a conjugate gradient solve.
#[derive(Debug, Clone)]
pub struct CgOutcome {
    /// The (possibly only approximate) solution.
    pub x: DVector<f64>,
    /// Iterations actually run.
    pub iterations: usize,
    /// Whether the relative residual dropped below tolerance.
    pub converged: bool,
}

/// Solve A*x = b for symmetric positive definite A.
///
/// `x0` provides a warm start; the flattening loop passes the previous
/// iteration's coordinates, which keeps later solves cheap. Returns the best
/// iterate found even when the residual tolerance was not reached.
pub fn conjugate_gradient(
    a: &SparseMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> CgOutcome {
    let n = b.len();
    assert_eq!(a.dim(), n, "matrix-vector dimension mismatch");

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };

    let b_norm = b.norm();
    if b_norm < 1e-15 {
        return CgOutcome {
            x: DVector::zeros(n),
            iterations: 0,
            converged: true,
        };
    }

    let mut r = b - a.mul_vec(&x);
    let mut r_norm_sq = r.dot(&r);
    if r_norm_sq.sqrt() / b_norm < tolerance {
        return CgOutcome {
            x,
            iterations: 0,
            converged: true,
        };
    }

    let mut p = r.clone();

    for iter in 0..max_iter {
        let ap = a.mul_vec(&p);

        let p_ap = p.dot(&ap);
        if p_ap.abs() < 1e-15 {
            // Numerically singular direction; stop with what we have.
            return CgOutcome {
                x,
                iterations: iter,
                converged: false,
            };
        }
        let alpha = r_norm_sq / p_ap;

        x += alpha * &p;
        r -= alpha * &ap;

        let new_r_norm_sq = r.dot(&r);
        if new_r_norm_sq.sqrt() / b_norm < tolerance {
            return CgOutcome {
                x,
                iterations: iter + 1,
                converged: true,
            };
        }

        let beta = new_r_norm_sq / r_norm_sq;
        p = &r + beta * &p;
        r_norm_sq = new_r_norm_sq;
    }

    CgOutcome {
        x,
        iterations: max_iter,
        converged: false,
    }
}
