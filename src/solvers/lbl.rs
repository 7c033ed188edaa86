//! Direct solution of sparse symmetric indefinite systems.
//!
//! The factorization boundary mirrors the interface of the usual Fortran
//! codes (MA27, MA57, MUMPS): the matrix is handed over as its lower
//! triangle in triplet form, duplicate entries sum up, and the inertia of
//! the factorized matrix is available afterwards. [`LblFactorization`] is
//! the built-in implementation, a dense Bunch-Kaufman LBLᵀ factorization
//! with symmetric pivoting.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Some Stable Methods for Calculating Inertia and Solving Symmetric
//! Linear Systems](https://doi.org/10.1090/S0025-5718-1977-0428694-0)

use log::debug;
use nalgebra::{DMatrix, DVector};
use sprs::TriMat;

use crate::core::error::NumericalError;

/// Interface of a direct solver for sparse symmetric indefinite systems.
///
/// The factorization is inertia-revealing, which the subproblems rely on for
/// inertia correction: a KKT matrix with inertia `(n, m, 0)` guarantees a
/// descent direction.
pub trait DirectSymmetricIndefiniteSolver {
    /// Factorizes the matrix given as its lower triangle in triplet form.
    /// Duplicate entries are summed.
    fn factorize(&mut self, matrix: &TriMat<f64>) -> Result<(), NumericalError>;

    /// Solves the system with the most recent factorization.
    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, NumericalError>;

    /// Inertia `(positive, negative, zero)` of the factorized matrix.
    fn inertia(&self) -> (usize, usize, usize);

    /// Number of negative eigenvalues of the factorized matrix.
    fn number_negative_eigenvalues(&self) -> usize {
        self.inertia().1
    }

    /// Whether the factorized matrix is singular.
    fn matrix_is_singular(&self) -> bool {
        self.inertia().2 > 0
    }

    /// Rank of the factorized matrix.
    fn rank(&self) -> usize {
        let (positive, negative, _) = self.inertia();
        positive + negative
    }
}

enum PivotBlock {
    Single(f64),
    /// Symmetric 2x2 pivot `[[a, b], [b, c]]`.
    Double { a: f64, b: f64, c: f64 },
}

/// Dense LBLᵀ (Bunch-Kaufman) factorization with symmetric pivoting.
///
/// `P A Pᵀ = L B Lᵀ` with `L` unit lower triangular and `B` block diagonal
/// with 1x1 and 2x2 blocks. The inertia is read off the blocks. Stands in
/// for the Fortran multifrontal codes behind the same interface.
pub struct LblFactorization {
    dimension: usize,
    lower: DMatrix<f64>,
    blocks: Vec<PivotBlock>,
    swaps: Vec<(usize, usize)>,
    inertia: (usize, usize, usize),
    pivot_tolerance: f64,
}

impl Default for LblFactorization {
    fn default() -> Self {
        Self::new()
    }
}

impl LblFactorization {
    /// Creates an empty factorization.
    pub fn new() -> Self {
        Self {
            dimension: 0,
            lower: DMatrix::zeros(0, 0),
            blocks: Vec::new(),
            swaps: Vec::new(),
            inertia: (0, 0, 0),
            pivot_tolerance: 0.0,
        }
    }

    fn assemble(matrix: &TriMat<f64>) -> DMatrix<f64> {
        let n = matrix.rows();
        let mut dense = DMatrix::zeros(n, n);
        for (&value, (i, j)) in matrix.triplet_iter() {
            // duplicate entries sum, off-diagonal entries mirror
            dense[(i, j)] += value;
            if i != j {
                dense[(j, i)] += value;
            }
        }
        dense
    }

    fn swap_symmetric(a: &mut DMatrix<f64>, lower: &mut DMatrix<f64>, i: usize, j: usize) {
        if i == j {
            return;
        }
        a.swap_rows(i, j);
        a.swap_columns(i, j);
        // previously computed multiplier rows move with the pivot rows
        let columns = i.min(j);
        for k in 0..columns {
            let t = lower[(i, k)];
            lower[(i, k)] = lower[(j, k)];
            lower[(j, k)] = t;
        }
    }
}

impl DirectSymmetricIndefiniteSolver for LblFactorization {
    fn factorize(&mut self, matrix: &TriMat<f64>) -> Result<(), NumericalError> {
        let n = matrix.rows();
        let mut a = Self::assemble(matrix);
        if a.iter().any(|v| !v.is_finite()) {
            return Err(NumericalError::Factorization("symmetric indefinite"));
        }

        let alpha = (1.0 + 17f64.sqrt()) / 8.0;
        let magnitude = a.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let tiny = 1e-14 * magnitude.max(1.0);

        self.dimension = n;
        self.lower = DMatrix::identity(n, n);
        self.blocks.clear();
        self.swaps.clear();
        self.inertia = (0, 0, 0);
        self.pivot_tolerance = tiny;

        let mut k = 0;
        while k < n {
            // largest off-diagonal entry of the pivot column
            let mut r = k;
            let mut lambda = 0.0;
            for i in (k + 1)..n {
                if a[(i, k)].abs() > lambda {
                    lambda = a[(i, k)].abs();
                    r = i;
                }
            }
            let diagonal = a[(k, k)].abs();

            let mut use_two_by_two = false;
            if lambda > tiny && diagonal < alpha * lambda {
                // Bunch-Kaufman test on the magnitudes of column r
                let mut sigma: f64 = 0.0;
                for i in k..n {
                    if i != r {
                        sigma = sigma.max(a[(i, r)].abs());
                    }
                }
                if diagonal * sigma < alpha * lambda * lambda {
                    if a[(r, r)].abs() >= alpha * sigma {
                        // 1x1 pivot on the swapped diagonal entry
                        Self::swap_symmetric(&mut a, &mut self.lower, k, r);
                        self.swaps.push((k, r));
                    } else {
                        // 2x2 pivot on rows/columns (k, k+1)
                        Self::swap_symmetric(&mut a, &mut self.lower, k + 1, r);
                        self.swaps.push((k + 1, r));
                        use_two_by_two = true;
                    }
                }
            }

            if !use_two_by_two {
                let d = a[(k, k)];
                if d.abs() <= tiny {
                    debug!("LBL^T: zero pivot at index {}", k);
                    self.blocks.push(PivotBlock::Single(0.0));
                    self.inertia.2 += 1;
                    k += 1;
                    continue;
                }
                if d > 0.0 {
                    self.inertia.0 += 1;
                } else {
                    self.inertia.1 += 1;
                }
                let column: Vec<f64> = ((k + 1)..n).map(|i| a[(i, k)]).collect();
                for (offset_i, i) in ((k + 1)..n).enumerate() {
                    let multiplier = column[offset_i] / d;
                    self.lower[(i, k)] = multiplier;
                    for (offset_j, j) in ((k + 1)..n).enumerate() {
                        a[(i, j)] -= multiplier * column[offset_j];
                    }
                }
                self.blocks.push(PivotBlock::Single(d));
                k += 1;
            } else {
                let (pa, pb, pc) = (a[(k, k)], a[(k + 1, k)], a[(k + 1, k + 1)]);
                let det = pa * pc - pb * pb;
                if det.abs() <= tiny * tiny {
                    debug!("LBL^T: singular 2x2 pivot at index {}", k);
                    self.blocks.push(PivotBlock::Single(0.0));
                    self.blocks.push(PivotBlock::Single(0.0));
                    self.inertia.2 += 2;
                    k += 2;
                    continue;
                }
                if det < 0.0 {
                    self.inertia.0 += 1;
                    self.inertia.1 += 1;
                } else if pa + pc > 0.0 {
                    self.inertia.0 += 2;
                } else {
                    self.inertia.1 += 2;
                }
                let column1: Vec<f64> = ((k + 2)..n).map(|i| a[(i, k)]).collect();
                let column2: Vec<f64> = ((k + 2)..n).map(|i| a[(i, k + 1)]).collect();
                for (offset_i, i) in ((k + 2)..n).enumerate() {
                    let l1 = (pc * column1[offset_i] - pb * column2[offset_i]) / det;
                    let l2 = (pa * column2[offset_i] - pb * column1[offset_i]) / det;
                    self.lower[(i, k)] = l1;
                    self.lower[(i, k + 1)] = l2;
                    for (offset_j, j) in ((k + 2)..n).enumerate() {
                        a[(i, j)] -= l1 * column1[offset_j] + l2 * column2[offset_j];
                    }
                }
                self.blocks.push(PivotBlock::Double {
                    a: pa,
                    b: pb,
                    c: pc,
                });
                k += 2;
            }
        }
        Ok(())
    }

    fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, NumericalError> {
        let n = self.dimension;
        assert_eq!(rhs.len(), n, "right-hand side has wrong dimension");
        let mut x = rhs.clone();

        for &(i, j) in &self.swaps {
            x.swap_rows(i, j);
        }
        // forward substitution with the unit lower factor
        for k in 0..n {
            let xk = x[k];
            if xk != 0.0 {
                for i in (k + 1)..n {
                    x[i] -= self.lower[(i, k)] * xk;
                }
            }
        }
        // block-diagonal solve
        let mut k = 0;
        for block in &self.blocks {
            match *block {
                PivotBlock::Single(d) => {
                    if d == 0.0 {
                        if x[k].abs() > self.pivot_tolerance {
                            return Err(NumericalError::Factorization("singular symmetric"));
                        }
                        x[k] = 0.0;
                    } else {
                        x[k] /= d;
                    }
                    k += 1;
                }
                PivotBlock::Double { a, b, c } => {
                    let det = a * c - b * b;
                    let (y1, y2) = (x[k], x[k + 1]);
                    x[k] = (c * y1 - b * y2) / det;
                    x[k + 1] = (a * y2 - b * y1) / det;
                    k += 2;
                }
            }
        }
        // backward substitution with the transposed factor
        for k in (0..n).rev() {
            let mut sum = 0.0;
            for i in (k + 1)..n {
                sum += self.lower[(i, k)] * x[i];
            }
            x[k] -= sum;
        }
        for &(i, j) in self.swaps.iter().rev() {
            x.swap_rows(i, j);
        }
        Ok(x)
    }

    fn inertia(&self) -> (usize, usize, usize) {
        self.inertia
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn triplets(n: usize, entries: &[(usize, usize, f64)]) -> TriMat<f64> {
        let mut matrix = TriMat::new((n, n));
        for &(i, j, v) in entries {
            matrix.add_triplet(i, j, v);
        }
        matrix
    }

    #[test]
    fn identity_is_positive_definite() {
        let matrix = triplets(3, &[(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)]);
        let mut solver = LblFactorization::new();
        solver.factorize(&matrix).unwrap();
        assert_eq!(solver.inertia(), (3, 0, 0));
        assert!(!solver.matrix_is_singular());
        assert_eq!(solver.rank(), 3);
    }

    #[test]
    fn indefinite_diagonal() {
        let matrix = triplets(3, &[(0, 0, 2.0), (1, 1, -3.0), (2, 2, 5.0)]);
        let mut solver = LblFactorization::new();
        solver.factorize(&matrix).unwrap();
        assert_eq!(solver.inertia(), (2, 1, 0));
        assert_eq!(solver.number_negative_eigenvalues(), 1);
    }

    #[test]
    fn saddle_point_inertia() {
        // [[2, 1], [1, 0]] has eigenvalues of opposite signs
        let matrix = triplets(2, &[(0, 0, 2.0), (1, 0, 1.0)]);
        let mut solver = LblFactorization::new();
        solver.factorize(&matrix).unwrap();
        assert_eq!(solver.inertia(), (1, 1, 0));
    }

    #[test]
    fn duplicate_triplets_sum() {
        // two halves of the same entry
        let matrix = triplets(1, &[(0, 0, 1.5), (0, 0, 1.5)]);
        let mut solver = LblFactorization::new();
        solver.factorize(&matrix).unwrap();
        let x = solver.solve(&DVector::from_vec(vec![6.0])).unwrap();
        assert_approx_eq!(f64, x[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_matrix_is_detected() {
        let matrix = triplets(2, &[(0, 0, 1.0)]);
        let mut solver = LblFactorization::new();
        solver.factorize(&matrix).unwrap();
        assert!(solver.matrix_is_singular());
        assert_eq!(solver.rank(), 1);
    }

    #[test]
    fn solves_indefinite_system() {
        // A = [[1, 2, 0], [2, -1, 1], [0, 1, 3]]
        let matrix = triplets(
            3,
            &[
                (0, 0, 1.0),
                (1, 0, 2.0),
                (1, 1, -1.0),
                (2, 1, 1.0),
                (2, 2, 3.0),
            ],
        );
        let mut solver = LblFactorization::new();
        solver.factorize(&matrix).unwrap();
        let b = DVector::from_vec(vec![5.0, 2.0, 10.0]);
        let x = solver.solve(&b).unwrap();
        // residual check against the assembled matrix
        let a = DMatrix::from_row_slice(
            3,
            3,
            &[1.0, 2.0, 0.0, 2.0, -1.0, 1.0, 0.0, 1.0, 3.0],
        );
        let residual = &a * &x - &b;
        assert!(residual.amax() < 1e-10);
    }

    #[test]
    fn solves_kkt_system_with_expected_inertia() {
        // [[H, Aᵀ], [A, 0]] with H = I (2x2), A = [1 1]
        let matrix = triplets(
            3,
            &[
                (0, 0, 1.0),
                (1, 1, 1.0),
                (2, 0, 1.0),
                (2, 1, 1.0),
            ],
        );
        let mut solver = LblFactorization::new();
        solver.factorize(&matrix).unwrap();
        assert_eq!(solver.inertia(), (2, 1, 0));

        // minimize 1/2||x||^2 - [1, 0]ᵀx subject to x1 + x2 = 1
        let b = DVector::from_vec(vec![1.0, 0.0, 1.0]);
        let x = solver.solve(&b).unwrap();
        assert_approx_eq!(f64, x[0], 1.0, epsilon = 1e-10);
        assert_approx_eq!(f64, x[1], 0.0, epsilon = 1e-10);
    }
}
