//! Small dense kernels over [`Scalar`], so factorizations and solves inside the likelihood are
//! differentiated along with everything else.
//!
//! Matrices are row-major slices; `a[i * cols + j]` is the entry in row `i`, column `j`.

use crate::ad::Scalar;

/// The `n×n` identity.
pub fn identity<S: Scalar>(n: usize) -> Vec<S> {
    let mut out = vec![S::zero(); n * n];
    for i in 0..n {
        out[i * n + i] = S::one();
    }
    out
}

/// Dot product of two equal-length slices.
#[inline]
pub fn dot<S: Scalar>(a: &[S], b: &[S]) -> S {
    a.iter().zip(b).map(|(&x, &y)| x * y).sum()
}

/// `Aᵀ·b` for an `n×m` matrix `A` and a length-`n` vector `b`.
pub fn transpose_matvec<S: Scalar>(a: &[S], b: &[S], n: usize, m: usize) -> Vec<S> {
    (0..m)
        .map(|j| (0..n).map(|i| a[i * m + j] * b[i]).sum())
        .collect()
}

/// Solve `L·y = b` for lower-triangular `L` (`n×n`).
pub fn forward_substitution<S: Scalar>(l: &[S], b: &[S], n: usize) -> Vec<S> {
    let mut y: Vec<S> = Vec::with_capacity(n);
    for i in 0..n {
        let partial: S = (0..i).map(|j| l[i * n + j] * y[j]).sum();
        y.push((b[i] - partial) / l[i * n + i]);
    }
    y
}

/// Lower Cholesky factor of a symmetric positive-definite `n×n` matrix, [`None`] if a pivot is
/// not positive.
pub fn cholesky<S: Scalar>(a: &[S], n: usize) -> Option<Vec<S>> {
    let mut l = vec![S::zero(); n * n];
    for i in 0..n {
        for j in 0..=i {
            let partial: S = (0..j).map(|k| l[i * n + k] * l[j * n + k]).sum();
            if i == j {
                let pivot = a[i * n + i] - partial;
                if pivot.value().is_nan() || pivot.value() <= 0.0 {
                    return None;
                }
                l[i * n + i] = pivot.sqrt();
            } else {
                l[i * n + j] = (a[i * n + j] - partial) / l[j * n + j];
            }
        }
    }
    Some(l)
}

/// Solve `A·X = B` for `A` (`n×n`) and `B` (`n×m`) by Gaussian elimination with partial
/// pivoting, [`None`] if `A` is numerically singular.
pub fn lu_solve<S: Scalar>(a: &[S], b: &[S], n: usize, m: usize) -> Option<Vec<S>> {
    let mut a = a.to_vec();
    let mut x = b.to_vec();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&r, &s| {
            a[r * n + col]
                .value()
                .abs()
                .total_cmp(&a[s * n + col].value().abs())
        })?;
        if a[pivot_row * n + col].value().abs() <= f64::EPSILON {
            return None;
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap(col * n + j, pivot_row * n + j);
            }
            for j in 0..m {
                x.swap(col * m + j, pivot_row * m + j);
            }
        }
        let pivot = a[col * n + col];
        for row in (col + 1)..n {
            let factor = a[row * n + col] / pivot;
            for j in col..n {
                a[row * n + j] = a[row * n + j] - factor * a[col * n + j];
            }
            for j in 0..m {
                x[row * m + j] = x[row * m + j] - factor * x[col * m + j];
            }
        }
    }
    for col in (0..n).rev() {
        let pivot = a[col * n + col];
        for j in 0..m {
            let partial: S = ((col + 1)..n)
                .map(|k| a[col * n + k] * x[k * m + j])
                .sum();
            x[col * m + j] = (x[col * m + j] - partial) / pivot;
        }
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn cholesky_reconstructs_matrix() {
        let a = [4.0, 2.0, 0.4, 2.0, 5.0, 1.0, 0.4, 1.0, 3.0];
        let l = cholesky(&a, 3).unwrap();
        let lt = DMatrix::from_row_slice(3, 3, &l).transpose();
        let rebuilt = DMatrix::from_row_slice(3, 3, &l) * lt;
        assert!(rebuilt.relative_eq(&DMatrix::from_row_slice(3, 3, &a), 1e-12, 1e-12));
        assert!(cholesky(&[1.0, 2.0, 2.0, 1.0], 2).is_none());
    }

    #[test]
    fn forward_substitution_solves_lower_system() {
        let l = [2.0, 0.0, 1.0, 3.0];
        let y = forward_substitution(&l, &[4.0, 11.0], 2);
        assert_relative_eq!(y[0], 2.0);
        assert_relative_eq!(y[1], 3.0);
    }

    #[test]
    fn lu_solve_matches_nalgebra() {
        let a = [0.0, 2.0, 1.0, 1.0, 1.0, 0.0, 3.0, 0.5, 2.0];
        let b = [1.0, 0.0, 2.0, 1.0, 3.0, -1.0];
        let x = lu_solve(&a, &b, 3, 2).unwrap();
        let expected = DMatrix::from_row_slice(3, 3, &a)
            .lu()
            .solve(&DMatrix::from_row_slice(3, 2, &b))
            .unwrap();
        for i in 0..3 {
            for j in 0..2 {
                assert_relative_eq!(x[i * 2 + j], expected[(i, j)], epsilon = 1e-12);
            }
        }
        assert!(lu_solve(&[1.0, 2.0, 2.0, 4.0], &[1.0, 1.0], 2, 1).is_none());
    }

    #[test]
    fn products() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
        assert_eq!(transpose_matvec(&a, &[1.0, -1.0], 2, 3), vec![-3.0, -3.0, -3.0]);
        assert_eq!(identity::<f64>(2), vec![1.0, 0.0, 0.0, 1.0]);
    }
}
