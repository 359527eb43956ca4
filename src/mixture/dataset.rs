use serde::{Deserialize, Serialize};

use crate::{DMatrix, DVector, Float, MixtureError, Result};

/// An immutable `n×d` data matrix: `n ≥ 2` observations (rows) of `d ≥ 1` finite features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    data: DMatrix<Float>,
}

impl Dataset {
    /// Validate and wrap a data matrix.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if there are fewer than two rows, no columns, or
    /// any entry is not finite.
    pub fn new(data: DMatrix<Float>) -> Result<Self> {
        if data.nrows() < 2 {
            return Err(MixtureError::InvalidArgument(format!(
                "the data must have at least 2 observations (got {})",
                data.nrows()
            )));
        }
        if data.ncols() < 1 {
            return Err(MixtureError::InvalidArgument(
                "the data must have at least one feature".to_string(),
            ));
        }
        if let Some(index) = data.iter().position(|v| !v.is_finite()) {
            let (row, col) = (index % data.nrows(), index / data.nrows());
            return Err(MixtureError::InvalidArgument(format!(
                "the data contain a non-finite entry at row {row}, column {col}"
            )));
        }
        Ok(Self { data })
    }

    /// Build a dataset from equal-length rows.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] for ragged rows, and everything
    /// [`Dataset::new`] rejects.
    pub fn from_rows<R: AsRef<[Float]>>(rows: &[R]) -> Result<Self> {
        let d = rows.first().map_or(0, |r| r.as_ref().len());
        if let Some(i) = rows.iter().position(|r| r.as_ref().len() != d) {
            return Err(MixtureError::InvalidArgument(format!(
                "row {i} has {} features but row 0 has {d}",
                rows[i].as_ref().len()
            )));
        }
        let flat: Vec<Float> = rows.iter().flat_map(|r| r.as_ref().to_vec()).collect();
        Self::new(DMatrix::from_row_slice(rows.len(), d, &flat))
    }

    /// Number of observations.
    pub fn n(&self) -> usize {
        self.data.nrows()
    }

    /// Number of features.
    pub fn d(&self) -> usize {
        self.data.ncols()
    }

    /// The underlying matrix.
    pub const fn matrix(&self) -> &DMatrix<Float> {
        &self.data
    }

    /// One observation as a contiguous vector.
    pub fn row(&self, i: usize) -> Vec<Float> {
        self.data.row(i).iter().copied().collect()
    }

    /// Per-feature means.
    pub fn column_means(&self) -> DVector<Float> {
        self.data.row_mean().transpose()
    }

    /// Per-feature standard deviations (population normalization).
    pub fn column_std(&self) -> DVector<Float> {
        self.data.row_variance().transpose().map(Float::sqrt)
    }

    /// The maximum-likelihood covariance of all observations.
    pub fn covariance(&self) -> DMatrix<Float> {
        let means = self.column_means();
        let centered = DMatrix::from_fn(self.n(), self.d(), |i, j| self.data[(i, j)] - means[j]);
        centered.transpose() * &centered / self.n() as Float
    }
}
