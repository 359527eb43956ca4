use serde::{Deserialize, Serialize};

use crate::{
    ad::Scalar,
    linalg,
    mixture::{Family, MixtureSpec, Tie},
    DMatrix, DVector, Float, MixtureError, Result,
};

/// What a stretch of the unconstrained vector parameterizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Mixing-weight logits; the last component's logit is pinned at zero.
    Logit,
    /// A component mean.
    Mean,
    /// A lower Cholesky factor, row by row, with the diagonal stored as its logarithm.
    Cholesky,
    /// $`\ln\lambda`$ of an MCLUST volume.
    LogVolume,
    /// The first `d - 1` log-entries of an MCLUST shape (the last is fixed by `det A = 1`).
    LogShape,
    /// Strictly-lower entries of the skew-symmetric generator of an MCLUST orientation.
    Rotation,
    /// A `d×q` factor loading matrix, row by row.
    Loading,
    /// Log error variances of a factor structure.
    LogNoise,
    /// Log degrees of freedom of t components.
    LogDof,
}

/// A named, contiguous block of the unconstrained vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBlock {
    /// Display name, e.g. `mean[1]`.
    pub name: String,
    /// What the block parameterizes.
    pub kind: BlockKind,
    /// Number of entries.
    pub len: usize,
}

/// The ordered blocks making up the unconstrained vector of a [`MixtureSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterLayout {
    blocks: Vec<ParameterBlock>,
}

impl ParameterLayout {
    fn push(&mut self, name: impl Into<String>, kind: BlockKind, len: usize) {
        if len > 0 {
            self.blocks.push(ParameterBlock {
                name: name.into(),
                kind,
                len,
            });
        }
    }

    fn push_tied(&mut self, name: &str, kind: BlockKind, len: usize, tie: Tie, k: usize) {
        match tie {
            Tie::Equal => self.push(name, kind, len),
            Tie::Variable => (0..k).for_each(|c| self.push(format!("{name}[{c}]"), kind, len)),
            Tie::Identity => {}
        }
    }

    /// Total length of the unconstrained vector.
    pub fn dimension(&self) -> usize {
        self.blocks.iter().map(|b| b.len).sum()
    }

    /// The blocks, in vector order.
    pub fn blocks(&self) -> &[ParameterBlock] {
        &self.blocks
    }

    /// The kind of every entry, in vector order.
    pub fn kinds(&self) -> Vec<BlockKind> {
        self.blocks
            .iter()
            .flat_map(|b| std::iter::repeat(b.kind).take(b.len))
            .collect()
    }

    /// A name for every entry, in vector order.
    pub fn parameter_names(&self) -> Vec<String> {
        self.blocks
            .iter()
            .flat_map(|b| {
                (0..b.len).map(move |i| {
                    if b.len == 1 {
                        b.name.clone()
                    } else {
                        format!("{}[{i}]", b.name)
                    }
                })
            })
            .collect()
    }
}

/// A component covariance in the structure its family parameterizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Covariance<S = Float> {
    /// $`\Sigma = LL^\intercal`$ with `factor` the row-major `d×d` lower factor.
    Cholesky {
        /// Lower-triangular factor with a positive diagonal.
        factor: Vec<S>,
    },
    /// $`\Sigma = \lambda D A D^\intercal`$.
    Eigen {
        /// Volume $`\lambda`$.
        volume: S,
        /// Diagonal of the shape $`A`$ (unit product).
        shape: Vec<S>,
        /// Row-major orthogonal orientation $`D`$, [`None`] for the identity.
        orientation: Option<Vec<S>>,
    },
    /// $`\Sigma = \Lambda\Lambda^\intercal + \Psi`$.
    Factor {
        /// Row-major `d×q` loadings $`\Lambda`$.
        loadings: Vec<S>,
        /// Diagonal of $`\Psi`$.
        noise: Vec<S>,
        /// Number of latent factors.
        q: usize,
    },
}

impl Covariance<Float> {
    /// The dense `d×d` covariance matrix.
    pub fn to_matrix(&self, d: usize) -> DMatrix<Float> {
        match self {
            Self::Cholesky { factor } => {
                let l = DMatrix::from_row_slice(d, d, factor);
                &l * l.transpose()
            }
            Self::Eigen {
                volume,
                shape,
                orientation,
            } => {
                let a = DMatrix::from_diagonal(&DVector::from_iterator(
                    d,
                    shape.iter().map(|s| s * volume),
                ));
                match orientation {
                    Some(o) => {
                        let rot = DMatrix::from_row_slice(d, d, o);
                        &rot * a * rot.transpose()
                    }
                    None => a,
                }
            }
            Self::Factor { loadings, noise, q } => {
                let lambda = DMatrix::from_row_slice(d, *q, loadings);
                &lambda * lambda.transpose()
                    + DMatrix::from_diagonal(&DVector::from_column_slice(noise))
            }
        }
    }
}

/// Mixing weights, means, covariances and (for t mixtures) degrees of freedom, as produced by
/// [`MixtureSpec::forward`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureParameters<S = Float> {
    /// Number of features.
    pub d: usize,
    /// Log mixing weights; their exponentials sum to one.
    pub log_weights: Vec<S>,
    /// One mean of length `d` per component.
    pub means: Vec<Vec<S>>,
    /// One covariance per component (tied structures repeat the shared value).
    pub covariances: Vec<Covariance<S>>,
    /// Degrees of freedom per component, for t mixtures only.
    pub dof: Option<Vec<S>>,
}

impl<S: Scalar> MixtureParameters<S> {
    /// Number of components.
    pub fn k(&self) -> usize {
        self.log_weights.len()
    }

    /// Mixing weights.
    pub fn weights(&self) -> Vec<S> {
        self.log_weights.iter().map(|&w| w.exp()).collect()
    }
}

impl MixtureParameters<Float> {
    /// Mean of component `c`.
    pub fn mean(&self, c: usize) -> DVector<Float> {
        DVector::from_column_slice(&self.means[c])
    }

    /// Dense covariance matrix of component `c`.
    pub fn covariance_matrix(&self, c: usize) -> DMatrix<Float> {
        self.covariances[c].to_matrix(self.d)
    }
}

struct Cursor<'a, S> {
    x: &'a [S],
    pos: usize,
}

impl<'a, S> Cursor<'a, S> {
    const fn new(x: &'a [S]) -> Self {
        Self { x, pos: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [S] {
        let out = &self.x[self.pos..self.pos + len];
        self.pos += len;
        out
    }

    /// Take a block for each component according to `tie`; identity ties yield [`None`].
    fn take_tied(&mut self, len: usize, tie: Tie, k: usize) -> Vec<Option<&'a [S]>> {
        match tie {
            Tie::Equal => {
                let shared = self.take(len);
                vec![Some(shared); k]
            }
            Tie::Variable => (0..k).map(|_| Some(self.take(len))).collect(),
            Tie::Identity => vec![None; k],
        }
    }
}

/// Log-softmax of `logits` with an implicit trailing zero logit.
fn log_softmax<S: Scalar>(logits: &[S]) -> Vec<S> {
    let z: Vec<S> = logits.iter().copied().chain([S::zero()]).collect();
    let max = z.iter().map(Scalar::value).fold(Float::NEG_INFINITY, Float::max);
    let shift = S::from_f64(max);
    let shifted: Vec<S> = z.into_iter().map(|zi| zi - shift).collect();
    let log_norm = shifted.iter().map(|&zi| zi.exp()).sum::<S>().ln();
    shifted.into_iter().map(|zi| zi - log_norm).collect()
}

fn cholesky_factor<S: Scalar>(entries: &[S], d: usize) -> Vec<S> {
    let mut factor = vec![S::zero(); d * d];
    let mut m = 0;
    for i in 0..d {
        for j in 0..=i {
            factor[i * d + j] = if i == j { entries[m].exp() } else { entries[m] };
            m += 1;
        }
    }
    factor
}

/// Cayley transform $`D = (I + K)^{-1}(I - K)`$ of the skew-symmetric $`K`$ whose strictly
/// lower entries are `entries`.
pub(crate) fn cayley<S: Scalar>(entries: &[S], d: usize) -> Vec<S> {
    let mut plus = linalg::identity::<S>(d);
    let mut minus = linalg::identity::<S>(d);
    let mut m = 0;
    for i in 1..d {
        for j in 0..i {
            plus[i * d + j] = entries[m];
            plus[j * d + i] = -entries[m];
            minus[i * d + j] = -entries[m];
            minus[j * d + i] = entries[m];
            m += 1;
        }
    }
    linalg::lu_solve(&plus, &minus, d, d).unwrap_or_else(|| linalg::identity(d))
}

fn shape_diagonal<S: Scalar>(log_shape: Option<&[S]>, d: usize) -> Vec<S> {
    match log_shape {
        Some(s) => {
            let last = -s.iter().copied().sum::<S>();
            s.iter().copied().chain([last]).map(Scalar::exp).collect()
        }
        None => vec![S::one(); d],
    }
}

impl MixtureSpec {
    /// The block structure of the unconstrained vector.
    pub fn layout(&self) -> ParameterLayout {
        let (k, d) = (self.k(), self.d());
        let mut layout = ParameterLayout { blocks: Vec::new() };
        layout.push("logit", BlockKind::Logit, k - 1);
        for c in 0..k {
            layout.push(format!("mean[{c}]"), BlockKind::Mean, d);
        }
        let full = d * (d + 1) / 2;
        match self.family() {
            Family::Gmm | Family::Tmm => {
                for c in 0..k {
                    layout.push(format!("chol[{c}]"), BlockKind::Cholesky, full);
                }
            }
            Family::GmmConstrained => layout.push("chol", BlockKind::Cholesky, full),
            Family::Mclust(code) => {
                layout.push_tied("log_volume", BlockKind::LogVolume, 1, code.volume, k);
                layout.push_tied("log_shape", BlockKind::LogShape, d - 1, code.shape, k);
                layout.push_tied(
                    "rotation",
                    BlockKind::Rotation,
                    d * (d - 1) / 2,
                    code.orientation,
                    k,
                );
            }
            Family::Mfa | Family::Pgmm(_) => {
                let code = self.family().factor_code().unwrap_or_default();
                let q = self.q().unwrap_or(1);
                let tie = |shared: bool| if shared { Tie::Equal } else { Tie::Variable };
                layout.push_tied(
                    "loadings",
                    BlockKind::Loading,
                    d * q,
                    tie(code.shared_loadings),
                    k,
                );
                let noise_len = if code.isotropic { 1 } else { d };
                layout.push_tied(
                    "log_noise",
                    BlockKind::LogNoise,
                    noise_len,
                    tie(code.shared_noise),
                    k,
                );
            }
        }
        if self.family() == Family::Tmm {
            layout.push("log_dof", BlockKind::LogDof, k);
        }
        layout
    }

    /// Length of the unconstrained vector.
    pub fn dimension(&self) -> usize {
        self.layout().dimension()
    }

    /// Map an unconstrained vector to valid mixture parameters.
    ///
    /// Weights come from a max-shifted softmax, so they are non-negative and sum to one for
    /// every finite input. Every covariance is positive definite by construction: exponentiated
    /// Cholesky diagonals, exponentiated volumes and shapes with orthogonal (Cayley) orientations,
    /// and positive error variances added to a Gram matrix of loadings.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if `x` does not have length
    /// [`MixtureSpec::dimension`].
    pub fn forward<S: Scalar>(&self, x: &[S]) -> Result<MixtureParameters<S>> {
        let expected = self.dimension();
        if x.len() != expected {
            return Err(MixtureError::InvalidArgument(format!(
                "expected an unconstrained vector of length {expected} for {self} (got {})",
                x.len()
            )));
        }
        let (k, d) = (self.k(), self.d());
        let mut cursor = Cursor::new(x);
        let log_weights = log_softmax(cursor.take(k - 1));
        let means = (0..k).map(|_| cursor.take(d).to_vec()).collect();
        let full = d * (d + 1) / 2;
        let covariances = match self.family() {
            Family::Gmm | Family::Tmm => (0..k)
                .map(|_| Covariance::Cholesky {
                    factor: cholesky_factor(cursor.take(full), d),
                })
                .collect(),
            Family::GmmConstrained => {
                let factor = cholesky_factor(cursor.take(full), d);
                vec![Covariance::Cholesky { factor }; k]
            }
            Family::Mclust(code) => {
                let volumes = cursor.take_tied(1, code.volume, k);
                let shapes = cursor.take_tied(d - 1, code.shape, k);
                let rotations = cursor.take_tied(d * (d - 1) / 2, code.orientation, k);
                volumes
                    .into_iter()
                    .zip(shapes)
                    .zip(rotations)
                    .map(|((volume, shape), rotation)| Covariance::Eigen {
                        volume: volume.map_or_else(S::one, |v| v[0].exp()),
                        shape: shape_diagonal(shape, d),
                        orientation: rotation.map(|r| cayley(r, d)),
                    })
                    .collect()
            }
            Family::Mfa | Family::Pgmm(_) => {
                let code = self.family().factor_code().unwrap_or_default();
                let q = self.q().unwrap_or(1);
                let tie = |shared: bool| if shared { Tie::Equal } else { Tie::Variable };
                let noise_len = if code.isotropic { 1 } else { d };
                let loadings = cursor.take_tied(d * q, tie(code.shared_loadings), k);
                let noises = cursor.take_tied(noise_len, tie(code.shared_noise), k);
                loadings
                    .into_iter()
                    .zip(noises)
                    .map(|(loadings, noise)| {
                        let loadings = loadings.map(<[S]>::to_vec).unwrap_or_default();
                        let log_noise = noise.unwrap_or_default();
                        let noise = if code.isotropic {
                            vec![log_noise[0].exp(); d]
                        } else {
                            log_noise.iter().map(|&u| u.exp()).collect()
                        };
                        Covariance::Factor { loadings, noise, q }
                    })
                    .collect()
            }
        };
        let dof = (self.family() == Family::Tmm)
            .then(|| cursor.take(k).iter().map(|&eta| eta.exp()).collect());
        Ok(MixtureParameters {
            d,
            log_weights,
            means,
            covariances,
            dof,
        })
    }
}

/// An unconstrained vector together with the specification it is laid out for.
///
/// This is the starting point of a fit, as returned by
/// [`MixtureModel::init_params`](crate::mixture::MixtureModel::init_params).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnconstrainedVector {
    spec: MixtureSpec,
    values: DVector<Float>,
}

impl UnconstrainedVector {
    /// Wrap `values` for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if `values` does not have length
    /// [`MixtureSpec::dimension`] or has a non-finite entry.
    pub fn new(spec: MixtureSpec, values: DVector<Float>) -> Result<Self> {
        let expected = spec.dimension();
        if values.len() != expected {
            return Err(MixtureError::InvalidArgument(format!(
                "expected an unconstrained vector of length {expected} for {spec} (got {})",
                values.len()
            )));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(MixtureError::InvalidArgument(format!(
                "entry {i} of the unconstrained vector is {}",
                values[i]
            )));
        }
        Ok(Self { spec, values })
    }

    /// The specification the vector is laid out for.
    pub const fn spec(&self) -> &MixtureSpec {
        &self.spec
    }

    /// The raw entries.
    pub const fn values(&self) -> &DVector<Float> {
        &self.values
    }

    /// The mixture parameters this vector maps to.
    ///
    /// # Errors
    ///
    /// See [`MixtureSpec::forward`].
    pub fn parameters(&self) -> Result<MixtureParameters> {
        self.spec.forward(self.values.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::FamilyKind;
    use approx::assert_relative_eq;
    use nalgebra::SymmetricEigen;

    fn all_specs(d: usize, k: usize) -> Vec<MixtureSpec> {
        let mut specs = vec![
            MixtureSpec::new(Family::Gmm, k, d, None).unwrap(),
            MixtureSpec::new(Family::GmmConstrained, k, d, None).unwrap(),
            MixtureSpec::new(Family::Tmm, k, d, None).unwrap(),
        ];
        for code in crate::mixture::MclustCode::VALID {
            specs.push(
                MixtureSpec::new(Family::new(FamilyKind::Mclust, Some(code)).unwrap(), k, d, None)
                    .unwrap(),
            );
        }
        if d > 1 {
            specs.push(MixtureSpec::new(Family::Mfa, k, d, Some(1)).unwrap());
            for code in crate::mixture::PgmmCode::VALID {
                specs.push(
                    MixtureSpec::new(
                        Family::new(FamilyKind::Pgmm, Some(code)).unwrap(),
                        k,
                        d,
                        Some(d - 1),
                    )
                    .unwrap(),
                );
            }
        }
        specs
    }

    fn random_vector(rng: &mut fastrand::Rng, n: usize, magnitude: Float) -> Vec<Float> {
        (0..n).map(|_| (rng.f64() * 2.0 - 1.0) * magnitude).collect()
    }

    #[test]
    fn layout_matches_forward_consumption() {
        for spec in all_specs(3, 2) {
            let layout = spec.layout();
            assert_eq!(layout.kinds().len(), layout.dimension());
            assert_eq!(layout.parameter_names().len(), layout.dimension());
            let x = vec![0.1; layout.dimension()];
            assert!(spec.forward(&x).is_ok(), "{spec}");
            assert!(spec.forward(&x[1..]).is_err());
        }
    }

    #[test]
    fn weights_are_a_simplex_for_extreme_inputs() {
        let mut rng = fastrand::Rng::with_seed(7);
        for spec in all_specs(2, 4) {
            for magnitude in [1.0, 1e3, 1e8, 1e300] {
                let mut x = random_vector(&mut rng, spec.dimension(), 1.0);
                for logit in x.iter_mut().take(spec.k() - 1) {
                    *logit = (rng.f64() * 2.0 - 1.0) * magnitude;
                }
                let params = spec.forward(&x).unwrap();
                let weights = params.weights();
                assert!(weights.iter().all(|&w| w >= 0.0));
                assert_relative_eq!(weights.iter().sum::<Float>(), 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn covariances_are_symmetric_positive_definite() {
        let mut rng = fastrand::Rng::with_seed(11);
        for spec in all_specs(3, 2) {
            for _ in 0..10 {
                let x = random_vector(&mut rng, spec.dimension(), 3.0);
                let params = spec.forward(&x).unwrap();
                for c in 0..spec.k() {
                    let cov = params.covariance_matrix(c);
                    assert!(cov.relative_eq(&cov.transpose(), 1e-10, 1e-10), "{spec}");
                    let eigen = SymmetricEigen::new(cov);
                    assert!(eigen.eigenvalues.iter().all(|&e| e > 0.0), "{spec}");
                }
            }
        }
    }

    #[test]
    fn cayley_transform_is_orthogonal() {
        let entries = [0.3, -1.2, 2.5];
        let rot = DMatrix::from_row_slice(3, 3, &cayley(&entries, 3));
        let gram = rot.transpose() * &rot;
        assert!(gram.relative_eq(&DMatrix::identity(3, 3), 1e-12, 1e-12));
        assert_relative_eq!(rot.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn tied_structures_share_covariances() {
        let spec = MixtureSpec::new(Family::GmmConstrained, 3, 2, None).unwrap();
        let x: Vec<Float> = (0..spec.dimension()).map(|i| i as Float * 0.1).collect();
        let params = spec.forward(&x).unwrap();
        assert_eq!(params.covariances[0], params.covariances[2]);

        let spec = MixtureSpec::new(Family::Mclust("EEI".parse().unwrap()), 3, 3, None).unwrap();
        assert_eq!(spec.dimension(), 2 + 9 + 1 + 2);
        let params = spec
            .forward(&(0..spec.dimension()).map(|i| i as Float * 0.1).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(params.covariances[0], params.covariances[1]);
        assert_relative_eq!(params.covariance_matrix(0).determinant(), (1.1_f64).exp().powi(3), epsilon = 1e-10);
    }

    #[test]
    fn parameter_names_follow_blocks() {
        let spec = MixtureSpec::new(Family::Tmm, 2, 2, None).unwrap();
        let names = spec.layout().parameter_names();
        assert_eq!(names[0], "logit");
        assert_eq!(names[1], "mean[0][0]");
        assert_eq!(names[5], "chol[0][0]");
        assert_eq!(names.last().unwrap(), "log_dof[1]");
    }
}
