use fastrand::Rng;
use nalgebra::SymmetricEigen;
use serde::{Deserialize, Serialize};

use crate::{
    core::{utils::maybe_warn, RandChoice, SampleFloat},
    mixture::{BlockKind, Dataset, Family, MclustCode, MixtureSpec, Tie, UnconstrainedVector},
    DMatrix, DVector, Float, MixtureError, Result,
};

/// Starting degrees of freedom of every t component.
pub const INITIAL_DOF: Float = 10.0;

/// Ridge added to every base covariance, relative to the mean feature variance.
const RIDGE: Float = 1e-6;

/// Smallest error variance a factor pullback may produce, relative to the feature variance.
const NOISE_FLOOR: Float = 1e-3;

/// Options for [`initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitOptions {
    scale: Float,
    use_kmeans: bool,
    seed: u64,
    max_kmeans_iters: usize,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            scale: 0.1,
            use_kmeans: true,
            seed: 0,
            max_kmeans_iters: 100,
        }
    }
}

impl InitOptions {
    /// Set the standard deviation of the noise added to the base point, in units of the feature
    /// standard deviation for locations and loadings and in natural units for log-scale and
    /// angle parameters (default = `0.1`).
    pub const fn with_scale(mut self, scale: Float) -> Self {
        self.scale = scale;
        self
    }
    /// Choose between a k-means base point and the neutral one (default = `true`).
    pub const fn with_kmeans(mut self, use_kmeans: bool) -> Self {
        self.use_kmeans = use_kmeans;
        self
    }
    /// Set the random seed (default = `0`).
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
    /// Set the maximum number of Lloyd iterations (default = `100`).
    pub const fn with_max_kmeans_iters(mut self, max_kmeans_iters: usize) -> Self {
        self.max_kmeans_iters = max_kmeans_iters;
        self
    }
    /// The noise scale.
    pub const fn scale(&self) -> Float {
        self.scale
    }
    /// Whether k-means provides the base point.
    pub const fn use_kmeans(&self) -> bool {
        self.use_kmeans
    }
    /// The random seed.
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

/// Weights, means and full covariances that an initial vector is pulled back from.
#[derive(Debug, Clone)]
pub(crate) struct BasePoint {
    pub(crate) weights: Vec<Float>,
    pub(crate) means: Vec<DVector<Float>>,
    pub(crate) covariances: Vec<DMatrix<Float>>,
}

fn rows(data: &Dataset) -> Vec<DVector<Float>> {
    (0..data.n())
        .map(|i| DVector::from_vec(data.row(i)))
        .collect()
}

fn regularize(cov: DMatrix<Float>, ridge: Float) -> DMatrix<Float> {
    let d = cov.nrows();
    cov + DMatrix::identity(d, d).scale(ridge)
}

fn ridge_for(data: &Dataset) -> Float {
    let mean_variance = data.covariance().trace() / data.d() as Float;
    if mean_variance > 0.0 {
        RIDGE * mean_variance
    } else {
        RIDGE
    }
}

/// Index of the closest centroid (lowest index on ties) and the squared distance to it.
fn nearest(point: &DVector<Float>, centroids: &[DVector<Float>]) -> (usize, Float) {
    centroids
        .iter()
        .enumerate()
        .fold((0, Float::INFINITY), |best, (c, centroid)| {
            let dist = (point - centroid).norm_squared();
            if dist < best.1 {
                (c, dist)
            } else {
                best
            }
        })
}

fn assign(points: &[DVector<Float>], centroids: &[DVector<Float>]) -> Vec<usize> {
    points.iter().map(|p| nearest(p, centroids).0).collect()
}

/// k-means++ seeding followed by Lloyd iterations.
fn kmeans(
    points: &[DVector<Float>],
    k: usize,
    max_iters: usize,
    rng: &mut Rng,
) -> (Vec<DVector<Float>>, Vec<usize>) {
    let n = points.len();
    let mut centroids = vec![points[rng.usize(0..n)].clone()];
    while centroids.len() < k {
        let d2: Vec<Float> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        // every point coincides with a centroid when the D² weights are all zero
        let next = rng
            .choice_weighted(&d2)
            .unwrap_or_else(|| rng.usize(0..n));
        centroids.push(points[next].clone());
    }
    let mut labels = assign(points, &centroids);
    for _ in 0..max_iters {
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&DVector<Float>> = points
                .iter()
                .zip(&labels)
                .filter_map(|(p, &l)| (l == c).then_some(p))
                .collect();
            if members.is_empty() {
                maybe_warn(&format!(
                    "k-means cluster {c} is empty; keeping its previous centroid"
                ));
                continue;
            }
            *centroid = members
                .iter()
                .fold(DVector::zeros(centroid.len()), |acc, &p| acc + p)
                / members.len() as Float;
        }
        let next = assign(points, &centroids);
        if next == labels {
            break;
        }
        labels = next;
    }
    (centroids, labels)
}

impl BasePoint {
    /// Means at distinct random observations, equal weights, and the pooled covariance.
    pub(crate) fn neutral(data: &Dataset, k: usize, rng: &mut Rng) -> Self {
        let points = rows(data);
        let mut indices: Vec<usize> = (0..points.len()).collect();
        rng.shuffle(&mut indices);
        let pooled = regularize(data.covariance(), ridge_for(data));
        Self {
            weights: vec![1.0 / k as Float; k],
            means: indices[..k].iter().map(|&i| points[i].clone()).collect(),
            covariances: vec![pooled; k],
        }
    }

    /// Centroids, smoothed proportions and within-cluster covariances of a k-means partition.
    pub(crate) fn kmeans(data: &Dataset, k: usize, max_iters: usize, rng: &mut Rng) -> Self {
        let points = rows(data);
        let (centroids, labels) = kmeans(&points, k, max_iters, rng);
        let ridge = ridge_for(data);
        let pooled = regularize(data.covariance(), ridge);
        let (n, d) = (data.n(), data.d());
        let mut weights = Vec::with_capacity(k);
        let mut covariances = Vec::with_capacity(k);
        for (c, centroid) in centroids.iter().enumerate() {
            let members: Vec<&DVector<Float>> = points
                .iter()
                .zip(&labels)
                .filter_map(|(p, &l)| (l == c).then_some(p))
                .collect();
            weights.push((members.len() + 1) as Float / (n + k) as Float);
            if members.len() < 2 {
                covariances.push(pooled.clone());
            } else {
                let scatter = members.iter().fold(DMatrix::zeros(d, d), |acc, &p| {
                    let r = p - centroid;
                    acc + &r * r.transpose()
                });
                covariances.push(regularize(scatter / members.len() as Float, ridge));
            }
        }
        Self {
            weights,
            means: centroids,
            covariances,
        }
    }

    /// Weighted average of the component covariances.
    fn pooled(&self) -> DMatrix<Float> {
        let d = self.means[0].len();
        self.weights
            .iter()
            .zip(&self.covariances)
            .fold(DMatrix::zeros(d, d), |acc, (w, cov)| acc + cov.scale(*w))
    }
}

/// Combine per-component blocks according to a tie: weighted average, concatenation, or nothing.
fn tied(weights: &[Float], tie: Tie, blocks: Vec<Vec<Float>>) -> Vec<Float> {
    match tie {
        Tie::Equal => {
            let len = blocks.first().map_or(0, Vec::len);
            let total: Float = weights.iter().sum();
            (0..len)
                .map(|i| {
                    weights
                        .iter()
                        .zip(&blocks)
                        .map(|(w, b)| w * b[i])
                        .sum::<Float>()
                        / total
                })
                .collect()
        }
        Tie::Variable => blocks.concat(),
        Tie::Identity => Vec::new(),
    }
}

/// Lower Cholesky factor row by row, with the diagonal as its logarithm.
fn cholesky_entries(cov: &DMatrix<Float>) -> Vec<Float> {
    let d = cov.nrows();
    let factor = cov.clone().cholesky().map_or_else(
        || DMatrix::from_diagonal(&cov.diagonal().map(|v| v.abs().sqrt().max(Float::EPSILON))),
        |chol| chol.l(),
    );
    (0..d)
        .flat_map(|i| (0..=i).map(move |j| (i, j)))
        .map(|(i, j)| {
            if i == j {
                factor[(i, i)].ln()
            } else {
                factor[(i, j)]
            }
        })
        .collect()
}

/// Eigenvectors of `cov` as a proper rotation with a non-negative diagonal where possible.
fn orientation_of(cov: &DMatrix<Float>) -> DMatrix<Float> {
    let mut rotation = SymmetricEigen::new(cov.clone()).eigenvectors;
    let d = rotation.nrows();
    for j in 0..d {
        if rotation[(j, j)] < 0.0 {
            rotation.column_mut(j).neg_mut();
        }
    }
    if rotation.determinant() < 0.0 {
        let j = (0..d)
            .min_by(|&a, &b| rotation[(a, a)].abs().total_cmp(&rotation[(b, b)].abs()))
            .unwrap_or(0);
        rotation.column_mut(j).neg_mut();
    }
    rotation
}

/// Strictly lower entries of $`K = (I - D)(I + D)^{-1}`$, the inverse Cayley transform.
fn skew_entries(rotation: &DMatrix<Float>) -> Vec<Float> {
    let d = rotation.nrows();
    let identity = DMatrix::<Float>::identity(d, d);
    let k = (&identity + rotation)
        .try_inverse()
        .map_or_else(|| DMatrix::zeros(d, d), |inv| (&identity - rotation) * inv);
    (1..d)
        .flat_map(|i| (0..i).map(move |j| (i, j)))
        .map(|(i, j)| k[(i, j)])
        .collect()
}

fn eigen_entries(base: &BasePoint, code: MclustCode) -> Vec<Float> {
    let d = base.means[0].len();
    let shared = orientation_of(&base.pooled());
    let orientations: Vec<DMatrix<Float>> = base
        .covariances
        .iter()
        .map(|cov| match code.orientation {
            Tie::Variable => orientation_of(cov),
            Tie::Equal => shared.clone(),
            Tie::Identity => DMatrix::identity(d, d),
        })
        .collect();
    let log_scales: Vec<DVector<Float>> = base
        .covariances
        .iter()
        .zip(&orientations)
        .map(|(cov, rotation)| {
            (rotation.transpose() * cov * rotation)
                .diagonal()
                .map(|s| s.max(Float::MIN_POSITIVE).ln())
        })
        .collect();
    let log_volumes: Vec<Float> = log_scales.iter().map(|s| s.mean()).collect();
    let log_shapes: Vec<Vec<Float>> = log_scales
        .iter()
        .zip(&log_volumes)
        .map(|(s, v)| s.iter().take(d - 1).map(|si| si - v).collect())
        .collect();
    let mut x = tied(
        &base.weights,
        code.volume,
        log_volumes.iter().map(|&v| vec![v]).collect(),
    );
    x.extend(tied(&base.weights, code.shape, log_shapes));
    x.extend(tied(
        &base.weights,
        code.orientation,
        orientations.iter().map(skew_entries).collect(),
    ));
    x
}

/// Probabilistic-PCA loadings: the leading `q` eigenvectors scaled by the square root of their
/// excess over the mean discarded eigenvalue.
fn ppca_loadings(cov: &DMatrix<Float>, q: usize) -> DMatrix<Float> {
    let d = cov.nrows();
    let eigen = SymmetricEigen::new(cov.clone());
    let mut order: Vec<usize> = (0..d).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let sigma2 = order[q..]
        .iter()
        .map(|&i| eigen.eigenvalues[i])
        .sum::<Float>()
        / (d - q) as Float;
    DMatrix::from_fn(d, q, |j, a| {
        let i = order[a];
        eigen.eigenvectors[(j, i)] * (eigen.eigenvalues[i] - sigma2).max(0.0).sqrt()
    })
}

fn factor_entries(base: &BasePoint, spec: &MixtureSpec) -> Vec<Float> {
    let code = spec.family().factor_code().unwrap_or_default();
    let q = spec.q().unwrap_or(1);
    let d = spec.d();
    let shared = ppca_loadings(&base.pooled(), q);
    let loadings: Vec<DMatrix<Float>> = base
        .covariances
        .iter()
        .map(|cov| {
            if code.shared_loadings {
                shared.clone()
            } else {
                ppca_loadings(cov, q)
            }
        })
        .collect();
    let log_noise: Vec<Vec<Float>> = base
        .covariances
        .iter()
        .zip(&loadings)
        .map(|(cov, lambda)| {
            let residual: Vec<Float> = (0..d)
                .map(|j| {
                    (cov[(j, j)] - lambda.row(j).norm_squared())
                        .max(NOISE_FLOOR * cov[(j, j)])
                        .max(Float::MIN_POSITIVE)
                })
                .collect();
            if code.isotropic {
                vec![(residual.iter().sum::<Float>() / d as Float).ln()]
            } else {
                residual.iter().map(|r| r.ln()).collect()
            }
        })
        .collect();
    let tie = |shared: bool| if shared { Tie::Equal } else { Tie::Variable };
    let mut x = tied(
        &base.weights,
        tie(code.shared_loadings),
        loadings
            .iter()
            .map(|l| (0..d).flat_map(|j| (0..q).map(move |a| l[(j, a)])).collect())
            .collect(),
    );
    x.extend(tied(&base.weights, tie(code.shared_noise), log_noise));
    x
}

/// The unconstrained vector that [`MixtureSpec::forward`] maps to `base` (exactly, up to the
/// structural ties and to rounding).
pub(crate) fn pull_back(spec: &MixtureSpec, base: &BasePoint) -> Vec<Float> {
    let k = spec.k();
    let mut x = Vec::with_capacity(spec.dimension());
    let last = base.weights[k - 1].ln();
    x.extend(base.weights[..k - 1].iter().map(|w| w.ln() - last));
    for mean in &base.means {
        x.extend(mean.iter());
    }
    match spec.family() {
        Family::Gmm | Family::Tmm => {
            for cov in &base.covariances {
                x.extend(cholesky_entries(cov));
            }
        }
        Family::GmmConstrained => x.extend(cholesky_entries(&base.pooled())),
        Family::Mclust(code) => x.extend(eigen_entries(base, code)),
        Family::Mfa | Family::Pgmm(_) => x.extend(factor_entries(base, spec)),
    }
    if spec.family() == Family::Tmm {
        x.extend(std::iter::repeat(INITIAL_DOF.ln()).take(k));
    }
    x
}

/// The natural unit of every entry of the unconstrained vector, used to scale the noise.
fn noise_units(spec: &MixtureSpec, std: &DVector<Float>) -> Vec<Float> {
    let d = spec.d();
    let q = spec.q().unwrap_or(1);
    let layout = spec.layout();
    let mut units = Vec::with_capacity(layout.dimension());
    for block in layout.blocks() {
        match block.kind {
            BlockKind::Mean => units.extend(std.iter()),
            BlockKind::Loading => units.extend((0..block.len).map(|i| std[i / q])),
            BlockKind::Cholesky => {
                for i in 0..d {
                    units.extend((0..=i).map(|j| if i == j { 1.0 } else { std[i] }));
                }
            }
            _ => units.extend(std::iter::repeat(1.0).take(block.len)),
        }
    }
    units
}

/// Draw a starting vector for fitting `spec` to `data`.
///
/// A base point is built from a k-means partition (or, without k-means, from random
/// observations and the pooled covariance), pulled back into the unconstrained coordinates of
/// `spec`, and perturbed by Gaussian noise of standard deviation `scale` in natural units. The
/// same seed always produces the same vector.
///
/// # Errors
///
/// Returns [`MixtureError::InvalidArgument`] if the data and `spec` disagree on the number of
/// features, if there are fewer observations than components, or if the scale is negative or
/// not finite.
pub fn initialize(
    data: &Dataset,
    spec: &MixtureSpec,
    options: &InitOptions,
) -> Result<UnconstrainedVector> {
    if data.d() != spec.d() {
        return Err(MixtureError::InvalidArgument(format!(
            "the data have {} features but {spec} expects {}",
            data.d(),
            spec.d()
        )));
    }
    if spec.k() > data.n() {
        return Err(MixtureError::InvalidArgument(format!(
            "cannot initialize {} components from {} observations",
            spec.k(),
            data.n()
        )));
    }
    if !options.scale.is_finite() || options.scale < 0.0 {
        return Err(MixtureError::InvalidArgument(format!(
            "the initialization scale must be finite and non-negative (got {})",
            options.scale
        )));
    }
    let mut rng = Rng::with_seed(options.seed);
    let base = if options.use_kmeans {
        BasePoint::kmeans(data, spec.k(), options.max_kmeans_iters, &mut rng)
    } else {
        BasePoint::neutral(data, spec.k(), &mut rng)
    };
    let mut x = pull_back(spec, &base);
    for (xi, unit) in x.iter_mut().zip(noise_units(spec, &data.column_std())) {
        *xi += options.scale * unit * rng.normal(0.0, 1.0);
    }
    log::debug!(
        "initialized {spec} (kmeans = {}, scale = {}, seed = {})",
        options.use_kmeans,
        options.scale,
        options.seed
    );
    UnconstrainedVector::new(*spec, DVector::from_vec(x))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::mixture::{fixtures, FamilyKind, PgmmCode};

    fn assert_matrix_eq(a: &DMatrix<Float>, b: &DMatrix<Float>) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-8, max_relative = 1e-8);
        }
    }

    #[test]
    fn kmeans_separates_obvious_clusters() {
        let data = fixtures::two_blobs(30, 1);
        let base = BasePoint::kmeans(&data, 2, 100, &mut Rng::with_seed(3));
        let mut xs: Vec<Float> = base.means.iter().map(|m| m[0]).collect();
        xs.sort_by(Float::total_cmp);
        assert!(xs[0] < -2.0 && xs[1] > 2.0, "{xs:?}");
        assert_relative_eq!(base.weights.iter().sum::<Float>(), 1.0, epsilon = 1e-12);
        assert!(base.weights.iter().all(|&w| (0.4..0.6).contains(&w)));
    }

    #[test]
    fn zero_scale_reproduces_the_base_covariances() {
        let data = fixtures::iris_like(2);
        let gmm = MixtureSpec::new(Family::Gmm, 3, 4, None).unwrap();
        let vvv =
            MixtureSpec::new(Family::new(FamilyKind::Mclust, Some("VVV")).unwrap(), 3, 4, None)
                .unwrap();
        for spec in [gmm, vvv] {
            let base = BasePoint::kmeans(&data, 3, 100, &mut Rng::with_seed(9));
            let params = spec.forward(&pull_back(&spec, &base)).unwrap();
            for c in 0..3 {
                assert_matrix_eq(&params.covariance_matrix(c), &base.covariances[c]);
                assert_relative_eq!(params.weights()[c], base.weights[c], epsilon = 1e-12);
                for j in 0..4 {
                    assert_relative_eq!(params.means[c][j], base.means[c][j]);
                }
            }
        }
    }

    #[test]
    fn tied_structures_pull_back_to_the_pooled_covariance() {
        let data = fixtures::iris_like(3);
        let base = BasePoint::kmeans(&data, 3, 100, &mut Rng::with_seed(1));
        let pooled = base.pooled();
        let tied = MixtureSpec::new(Family::GmmConstrained, 3, 4, None).unwrap();
        let eee =
            MixtureSpec::new(Family::new(FamilyKind::Mclust, Some("EEE")).unwrap(), 3, 4, None)
                .unwrap();
        let params = tied.forward(&pull_back(&tied, &base)).unwrap();
        assert_matrix_eq(&params.covariance_matrix(2), &pooled);
        let params = eee.forward(&pull_back(&eee, &base)).unwrap();
        assert_matrix_eq(&params.covariance_matrix(0), &params.covariance_matrix(1));
    }

    #[test]
    fn factor_pullback_recovers_low_rank_structure() {
        // a covariance that is exactly rank one plus isotropic noise
        let lambda = DVector::from_vec(vec![2.0, -1.0, 0.5]);
        let cov = &lambda * lambda.transpose() + DMatrix::identity(3, 3).scale(0.25);
        let base = BasePoint {
            weights: vec![1.0],
            means: vec![DVector::zeros(3)],
            covariances: vec![cov.clone()],
        };
        for family in [
            Family::Mfa,
            Family::Pgmm(PgmmCode::default()),
            Family::new(FamilyKind::Pgmm, Some("CCC")).unwrap(),
        ] {
            let spec = MixtureSpec::new(family, 1, 3, Some(1)).unwrap();
            let params = spec.forward(&pull_back(&spec, &base)).unwrap();
            assert_matrix_eq(&params.covariance_matrix(0), &cov);
        }
    }

    #[test]
    fn student_t_starts_at_ten_degrees_of_freedom() {
        let data = fixtures::two_blobs(20, 4);
        let spec = MixtureSpec::new(Family::Tmm, 2, 2, None).unwrap();
        let init = initialize(&data, &spec, &InitOptions::default().with_scale(0.0)).unwrap();
        let dof = init.parameters().unwrap().dof.unwrap();
        assert_relative_eq!(dof[0], INITIAL_DOF, epsilon = 1e-12);
        assert_relative_eq!(dof[1], INITIAL_DOF, epsilon = 1e-12);
    }

    #[test]
    fn same_seed_same_vector() {
        let data = fixtures::iris_like(5);
        let spec = MixtureSpec::new(Family::Gmm, 3, 4, None).unwrap();
        for use_kmeans in [true, false] {
            let options = InitOptions::default()
                .with_scale(0.5)
                .with_kmeans(use_kmeans)
                .with_seed(17);
            let a = initialize(&data, &spec, &options).unwrap();
            let b = initialize(&data, &spec, &options).unwrap();
            assert_eq!(a, b);
            let c = initialize(&data, &spec, &options.with_seed(18)).unwrap();
            assert_ne!(a, c);
        }
    }

    #[test]
    fn neutral_means_are_distinct_observations() {
        let data = fixtures::two_blobs(5, 6);
        let base = BasePoint::neutral(&data, 10, &mut Rng::with_seed(0));
        let rows = rows(&data);
        for (a, mean) in base.means.iter().enumerate() {
            assert!(rows.contains(mean));
            assert!(base.means[..a].iter().all(|other| other != mean));
        }
    }

    #[test]
    fn rejects_bad_arguments() {
        let data = fixtures::two_blobs(2, 7);
        let spec = MixtureSpec::new(Family::Gmm, 5, 2, None).unwrap();
        assert!(initialize(&data, &spec, &InitOptions::default()).is_err());
        let spec = MixtureSpec::new(Family::Gmm, 2, 2, None).unwrap();
        for scale in [-1.0, Float::NAN, Float::INFINITY] {
            let err = initialize(&data, &spec, &InitOptions::default().with_scale(scale));
            assert!(err.unwrap_err().is_invalid_argument());
        }
        let spec = MixtureSpec::new(Family::Gmm, 2, 3, None).unwrap();
        assert!(initialize(&data, &spec, &InitOptions::default()).is_err());
    }
}
