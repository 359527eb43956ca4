use logsumexp::LogSumExp;

use crate::{
    ad::Scalar,
    linalg,
    mixture::{Covariance, Dataset, MixtureParameters},
    DMatrix, Float, MixtureError, Result,
};

/// Covariance diagonals, volumes and error variances below this are treated as collapsed.
///
/// This is the square root of the smallest positive normal `f64`.
pub const COLLAPSE_TOLERANCE: Float = 1.491_668_146_240_041_3e-154;

const LN_2PI: Float = 1.837_877_066_409_345_5;

/// A component covariance prepared for repeated Mahalanobis distances.
enum Kernel<S> {
    Cholesky {
        factor: Vec<S>,
    },
    Eigen {
        orientation: Option<Vec<S>>,
        inv_scales: Vec<S>,
    },
    /// Woodbury form: $`\Sigma^{-1} = \Psi^{-1} - \Psi^{-1}\Lambda M^{-1}\Lambda^\intercal\Psi^{-1}`$
    /// with $`M = I + \Lambda^\intercal\Psi^{-1}\Lambda = L_M L_M^\intercal`$.
    Factor {
        loadings: Vec<S>,
        inv_noise: Vec<S>,
        m_factor: Vec<S>,
        q: usize,
    },
    /// The Woodbury core was not positive definite; every density is NaN.
    Broken,
}

struct PreparedComponent<S> {
    kernel: Kernel<S>,
    half_log_det: S,
}

impl<S: Scalar> PreparedComponent<S> {
    fn new(cov: &Covariance<S>, d: usize) -> Self {
        match cov {
            Covariance::Cholesky { factor } => Self {
                half_log_det: (0..d).map(|i| factor[i * d + i].ln()).sum(),
                kernel: Kernel::Cholesky {
                    factor: factor.clone(),
                },
            },
            Covariance::Eigen {
                volume,
                shape,
                orientation,
            } => {
                let scales: Vec<S> = shape.iter().map(|&a| a * *volume).collect();
                Self {
                    half_log_det: scales.iter().map(|&s| s.ln()).sum::<S>().scale(0.5),
                    kernel: Kernel::Eigen {
                        orientation: orientation.clone(),
                        inv_scales: scales.iter().map(|&s| S::one() / s).collect(),
                    },
                }
            }
            Covariance::Factor { loadings, noise, q } => {
                let q = *q;
                let inv_noise: Vec<S> = noise.iter().map(|&psi| S::one() / psi).collect();
                let mut m = linalg::identity::<S>(q);
                for a in 0..q {
                    for b in 0..=a {
                        let gram: S = (0..d)
                            .map(|j| loadings[j * q + a] * loadings[j * q + b] * inv_noise[j])
                            .sum();
                        m[a * q + b] = m[a * q + b] + gram;
                        if a != b {
                            m[b * q + a] = m[a * q + b];
                        }
                    }
                }
                let half_log_noise = noise.iter().map(|&psi| psi.ln()).sum::<S>().scale(0.5);
                match linalg::cholesky(&m, q) {
                    Some(m_factor) => Self {
                        half_log_det: half_log_noise
                            + (0..q).map(|a| m_factor[a * q + a].ln()).sum::<S>(),
                        kernel: Kernel::Factor {
                            loadings: loadings.clone(),
                            inv_noise,
                            m_factor,
                            q,
                        },
                    },
                    None => Self {
                        half_log_det: S::from_f64(Float::NAN),
                        kernel: Kernel::Broken,
                    },
                }
            }
        }
    }

    /// $`r^\intercal\Sigma^{-1}r`$
    fn mahalanobis(&self, r: &[S], d: usize) -> S {
        match &self.kernel {
            Kernel::Cholesky { factor } => {
                let z = linalg::forward_substitution(factor, r, d);
                linalg::dot(&z, &z)
            }
            Kernel::Eigen {
                orientation,
                inv_scales,
            } => {
                let rotated = orientation
                    .as_ref()
                    .map(|o| linalg::transpose_matvec(o, r, d, d));
                let y = rotated.as_deref().unwrap_or(r);
                y.iter()
                    .zip(inv_scales)
                    .map(|(&yj, &inv)| yj * yj * inv)
                    .sum()
            }
            Kernel::Factor {
                loadings,
                inv_noise,
                m_factor,
                q,
            } => {
                let a: Vec<S> = r.iter().zip(inv_noise).map(|(&rj, &w)| rj * w).collect();
                let diagonal = linalg::dot(r, &a);
                let b = linalg::transpose_matvec(loadings, &a, d, *q);
                let c = linalg::forward_substitution(m_factor, &b, *q);
                diagonal - linalg::dot(&c, &c)
            }
            Kernel::Broken => S::from_f64(Float::NAN),
        }
    }
}

/// Gaussian log density given the Mahalanobis distance and half the log-determinant.
fn gaussian_log_density<S: Scalar>(delta: S, half_log_det: S, d: usize) -> S {
    S::from_f64(-0.5 * d as Float * LN_2PI) - half_log_det - delta.scale(0.5)
}

/// Multivariate t log density with `nu` degrees of freedom.
fn student_t_log_density<S: Scalar>(delta: S, half_log_det: S, nu: S, d: usize) -> S {
    let d_f = d as Float;
    let half_total = (nu + S::from_f64(d_f)).scale(0.5);
    half_total.ln_gamma()
        - nu.scale(0.5).ln_gamma()
        - (nu.scale(std::f64::consts::PI)).ln().scale(0.5 * d_f)
        - half_log_det
        - half_total * (S::one() + delta / nu).ln()
}

/// The `n×k` table of $`\ln\pi_c + \ln f_c(x_i)`$.
pub fn component_log_joint<S: Scalar>(
    data: &Dataset,
    params: &MixtureParameters<S>,
) -> Vec<Vec<S>> {
    let d = params.d;
    let prepared: Vec<PreparedComponent<S>> = params
        .covariances
        .iter()
        .map(|cov| PreparedComponent::new(cov, d))
        .collect();
    let x = data.matrix();
    (0..data.n())
        .map(|i| {
            prepared
                .iter()
                .enumerate()
                .map(|(c, component)| {
                    let r: Vec<S> = (0..d)
                        .map(|j| S::from_f64(x[(i, j)]) - params.means[c][j])
                        .collect();
                    let delta = component.mahalanobis(&r, d);
                    let log_density = match &params.dof {
                        Some(dof) => {
                            student_t_log_density(delta, component.half_log_det, dof[c], d)
                        }
                        None => gaussian_log_density(delta, component.half_log_det, d),
                    };
                    params.log_weights[c] + log_density
                })
                .collect()
        })
        .collect()
}

/// Max-shifted log-sum-exp whose shift is held constant under differentiation.
fn row_log_sum_exp<S: Scalar>(values: &[S]) -> S {
    let max = values
        .iter()
        .map(Scalar::value)
        .fold(Float::NEG_INFINITY, Float::max);
    if !max.is_finite() {
        return S::from_f64(max);
    }
    let shift = S::from_f64(max);
    values.iter().map(|&v| (v - shift).exp()).sum::<S>().ln() + shift
}

/// $`\sum_i \ln\sum_c \pi_c f_c(x_i)`$ for any [`Scalar`], with no validity checks.
///
/// This is the function differentiated during a fit. Use [`log_likelihood`] to detect collapsed
/// covariances.
pub fn total_log_likelihood<S: Scalar>(data: &Dataset, params: &MixtureParameters<S>) -> S {
    component_log_joint(data, params)
        .iter()
        .map(|row| row_log_sum_exp(row))
        .sum()
}

fn check_dimensions(data: &Dataset, params: &MixtureParameters<Float>) -> Result<()> {
    if data.d() != params.d {
        return Err(MixtureError::InvalidArgument(format!(
            "the data have {} features but the parameters describe {}",
            data.d(),
            params.d
        )));
    }
    Ok(())
}

/// Report the first component whose covariance has collapsed.
///
/// # Errors
///
/// Returns [`MixtureError::DegenerateLikelihood`] if a Cholesky diagonal, an eigenvalue
/// $`\lambda A_j`$ or an error variance is below [`COLLAPSE_TOLERANCE`], or a degree of freedom
/// is not positive and finite.
pub fn check_collapse(params: &MixtureParameters<Float>) -> Result<()> {
    let d = params.d;
    let collapsed = |v: Float| !v.is_finite() || v < COLLAPSE_TOLERANCE;
    for (c, cov) in params.covariances.iter().enumerate() {
        match cov {
            Covariance::Cholesky { factor } => {
                if let Some(i) = (0..d).find(|&i| collapsed(factor[i * d + i])) {
                    return Err(MixtureError::degenerate(format!(
                        "Cholesky diagonal {i} of component {c} collapsed to {:e}",
                        factor[i * d + i]
                    )));
                }
            }
            Covariance::Eigen { volume, shape, .. } => {
                if let Some(j) = shape.iter().position(|a| collapsed(a * volume)) {
                    return Err(MixtureError::degenerate(format!(
                        "eigenvalue {j} of component {c} collapsed to {:e}",
                        shape[j] * volume
                    )));
                }
            }
            Covariance::Factor { noise, .. } => {
                if let Some(j) = noise.iter().position(|&psi| collapsed(psi)) {
                    return Err(MixtureError::degenerate(format!(
                        "error variance {j} of component {c} collapsed to {:e}",
                        noise[j]
                    )));
                }
            }
        }
    }
    if let Some(dof) = &params.dof {
        if let Some(c) = dof.iter().position(|&nu| !nu.is_finite() || nu <= 0.0) {
            return Err(MixtureError::degenerate(format!(
                "degrees of freedom of component {c} became {}",
                dof[c]
            )));
        }
    }
    Ok(())
}

/// The total log-likelihood of `data` under `params`.
///
/// # Errors
///
/// Returns [`MixtureError::InvalidArgument`] on a dimension mismatch, and
/// [`MixtureError::DegenerateLikelihood`] if a covariance collapsed or the value is not finite.
pub fn log_likelihood(data: &Dataset, params: &MixtureParameters<Float>) -> Result<Float> {
    check_dimensions(data, params)?;
    check_collapse(params)?;
    let ll = total_log_likelihood(data, params);
    if ll.is_finite() {
        Ok(ll)
    } else {
        Err(MixtureError::degenerate(format!(
            "the log-likelihood evaluated to {ll}"
        )))
    }
}

/// The `n×k` posterior component probabilities $`P(c \mid x_i)`$; every row sums to one.
///
/// # Errors
///
/// Same as [`log_likelihood`], plus [`MixtureError::DegenerateLikelihood`] if an observation has
/// zero density under every component.
pub fn responsibilities(data: &Dataset, params: &MixtureParameters<Float>) -> Result<DMatrix<Float>> {
    check_dimensions(data, params)?;
    check_collapse(params)?;
    let joint = component_log_joint(data, params);
    let mut out = DMatrix::zeros(data.n(), params.k());
    for (i, row) in joint.iter().enumerate() {
        let norm = LogSumExp::ln_sum_exp(row.iter());
        if !norm.is_finite() {
            return Err(MixtureError::degenerate(format!(
                "observation {i} has log-density {norm} under the mixture"
            )));
        }
        for (c, &v) in row.iter().enumerate() {
            out[(i, c)] = (v - norm).exp();
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::{Family, MixtureSpec};
    use approx::assert_relative_eq;
    use nalgebra::{DVector, SymmetricEigen};

    fn dense_gaussian_log_density(x: &DVector<Float>, mean: &DVector<Float>, cov: &DMatrix<Float>) -> Float {
        let d = x.len() as Float;
        let r = x - mean;
        let chol = cov.clone().cholesky().unwrap();
        let log_det = 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<Float>();
        let delta = r.dot(&chol.solve(&r));
        -0.5 * (d * LN_2PI + log_det + delta)
    }

    fn toy_data() -> Dataset {
        Dataset::from_rows(&[
            [0.1, 1.2, -0.3],
            [1.5, -0.2, 0.8],
            [-0.7, 0.4, 2.0],
            [2.2, 1.1, -1.0],
            [0.0, 0.0, 0.0],
        ])
        .unwrap()
    }

    fn spec_params(spec: &MixtureSpec, seed: u64) -> MixtureParameters {
        let mut rng = fastrand::Rng::with_seed(seed);
        let x: Vec<Float> = (0..spec.dimension()).map(|_| rng.f64() - 0.5).collect();
        spec.forward(&x).unwrap()
    }

    #[test]
    fn matches_dense_density_for_every_structure() {
        let data = toy_data();
        let specs = [
            MixtureSpec::new(Family::Gmm, 2, 3, None).unwrap(),
            MixtureSpec::new(Family::Mclust("VEV".parse().unwrap()), 2, 3, None).unwrap(),
            MixtureSpec::new(Family::Mclust("EII".parse().unwrap()), 2, 3, None).unwrap(),
            MixtureSpec::new(Family::Mfa, 2, 3, Some(2)).unwrap(),
            MixtureSpec::new(Family::Pgmm("CUC".parse().unwrap()), 2, 3, Some(1)).unwrap(),
        ];
        for (seed, spec) in specs.iter().enumerate() {
            let params = spec_params(spec, seed as u64);
            let expected: Float = (0..data.n())
                .map(|i| {
                    let x = DVector::from_vec(data.row(i));
                    let terms: Vec<Float> = (0..2)
                        .map(|c| {
                            params.log_weights[c]
                                + dense_gaussian_log_density(
                                    &x,
                                    &params.mean(c),
                                    &params.covariance_matrix(c),
                                )
                        })
                        .collect();
                    LogSumExp::ln_sum_exp(terms.iter())
                })
                .sum();
            assert_relative_eq!(
                log_likelihood(&data, &params).unwrap(),
                expected,
                epsilon = 1e-9,
                max_relative = 1e-10
            );
        }
    }

    #[test]
    fn woodbury_determinant_matches_dense() {
        let spec = MixtureSpec::new(Family::Mfa, 1, 3, Some(2)).unwrap();
        let params = spec_params(&spec, 3);
        let prepared = PreparedComponent::new(&params.covariances[0], 3);
        let eigen = SymmetricEigen::new(params.covariance_matrix(0));
        let log_det: Float = eigen.eigenvalues.iter().map(|v| v.ln()).sum();
        assert_relative_eq!(2.0 * prepared.half_log_det, log_det, epsilon = 1e-10);
    }

    #[test]
    fn student_t_approaches_gaussian() {
        let data = toy_data();
        let tmm = MixtureSpec::new(Family::Tmm, 2, 3, None).unwrap();
        let gmm = MixtureSpec::new(Family::Gmm, 2, 3, None).unwrap();
        let mut x: Vec<Float> = (0..gmm.dimension()).map(|i| (i as Float * 0.37).sin() * 0.3).collect();
        let gaussian = log_likelihood(&data, &gmm.forward(&x).unwrap()).unwrap();
        x.extend([(1e8 as Float).ln(); 2]);
        let student = log_likelihood(&data, &tmm.forward(&x).unwrap()).unwrap();
        assert_relative_eq!(student, gaussian, max_relative = 1e-5);
    }

    #[test]
    fn responsibilities_rows_sum_to_one() {
        let data = toy_data();
        let spec = MixtureSpec::new(Family::Tmm, 3, 3, None).unwrap();
        let params = spec_params(&spec, 5);
        let gamma = responsibilities(&data, &params).unwrap();
        for row in gamma.row_iter() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn collapsed_covariance_is_degenerate() {
        let data = toy_data();
        let spec = MixtureSpec::new(Family::Gmm, 2, 3, None).unwrap();
        let mut x = vec![0.0; spec.dimension()];
        // first diagonal entry of chol[0]
        x[1 + 6] = -400.0;
        let params = spec.forward(&x).unwrap();
        assert!(matches!(
            log_likelihood(&data, &params),
            Err(MixtureError::DegenerateLikelihood { .. })
        ));
        let other = Dataset::from_rows(&[[0.0, 1.0], [1.0, 0.0]]).unwrap();
        assert!(log_likelihood(&other, &spec_params(&spec, 0))
            .unwrap_err()
            .is_invalid_argument());
    }
}
