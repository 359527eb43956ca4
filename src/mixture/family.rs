use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{MixtureError, Result};

/// The mixture families, without their structural codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FamilyKind {
    /// Gaussian mixture with a full covariance per component.
    Gmm,
    /// Gaussian mixture whose components share one full covariance matrix.
    GmmConstrained,
    /// Gaussian mixture with an eigen-decomposed (volume/shape/orientation) covariance.
    Mclust,
    /// Mixture of factor analyzers.
    Mfa,
    /// Parsimonious Gaussian mixture (constrained mixture of factor analyzers).
    Pgmm,
    /// Mixture of multivariate t distributions.
    Tmm,
}

impl FromStr for FamilyKind {
    type Err = MixtureError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GMM" => Ok(Self::Gmm),
            "GMM-CONSTRAINED" | "GMM_CONSTRAINED" => Ok(Self::GmmConstrained),
            "MCLUST" => Ok(Self::Mclust),
            "MFA" => Ok(Self::Mfa),
            "PGMM" => Ok(Self::Pgmm),
            "TMM" => Ok(Self::Tmm),
            _ => Err(MixtureError::InvalidArgument(format!(
                "unknown mixture family \"{s}\""
            ))),
        }
    }
}

impl Display for FamilyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Gmm => "GMM",
            Self::GmmConstrained => "GMM-Constrained",
            Self::Mclust => "MCLUST",
            Self::Mfa => "MFA",
            Self::Pgmm => "PGMM",
            Self::Tmm => "TMM",
        };
        write!(f, "{name}")
    }
}

/// How one covariance attribute is shared across components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tie {
    /// One value shared by every component.
    Equal,
    /// One value per component.
    Variable,
    /// Fixed to the identity (contributes no free parameters).
    Identity,
}

impl Tie {
    const fn letter(self) -> char {
        match self {
            Self::Equal => 'E',
            Self::Variable => 'V',
            Self::Identity => 'I',
        }
    }

    /// Number of copies of a block with this tie across `k` components.
    pub const fn copies(self, k: usize) -> usize {
        match self {
            Self::Equal => 1,
            Self::Variable => k,
            Self::Identity => 0,
        }
    }
}

/// An MCLUST covariance structure: volume, shape and orientation of
/// $`\Sigma_c = \lambda_c D_c A_c D_c^\intercal`$.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MclustCode {
    /// Volume $`\lambda`$ (never the identity).
    pub volume: Tie,
    /// Shape $`A`$, a diagonal with unit determinant.
    pub shape: Tie,
    /// Orientation $`D`$, an orthogonal matrix.
    pub orientation: Tie,
}

impl MclustCode {
    /// Every supported code, from most to least constrained.
    pub const VALID: [&'static str; 14] = [
        "EII", "VII", "EEI", "VEI", "EVI", "VVI", "EEE", "VEE", "EVE", "VVE", "EEV", "VEV", "EVV",
        "VVV",
    ];
}

impl Default for MclustCode {
    fn default() -> Self {
        Self {
            volume: Tie::Variable,
            shape: Tie::Variable,
            orientation: Tie::Variable,
        }
    }
}

impl FromStr for MclustCode {
    type Err = MixtureError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.to_ascii_uppercase();
        if !Self::VALID.contains(&code.as_str()) {
            return Err(MixtureError::InvalidStructuralParameter(format!(
                "\"{s}\" is not an MCLUST model type (expected one of {})",
                Self::VALID.join(", ")
            )));
        }
        let tie = |c: u8| match c {
            b'E' => Tie::Equal,
            b'V' => Tie::Variable,
            _ => Tie::Identity,
        };
        let bytes = code.as_bytes();
        Ok(Self {
            volume: tie(bytes[0]),
            shape: tie(bytes[1]),
            orientation: tie(bytes[2]),
        })
    }
}

impl Display for MclustCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.volume.letter(),
            self.shape.letter(),
            self.orientation.letter()
        )
    }
}

/// A PGMM covariance structure $`\Sigma_c = \Lambda_c\Lambda_c^\intercal + \Psi_c`$: whether the
/// loadings are constrained (shared) across components, whether the error variance is
/// constrained (shared), and whether the error variance is constrained to be isotropic.
///
/// The default is `UUU`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PgmmCode {
    /// `true` (C) if all components share one loading matrix.
    pub shared_loadings: bool,
    /// `true` (C) if all components share one error variance.
    pub shared_noise: bool,
    /// `true` (C) if the error variance is $`\psi I`$.
    pub isotropic: bool,
}

impl PgmmCode {
    /// Every supported code.
    pub const VALID: [&'static str; 8] = ["CCC", "CCU", "CUC", "CUU", "UCC", "UCU", "UUC", "UUU"];

    /// Number of free error-variance entries for `k` components in `d` dimensions.
    pub const fn noise_len(&self, k: usize, d: usize) -> usize {
        let per_copy = if self.isotropic { 1 } else { d };
        let copies = if self.shared_noise { 1 } else { k };
        per_copy * copies
    }
}

impl FromStr for PgmmCode {
    type Err = MixtureError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.to_ascii_uppercase();
        if !Self::VALID.contains(&code.as_str()) {
            return Err(MixtureError::InvalidStructuralParameter(format!(
                "\"{s}\" is not a PGMM model type (expected one of {})",
                Self::VALID.join(", ")
            )));
        }
        let bytes = code.as_bytes();
        Ok(Self {
            shared_loadings: bytes[0] == b'C',
            shared_noise: bytes[1] == b'C',
            isotropic: bytes[2] == b'C',
        })
    }
}

impl Display for PgmmCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let letter = |constrained: bool| if constrained { 'C' } else { 'U' };
        write!(
            f,
            "{}{}{}",
            letter(self.shared_loadings),
            letter(self.shared_noise),
            letter(self.isotropic)
        )
    }
}

/// A mixture family together with its covariance structure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    /// See [`FamilyKind::Gmm`].
    Gmm,
    /// See [`FamilyKind::GmmConstrained`].
    GmmConstrained,
    /// See [`FamilyKind::Mclust`].
    Mclust(MclustCode),
    /// See [`FamilyKind::Mfa`].
    Mfa,
    /// See [`FamilyKind::Pgmm`].
    Pgmm(PgmmCode),
    /// See [`FamilyKind::Tmm`].
    Tmm,
}

impl Family {
    /// Build a family from its kind and an optional `model_type` code.
    ///
    /// An absent code selects the default structure: `VVV` for MCLUST and `UUU` for PGMM.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidStructuralParameter`] for an unknown code, or for a code
    /// given to a family which has none.
    pub fn new(kind: FamilyKind, model_type: Option<&str>) -> Result<Self> {
        match (kind, model_type) {
            (FamilyKind::Mclust, code) => Ok(Self::Mclust(
                code.map(str::parse).transpose()?.unwrap_or_default(),
            )),
            (FamilyKind::Pgmm, code) => Ok(Self::Pgmm(
                code.map(str::parse).transpose()?.unwrap_or_default(),
            )),
            (kind, Some(code)) => Err(MixtureError::InvalidStructuralParameter(format!(
                "the {kind} family takes no model type (got \"{code}\")"
            ))),
            (FamilyKind::Gmm, None) => Ok(Self::Gmm),
            (FamilyKind::GmmConstrained, None) => Ok(Self::GmmConstrained),
            (FamilyKind::Mfa, None) => Ok(Self::Mfa),
            (FamilyKind::Tmm, None) => Ok(Self::Tmm),
        }
    }

    /// The family without its code.
    pub const fn kind(&self) -> FamilyKind {
        match self {
            Self::Gmm => FamilyKind::Gmm,
            Self::GmmConstrained => FamilyKind::GmmConstrained,
            Self::Mclust(_) => FamilyKind::Mclust,
            Self::Mfa => FamilyKind::Mfa,
            Self::Pgmm(_) => FamilyKind::Pgmm,
            Self::Tmm => FamilyKind::Tmm,
        }
    }

    /// Whether the family has latent factors (and therefore needs `q`).
    pub const fn has_factors(&self) -> bool {
        matches!(self, Self::Mfa | Self::Pgmm(_))
    }

    /// MFA is PGMM with every attribute unconstrained.
    pub(crate) fn factor_code(&self) -> Option<PgmmCode> {
        match self {
            Self::Mfa => Some(PgmmCode::default()),
            Self::Pgmm(code) => Some(*code),
            _ => None,
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mclust(code) => write!(f, "MCLUST({code})"),
            Self::Pgmm(code) => write!(f, "PGMM({code})"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// A family bound to its structural parameters: `k` components in `d` dimensions, with `q`
/// latent factors for factor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixtureSpec {
    family: Family,
    k: usize,
    d: usize,
    q: Option<usize>,
}

impl MixtureSpec {
    /// Validate and build a specification.
    ///
    /// # Errors
    ///
    /// Returns [`MixtureError::InvalidArgument`] if `k < 1` or `d < 1`, and
    /// [`MixtureError::InvalidStructuralParameter`] if `q` is missing or outside `[1, d)` for a
    /// factor family, or given to a family without factors.
    pub fn new(family: Family, k: usize, d: usize, q: Option<usize>) -> Result<Self> {
        if k < 1 {
            return Err(MixtureError::InvalidArgument(format!(
                "the number of components must be at least 1 (got {k})"
            )));
        }
        if d < 1 {
            return Err(MixtureError::InvalidArgument(
                "the data must have at least one feature".to_string(),
            ));
        }
        match (family.has_factors(), q) {
            (true, None) => {
                return Err(MixtureError::InvalidStructuralParameter(format!(
                    "the {family} family requires a number of latent factors q"
                )))
            }
            (true, Some(q)) if q < 1 || q >= d => {
                return Err(MixtureError::InvalidStructuralParameter(format!(
                    "the number of latent factors must satisfy 1 <= q < d = {d} (got q = {q})"
                )))
            }
            (false, Some(q)) => {
                return Err(MixtureError::InvalidStructuralParameter(format!(
                    "the {family} family has no latent factors (got q = {q})"
                )))
            }
            _ => {}
        }
        Ok(Self { family, k, d, q })
    }

    /// The family and its code.
    pub const fn family(&self) -> Family {
        self.family
    }

    /// Number of components.
    pub const fn k(&self) -> usize {
        self.k
    }

    /// Number of features.
    pub const fn d(&self) -> usize {
        self.d
    }

    /// Number of latent factors ([`None`] unless the family has factors).
    pub const fn q(&self) -> Option<usize> {
        self.q
    }

    /// The number of free parameters used by AIC and BIC.
    ///
    /// This is a structural count: tied attributes count once, identity attributes not at all,
    /// and factor loadings lose the $`q(q-1)/2`$ degrees of freedom of their rotational
    /// invariance. It is therefore not the length of the unconstrained vector in general.
    pub fn num_free_params(&self) -> usize {
        let (k, d) = (self.k, self.d);
        let location = (k - 1) + k * d;
        let full = d * (d + 1) / 2;
        let covariance = match self.family {
            Family::Gmm => k * full,
            Family::GmmConstrained => full,
            Family::Tmm => k * full + k,
            Family::Mclust(code) => {
                code.volume.copies(k)
                    + code.shape.copies(k) * (d - 1)
                    + code.orientation.copies(k) * (d * (d - 1) / 2)
            }
            Family::Mfa | Family::Pgmm(_) => {
                let q = self.q.unwrap_or(0);
                let code = self.family.factor_code().unwrap_or_default();
                let loadings = d * q - q * (q.saturating_sub(1)) / 2;
                let loading_copies = if code.shared_loadings { 1 } else { k };
                loading_copies * loadings + code.noise_len(k, d)
            }
        };
        location + covariance
    }
}

impl Display for MixtureSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (k = {}, d = {}", self.family, self.k, self.d)?;
        if let Some(q) = self.q {
            write!(f, ", q = {q}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_codes() {
        for code in MclustCode::VALID {
            assert_eq!(code.parse::<MclustCode>().unwrap().to_string(), code);
        }
        for code in PgmmCode::VALID {
            assert_eq!(code.parse::<PgmmCode>().unwrap().to_string(), code);
        }
        assert_eq!("vei".parse::<MclustCode>().unwrap().to_string(), "VEI");
        assert!(matches!(
            "EIV".parse::<MclustCode>(),
            Err(MixtureError::InvalidStructuralParameter(_))
        ));
        assert!("CCX".parse::<PgmmCode>().is_err());
        assert_eq!("gmm-constrained".parse::<FamilyKind>(), Ok(FamilyKind::GmmConstrained));
    }

    #[test]
    fn default_model_types() {
        assert_eq!(
            Family::new(FamilyKind::Mclust, None).unwrap().to_string(),
            "MCLUST(VVV)"
        );
        assert_eq!(
            Family::new(FamilyKind::Pgmm, None).unwrap().to_string(),
            "PGMM(UUU)"
        );
        assert!(Family::new(FamilyKind::Gmm, Some("VVV")).is_err());
    }

    #[test]
    fn structural_validation() {
        let err = MixtureSpec::new(Family::Gmm, 0, 2, None).unwrap_err();
        assert!(matches!(err, MixtureError::InvalidArgument(_)));
        let err = MixtureSpec::new(Family::Mfa, 2, 3, Some(3)).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(MixtureSpec::new(Family::Mfa, 2, 3, Some(0)).is_err());
        assert!(MixtureSpec::new(Family::Mfa, 2, 3, None).is_err());
        assert!(MixtureSpec::new(Family::Gmm, 2, 3, Some(1)).is_err());
        assert!(MixtureSpec::new(Family::Mfa, 2, 3, Some(2)).is_ok());
    }

    #[test]
    fn free_parameter_counts() {
        let count = |family: Family, q: Option<usize>| {
            MixtureSpec::new(family, 3, 4, q)
                .unwrap()
                .num_free_params()
        };
        // 2 weights + 12 means
        assert_eq!(count(Family::Gmm, None), 14 + 30);
        assert_eq!(count(Family::GmmConstrained, None), 14 + 10);
        assert_eq!(count(Family::Tmm, None), 14 + 30 + 3);
        let mclust = |code: &str| count(Family::Mclust(code.parse().unwrap()), None);
        assert_eq!(mclust("EII"), 14 + 1);
        assert_eq!(mclust("VII"), 14 + 3);
        assert_eq!(mclust("EEE"), 14 + 1 + 3 + 6);
        assert_eq!(mclust("VVV"), count(Family::Gmm, None));
        // loadings: 4*2 - 1 = 7 per copy
        assert_eq!(count(Family::Mfa, Some(2)), 14 + 3 * (7 + 4));
        let pgmm = |code: &str| count(Family::Pgmm(code.parse().unwrap()), Some(2));
        assert_eq!(pgmm("UUU"), count(Family::Mfa, Some(2)));
        assert_eq!(pgmm("CCC"), 14 + 7 + 1);
        assert_eq!(pgmm("CUC"), 14 + 7 + 3);
        assert_eq!(pgmm("UCU"), 14 + 21 + 4);
    }

    #[test]
    fn unconstrained_structures_never_have_fewer_parameters() {
        for d in 1..6 {
            for k in 1..5 {
                let p = |code: &str| {
                    MixtureSpec::new(Family::Mclust(code.parse().unwrap()), k, d, None)
                        .unwrap()
                        .num_free_params()
                };
                assert!(p("VVV") >= p("EII"));
                assert!(p("VVV") >= p("EEE"));
                assert!(p("EEE") >= p("EII"));
            }
        }
    }
}
