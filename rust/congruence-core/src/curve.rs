//! Elliptic curve records over Q.
//!
//! A [`Curve`] is a global minimal Weierstrass model
//!   y^2 + a1*x*y + a3*y = x^3 + a2*x^2 + a4*x + a6
//! together with its label and the local data at the bad primes. Everything
//! else the pipeline needs (discriminant, j-invariant, Frobenius traces) is
//! derived from those.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::frobenius;

/// Errors raised while building curve records.
#[derive(Debug, thiserror::Error)]
pub enum CurveError {
    #[error("malformed a-invariants '{0}'")]
    MalformedInvariants(String),

    #[error("malformed curve label '{0}'")]
    MalformedLabel(String),

    #[error("curve {0} is singular")]
    Singular(String),

    #[error("model of {label} is not minimal: discriminant has unexpected factor {cofactor}")]
    NonMinimalModel { label: String, cofactor: BigInt },

    #[error("conductor of {0} does not fit in 64 bits")]
    ConductorOverflow(String),
}

/// Reduction type at a prime of bad reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReductionType {
    #[serde(rename = "split")]
    SplitMultiplicative,
    #[serde(rename = "nonsplit")]
    NonSplitMultiplicative,
    #[serde(rename = "additive")]
    Additive,
}

impl ReductionType {
    pub fn is_multiplicative(self) -> bool {
        !matches!(self, ReductionType::Additive)
    }
}

/// Local data at one bad prime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalData {
    pub prime: u64,
    /// Exponent of the prime in the conductor.
    pub exponent: u32,
    pub reduction: ReductionType,
}

/// Label of a curve.
///
/// Curves found in the database carry their Cremona label. Curves produced
/// along the way (twists outside the database range, for instance) have no
/// primary label and are named by conductor and a-invariants instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CurveLabel {
    Cremona(String),
    Unlabelled { conductor: u64, ainvs: [BigInt; 5] },
}

impl CurveLabel {
    pub fn cremona(label: impl Into<String>) -> Self {
        CurveLabel::Cremona(label.into())
    }

    pub fn has_primary_label(&self) -> bool {
        matches!(self, CurveLabel::Cremona(_))
    }
}

impl fmt::Display for CurveLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveLabel::Cremona(label) => write!(f, "{}", label),
            CurveLabel::Unlabelled { conductor, ainvs } => write!(
                f,
                "{}.({}, {}, {}, {}, {})",
                conductor, ainvs[0], ainvs[1], ainvs[2], ainvs[3], ainvs[4]
            ),
        }
    }
}

impl FromStr for CurveLabel {
    type Err = CurveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CurveError::MalformedLabel(s.to_string()));
        }
        match s.split_once(".(") {
            Some((conductor, rest)) => {
                let conductor = conductor
                    .parse::<u64>()
                    .map_err(|_| CurveError::MalformedLabel(s.to_string()))?;
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| CurveError::MalformedLabel(s.to_string()))?;
                let ainvs = parse_ainvs(inner)
                    .map_err(|_| CurveError::MalformedLabel(s.to_string()))?;
                Ok(CurveLabel::Unlabelled { conductor, ainvs })
            }
            None => Ok(CurveLabel::Cremona(s.to_string())),
        }
    }
}

impl From<CurveLabel> for String {
    fn from(label: CurveLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for CurveLabel {
    type Error = CurveError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// prod l^f over the local data, or `None` if it overflows.
pub fn conductor_from_local_data(local_data: &[LocalData]) -> Option<u64> {
    local_data.iter().try_fold(1u64, |acc, ld| {
        ld.prime.checked_pow(ld.exponent)?.checked_mul(acc)
    })
}

/// Parse a-invariants written as `[a1,a2,a3,a4,a6]` or `a1, a2, a3, a4, a6`.
pub fn parse_ainvs(s: &str) -> Result<[BigInt; 5], CurveError> {
    let trimmed = s
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    let values: Vec<BigInt> = trimmed
        .split(',')
        .map(|t| t.trim().parse::<BigInt>())
        .collect::<Result<_, _>>()
        .map_err(|_| CurveError::MalformedInvariants(s.to_string()))?;
    values
        .try_into()
        .map_err(|_| CurveError::MalformedInvariants(s.to_string()))
}

/// An elliptic curve over Q given by a global minimal model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curve {
    pub label: CurveLabel,
    pub ainvs: [BigInt; 5],
    /// Bad primes in increasing order.
    pub local_data: Vec<LocalData>,
    pub conductor: u64,
}

/// The b- and c-invariants of a Weierstrass model.
#[derive(Debug, Clone)]
pub struct Invariants {
    pub b2: BigInt,
    pub b4: BigInt,
    pub b6: BigInt,
    pub b8: BigInt,
    pub c4: BigInt,
    pub c6: BigInt,
    pub discriminant: BigInt,
}

impl Invariants {
    pub fn of(ainvs: &[BigInt; 5]) -> Self {
        let [a1, a2, a3, a4, a6] = ainvs;
        let b2: BigInt = a1 * a1 + a2 * 4u32;
        let b4: BigInt = a4 * 2u32 + a1 * a3;
        let b6: BigInt = a3 * a3 + a6 * 4u32;
        let b8: BigInt = a1 * a1 * a6 + a2 * a6 * 4u32 - a1 * a3 * a4 + a2 * a3 * a3 - a4 * a4;
        let c4: BigInt = &b2 * &b2 - &b4 * 24u32;
        let c6: BigInt = -(&b2 * &b2 * &b2) + &b2 * &b4 * 36u32 - &b6 * 216u32;
        let discriminant: BigInt = -(&b2 * &b2 * &b8) - &b4 * &b4 * &b4 * 8u32
            - &b6 * &b6 * 27u32
            + &b2 * &b4 * &b6 * 9u32;
        Invariants {
            b2,
            b4,
            b6,
            b8,
            c4,
            c6,
            discriminant,
        }
    }
}

impl Curve {
    /// Build a curve record, checking that the model is non-singular and that
    /// its discriminant is supported exactly on the listed bad primes.
    pub fn new(
        label: CurveLabel,
        ainvs: [BigInt; 5],
        mut local_data: Vec<LocalData>,
    ) -> Result<Self, CurveError> {
        local_data.sort_by_key(|ld| ld.prime);
        let discriminant = Invariants::of(&ainvs).discriminant;
        if discriminant.is_zero() {
            return Err(CurveError::Singular(label.to_string()));
        }

        let mut cofactor = discriminant.abs();
        for ld in &local_data {
            let prime = BigInt::from(ld.prime);
            while cofactor.is_multiple_of(&prime) {
                cofactor /= &prime;
            }
        }
        if !cofactor.is_one() {
            return Err(CurveError::NonMinimalModel {
                label: label.to_string(),
                cofactor,
            });
        }

        let conductor = conductor_from_local_data(&local_data)
            .ok_or_else(|| CurveError::ConductorOverflow(label.to_string()))?;

        Ok(Curve {
            label,
            ainvs,
            local_data,
            conductor,
        })
    }

    pub fn invariants(&self) -> Invariants {
        Invariants::of(&self.ainvs)
    }

    pub fn discriminant(&self) -> BigInt {
        self.invariants().discriminant
    }

    /// j = c4^3 / discriminant.
    pub fn j_invariant(&self) -> BigRational {
        let inv = self.invariants();
        let c4_cubed = &inv.c4 * &inv.c4 * &inv.c4;
        BigRational::new(c4_cubed, inv.discriminant)
    }

    pub fn bad_primes(&self) -> impl Iterator<Item = u64> + '_ {
        self.local_data.iter().map(|ld| ld.prime)
    }

    pub fn reduction_at(&self, ell: u64) -> Option<ReductionType> {
        self.local_data
            .iter()
            .find(|ld| ld.prime == ell)
            .map(|ld| ld.reduction)
    }

    pub fn conductor_valuation(&self, ell: u64) -> u32 {
        self.local_data
            .iter()
            .find(|ld| ld.prime == ell)
            .map(|ld| ld.exponent)
            .unwrap_or(0)
    }

    pub fn has_split_multiplicative_reduction(&self, ell: u64) -> bool {
        self.reduction_at(ell) == Some(ReductionType::SplitMultiplicative)
    }

    pub fn has_nonsplit_multiplicative_reduction(&self, ell: u64) -> bool {
        self.reduction_at(ell) == Some(ReductionType::NonSplitMultiplicative)
    }

    /// Frobenius trace a_l.
    ///
    /// At bad primes this is 1, -1 or 0 according to the reduction type; at
    /// good primes it is l + 1 - #E(F_l).
    pub fn ap(&self, ell: u64) -> i64 {
        match self.reduction_at(ell) {
            Some(ReductionType::SplitMultiplicative) => 1,
            Some(ReductionType::NonSplitMultiplicative) => -1,
            Some(ReductionType::Additive) => 0,
            None => frobenius::trace_of_frobenius(&self.ainvs, ell),
        }
    }
}

/// Reduce a big integer into [0, m).
pub(crate) fn reduce_mod(n: &BigInt, m: u64) -> u64 {
    n.mod_floor(&BigInt::from(m)).to_u64().unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn ainvs(values: [i64; 5]) -> [BigInt; 5] {
        values.map(BigInt::from)
    }

    pub fn curve_11a1() -> Curve {
        Curve::new(
            CurveLabel::cremona("11a1"),
            ainvs([0, -1, 1, -10, -20]),
            vec![LocalData {
                prime: 11,
                exponent: 1,
                reduction: ReductionType::SplitMultiplicative,
            }],
        )
        .unwrap()
    }

    pub fn curve_37a1() -> Curve {
        Curve::new(
            CurveLabel::cremona("37a1"),
            ainvs([0, 0, 1, -1, 0]),
            vec![LocalData {
                prime: 37,
                exponent: 1,
                reduction: ReductionType::NonSplitMultiplicative,
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_discriminant_and_j_invariant_11a1() {
        let e = curve_11a1();
        assert_eq!(e.discriminant(), BigInt::from(-161051));
        assert_eq!(
            e.j_invariant(),
            BigRational::new(BigInt::from(-122023936), BigInt::from(161051))
        );
        assert_eq!(e.conductor, 11);
    }

    #[test]
    fn test_non_minimal_model_rejected() {
        // 11a1 with the wrong bad prime list
        let err = Curve::new(
            CurveLabel::cremona("11a1"),
            ainvs([0, -1, 1, -10, -20]),
            vec![LocalData {
                prime: 13,
                exponent: 1,
                reduction: ReductionType::SplitMultiplicative,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, CurveError::NonMinimalModel { .. }));
    }

    #[test]
    fn test_conductor_overflow_rejected() {
        // 11^40 does not fit in a u64
        let err = Curve::new(
            CurveLabel::cremona("11a1"),
            ainvs([0, -1, 1, -10, -20]),
            vec![LocalData {
                prime: 11,
                exponent: 40,
                reduction: ReductionType::SplitMultiplicative,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, CurveError::ConductorOverflow(_)));
        assert_eq!(
            conductor_from_local_data(&curve_11a1().local_data),
            Some(11)
        );
    }

    #[test]
    fn test_singular_model_rejected() {
        let err = Curve::new(CurveLabel::cremona("cusp"), ainvs([0, 0, 0, 0, 0]), vec![])
            .unwrap_err();
        assert!(matches!(err, CurveError::Singular(_)));
    }

    #[test]
    fn test_label_parsing() {
        let cremona: CurveLabel = "11a1".parse().unwrap();
        assert!(cremona.has_primary_label());

        let fallback = CurveLabel::Unlabelled {
            conductor: 176,
            ainvs: ainvs([0, 1, 0, -10, -20]),
        };
        let text = fallback.to_string();
        assert_eq!(text, "176.(0, 1, 0, -10, -20)");
        let parsed: CurveLabel = text.parse().unwrap();
        assert_eq!(parsed, fallback);
        assert!(!parsed.has_primary_label());

        assert!("".parse::<CurveLabel>().is_err());
        assert!("12.(1, 2)".parse::<CurveLabel>().is_err());
    }

    #[test]
    fn test_parse_ainvs() {
        assert_eq!(
            parse_ainvs("[0,-1,1,-7820,-263580]").unwrap(),
            ainvs([0, -1, 1, -7820, -263580])
        );
        assert!(parse_ainvs("[0,1,2]").is_err());
        assert!(parse_ainvs("[a,b,c,d,e]").is_err());
    }

    #[test]
    fn test_ap_at_bad_primes() {
        let e = curve_11a1();
        assert_eq!(e.ap(11), 1);
        assert_eq!(e.conductor_valuation(11), 1);
        assert_eq!(e.conductor_valuation(5), 0);
    }
}
