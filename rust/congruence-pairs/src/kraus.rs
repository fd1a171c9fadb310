//! Kraus's criterion for congruent mod-p representations.
//!
//! Let M = lcm(N1, N2) * prod(S), S the shared bad primes where one curve is
//! split and the other non-split multiplicative, and
//! mu = M * prod_{l | M} (1 + 1/l). If for every prime l < mu/6, l != p,
//!
//! - a_l(E1) = a_l(E2) mod p when l does not divide N1*N2, and
//! - a_l(E1) * a_l(E2) = l + 1 mod p when l divides N1*N2 exactly once,
//!
//! then E1[p] and E2[p] have isomorphic semisimplifications. Deciding whether
//! the representations themselves are isomorphic needs more information: the
//! number of rational p-isogenies, the image types and the conductor
//! exponents at p. Where those do not settle it the verdict is
//! [`Verdict::Indeterminate`].

use std::fmt;

use congruence_core::{primes_below, BigUint, Curve, CurveLabel};
use num_traits::ToPrimitive;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::AlgebraBackend;
use crate::config::KrausConfig;
use crate::error::BackendError;

/// Why two representations were shown to be congruent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Justification {
    /// Only the semisimplifications were compared.
    Semisimplification,
    Irreducible,
    CompletelyReducible,
    /// One p-isogeny each, same image type, both semistable at p.
    Semistable,
}

impl Justification {
    pub fn tag(self) -> &'static str {
        match self {
            Justification::Semisimplification => "semisimplification",
            Justification::Irreducible => "irreducible",
            Justification::CompletelyReducible => "completely reducible",
            Justification::Semistable => "semistable",
        }
    }
}

/// Why two representations were shown not to be congruent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Obstruction {
    /// The trace condition fails at `ell`.
    TraceMismatch { ell: u64, a1: i64, a2: i64 },
    /// Different numbers of stable lines.
    IsogenyCount { n1: usize, n2: usize },
    ImageType { first: String, second: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Congruent(Justification),
    NotCongruent(Obstruction),
    /// Semisimplifications agree but nothing decides the representations.
    Indeterminate,
}

/// Outcome of one congruence test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongruenceTest {
    pub p: u64,
    pub first: CurveLabel,
    pub second: CurveLabel,
    pub verdict: Verdict,
    /// Primes below this were tested.
    pub tested_below: u64,
    /// Kraus bound floor(mu / 6).
    pub sufficient_bound: BigUint,
    /// Twisting discriminant applied to both curves, if any.
    pub twist: Option<i64>,
}

impl CongruenceTest {
    pub fn is_congruent(&self) -> bool {
        matches!(self.verdict, Verdict::Congruent(_))
    }

    pub fn is_disproved(&self) -> bool {
        matches!(self.verdict, Verdict::NotCongruent(_))
    }

    /// Whether the prime scan reached the Kraus bound.
    pub fn reached_bound(&self) -> bool {
        BigUint::from(self.tested_below) >= self.sufficient_bound
    }
}

impl fmt::Display for CongruenceTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b, p) = (&self.first, &self.second, self.p);
        match &self.verdict {
            Verdict::Congruent(Justification::Semisimplification) => write!(
                f,
                "{} and {} are proved to be congruent mod {} (up to semisimplification)",
                a, b, p
            ),
            Verdict::Congruent(j) => write!(
                f,
                "{} and {} are proved to be congruent mod {} ({})",
                a,
                b,
                p,
                j.tag()
            ),
            Verdict::NotCongruent(Obstruction::TraceMismatch { ell, a1, a2 }) => write!(
                f,
                "Congruence mod {} fails for {} and {} (not even isomorphic up to semisimplification: l = {}, a_l = {}, {})",
                p, a, b, ell, a1, a2
            ),
            Verdict::NotCongruent(Obstruction::IsogenyCount { n1, n2 }) => write!(
                f,
                "Congruence mod {} fails for {} and {} (isomorphic up to semisimplification but with different number of stable lines: {} and {})",
                p, a, b, n1, n2
            ),
            Verdict::NotCongruent(Obstruction::ImageType { first, second }) => write!(
                f,
                "Congruence mod {} fails for {} and {} (isomorphic up to semisimplification but with different image types: {} and {})",
                p, a, b, first, second
            ),
            Verdict::Indeterminate => write!(
                f,
                "Congruence mod {} undecided for {} and {} (isomorphic up to semisimplification, both reducible but not completely reducible)",
                p, a, b
            ),
        }
    }
}

/// Settings of one test.
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub bound_cap: u64,
    /// Stop once the semisimplifications are shown isomorphic.
    pub semisimplification_only: bool,
    pub twist: bool,
    pub twist_conductor_limit: u64,
}

impl TestOptions {
    pub fn from_config(config: &KrausConfig) -> Self {
        TestOptions {
            bound_cap: config.bound_cap,
            semisimplification_only: false,
            twist: config.twist,
            twist_conductor_limit: config.twist_conductor_limit,
        }
    }

    /// Options for verifying irreducible groups.
    pub fn for_irreducible(config: &KrausConfig) -> Self {
        TestOptions {
            bound_cap: config.irreducible_bound_cap,
            semisimplification_only: true,
            ..Self::from_config(config)
        }
    }
}

/// Shared bad primes where one curve has split and the other non-split
/// multiplicative reduction.
pub fn exceptional_primes(e1: &Curve, e2: &Curve) -> Vec<u64> {
    e1.bad_primes()
        .filter(|&ell| {
            (e1.has_split_multiplicative_reduction(ell)
                && e2.has_nonsplit_multiplicative_reduction(ell))
                || (e2.has_split_multiplicative_reduction(ell)
                    && e1.has_nonsplit_multiplicative_reduction(ell))
        })
        .collect()
}

/// floor(mu / 6) with mu = (M / rad M) * prod_{l | M} (l + 1).
pub fn kraus_bound(e1: &Curve, e2: &Curve) -> BigUint {
    let exceptional = exceptional_primes(e1, e2);
    let mut support: Vec<u64> = e1.bad_primes().chain(e2.bad_primes()).collect();
    support.sort_unstable();
    support.dedup();

    let mut mu = BigUint::from(1u32);
    for ell in support {
        let mut exponent = e1.conductor_valuation(ell).max(e2.conductor_valuation(ell));
        if exceptional.contains(&ell) {
            exponent += 1;
        }
        mu *= BigUint::from(ell).pow(exponent.saturating_sub(1)) * (ell + 1);
    }
    mu / 6u32
}

/// First prime below `limit` (other than p) where the trace condition fails.
fn first_trace_mismatch(p: u64, e1: &Curve, e2: &Curve, limit: u64) -> Option<Obstruction> {
    let modulus = p as i64;
    primes_below(limit)
        .par_iter()
        .filter(|&&ell| ell != p)
        .find_map_first(|&ell| {
            let bad_exponent = e1.conductor_valuation(ell) + e2.conductor_valuation(ell);
            let mismatch = match bad_exponent {
                0 => {
                    let (a1, a2) = (e1.ap(ell), e2.ap(ell));
                    ((a1 - a2).rem_euclid(modulus) != 0).then_some((a1, a2))
                }
                1 => {
                    let (a1, a2) = (e1.ap(ell), e2.ap(ell));
                    ((a1 * a2 - (ell as i64 + 1)).rem_euclid(modulus) != 0).then_some((a1, a2))
                }
                _ => None,
            };
            mismatch.map(|(a1, a2)| Obstruction::TraceMismatch { ell, a1, a2 })
        })
}

/// Replace (E1, E2) by (E1 ⊗ χ_d, E2 ⊗ χ_d) with E1 ⊗ χ_d of minimal conductor,
/// unless that pushes E2 above the conductor limit.
fn twist_pair(
    e1: &Curve,
    e2: &Curve,
    options: &TestOptions,
    backend: &dyn AlgebraBackend,
) -> Result<(Curve, Curve, Option<i64>), BackendError> {
    if !options.twist {
        return Ok((e1.clone(), e2.clone(), None));
    }
    let (t1, d) = backend.minimal_quadratic_twist(e1)?;
    if d == 1 {
        return Ok((e1.clone(), e2.clone(), None));
    }
    let t2 = backend.quadratic_twist(e2, d)?;
    log::debug!(
        "Twisting {} and {} by {}: conductors {} and {} become {} and {}",
        e1.label,
        e2.label,
        d,
        e1.conductor,
        e2.conductor,
        t1.conductor,
        t2.conductor
    );
    if t2.conductor > options.twist_conductor_limit {
        log::debug!(
            "Twist of {} has conductor {} above {}, testing untwisted curves",
            e2.label,
            t2.conductor,
            options.twist_conductor_limit
        );
        return Ok((e1.clone(), e2.clone(), None));
    }
    Ok((t1, t2, Some(d)))
}

/// Decide whether E1[p] and E2[p] are isomorphic (or, with
/// `semisimplification_only`, have isomorphic semisimplifications).
pub fn test_congruence(
    p: u64,
    e1: &Curve,
    e2: &Curve,
    backend: &dyn AlgebraBackend,
    options: &TestOptions,
) -> Result<CongruenceTest, BackendError> {
    let (t1, t2, twist) = twist_pair(e1, e2, options, backend)?;

    let sufficient_bound = kraus_bound(&t1, &t2);
    let limit = sufficient_bound
        .to_u64()
        .map_or(options.bound_cap, |b| b.min(options.bound_cap));
    log::debug!(
        "Curves {} and {}: testing l up to {} mod {}",
        e1.label,
        e2.label,
        limit,
        p
    );

    let result = |verdict| CongruenceTest {
        p,
        first: e1.label.clone(),
        second: e2.label.clone(),
        verdict,
        tested_below: limit,
        sufficient_bound: sufficient_bound.clone(),
        twist,
    };

    if let Some(obstruction) = first_trace_mismatch(p, &t1, &t2, limit) {
        return Ok(result(Verdict::NotCongruent(obstruction)));
    }

    if BigUint::from(limit) < sufficient_bound {
        log::warn!(
            "For curves {} and {}, to test for isomorphic semisimplifications mod {} we should have tested l up to {}, but only tested up to {}",
            e1.label,
            e2.label,
            p,
            sufficient_bound,
            limit
        );
    }

    if options.semisimplification_only {
        return Ok(result(Verdict::Congruent(Justification::Semisimplification)));
    }

    let n1 = backend.prime_isogenies(&t1, p)?.len();
    let n2 = backend.prime_isogenies(&t2, p)?.len();
    if n1 == 0 && n2 == 0 {
        return Ok(result(Verdict::Congruent(Justification::Irreducible)));
    }
    if n1 == n2 && n1 > 1 {
        return Ok(result(Verdict::Congruent(Justification::CompletelyReducible)));
    }
    if n1 != n2 {
        return Ok(result(Verdict::NotCongruent(Obstruction::IsogenyCount { n1, n2 })));
    }

    // One stable line each
    let im1 = backend.image_type(&t1, p)?;
    let im2 = backend.image_type(&t2, p)?;
    if im1 != im2 {
        return Ok(result(Verdict::NotCongruent(Obstruction::ImageType {
            first: im1,
            second: im2,
        })));
    }
    if t1.conductor_valuation(p) <= 1 && t2.conductor_valuation(p) <= 1 {
        return Ok(result(Verdict::Congruent(Justification::Semistable)));
    }
    Ok(result(Verdict::Indeterminate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{curve, fixture_curve, FakeBackend};
    use congruence_core::ReductionType;

    fn options() -> TestOptions {
        TestOptions::from_config(&KrausConfig::default())
    }

    #[test]
    fn test_kraus_bound_11a1_37a1() {
        // M = 407, mu = 12 * 38 = 456
        let bound = kraus_bound(&fixture_curve("11a1"), &fixture_curve("37a1"));
        assert_eq!(bound, BigUint::from(76u32));
    }

    #[test]
    fn test_exceptional_prime_enters_bound() {
        use ReductionType::*;
        let split = curve("11a1", [0, -1, 1, -10, -20], &[(11, 1, SplitMultiplicative)]);
        let nonsplit = curve("11x", [0, -1, 1, 0, 0], &[(11, 1, NonSplitMultiplicative)]);
        assert_eq!(exceptional_primes(&split, &nonsplit), vec![11]);
        assert_eq!(exceptional_primes(&split, &split), Vec::<u64>::new());
        // M = 121, mu = 11 * 12 = 132
        assert_eq!(kraus_bound(&split, &nonsplit), BigUint::from(22u32));
        assert_eq!(kraus_bound(&split, &split), BigUint::from(2u32));
    }

    #[test]
    fn test_first_counterexample_11a1_37a1() {
        let backend = FakeBackend::new();
        let test = test_congruence(
            5,
            &fixture_curve("11a1"),
            &fixture_curve("37a1"),
            &backend,
            &options(),
        )
        .unwrap();
        assert_eq!(
            test.verdict,
            Verdict::NotCongruent(Obstruction::TraceMismatch {
                ell: 3,
                a1: -1,
                a2: -3
            })
        );
        assert_eq!(test.tested_below, 76);
        assert!(test.reached_bound());
        assert!(test.is_disproved());
        assert!(test.to_string().contains("not even isomorphic"));
    }

    #[test]
    fn test_verdict_is_symmetric() {
        let backend = FakeBackend::new();
        let e1 = fixture_curve("11a1");
        let e2 = fixture_curve("37a1");
        let forward = test_congruence(5, &e1, &e2, &backend, &options()).unwrap();
        let backward = test_congruence(5, &e2, &e1, &backend, &options()).unwrap();
        assert_eq!(forward.is_disproved(), backward.is_disproved());
        assert_eq!(
            backward.verdict,
            Verdict::NotCongruent(Obstruction::TraceMismatch {
                ell: 3,
                a1: -3,
                a2: -1
            })
        );
        assert_eq!(forward.sufficient_bound, backward.sufficient_bound);
    }

    #[test]
    fn test_isogenous_curves_semisimplification() {
        let backend = FakeBackend::new();
        let opts = TestOptions::for_irreducible(&KrausConfig::default());
        let test = test_congruence(
            5,
            &fixture_curve("11a1"),
            &fixture_curve("11a3"),
            &backend,
            &opts,
        )
        .unwrap();
        assert_eq!(
            test.verdict,
            Verdict::Congruent(Justification::Semisimplification)
        );
        assert_eq!(
            test.to_string(),
            "11a1 and 11a3 are proved to be congruent mod 5 (up to semisimplification)"
        );
    }

    #[test]
    fn test_escalation_by_isogeny_count() {
        let e1 = fixture_curve("11a1");
        let e3 = fixture_curve("11a3");

        let irreducible = FakeBackend::new();
        let test = test_congruence(5, &e1, &e3, &irreducible, &options()).unwrap();
        assert_eq!(test.verdict, Verdict::Congruent(Justification::Irreducible));

        let split = FakeBackend::new()
            .with_isogenies("11a1", 5, 2)
            .with_isogenies("11a3", 5, 2);
        let test = test_congruence(5, &e1, &e3, &split, &options()).unwrap();
        assert_eq!(
            test.verdict,
            Verdict::Congruent(Justification::CompletelyReducible)
        );
        let swapped = test_congruence(5, &e3, &e1, &split, &options()).unwrap();
        assert_eq!(swapped.verdict, test.verdict);

        let unequal = FakeBackend::new()
            .with_isogenies("11a1", 5, 2)
            .with_isogenies("11a3", 5, 1);
        let test = test_congruence(5, &e1, &e3, &unequal, &options()).unwrap();
        assert_eq!(
            test.verdict,
            Verdict::NotCongruent(Obstruction::IsogenyCount { n1: 2, n2: 1 })
        );
        assert!(test.to_string().contains("stable lines"));
        let swapped = test_congruence(5, &e3, &e1, &unequal, &options()).unwrap();
        assert_eq!(
            swapped.verdict,
            Verdict::NotCongruent(Obstruction::IsogenyCount { n1: 1, n2: 2 })
        );

        let swapped = test_congruence(5, &e3, &e1, &irreducible, &options()).unwrap();
        assert_eq!(swapped.verdict, Verdict::Congruent(Justification::Irreducible));
    }

    #[test]
    fn test_escalation_by_image_type_and_semistability() {
        let e2 = fixture_curve("11a2");
        let e3 = fixture_curve("11a3");
        let base = || {
            FakeBackend::new()
                .with_isogenies("11a2", 5, 1)
                .with_isogenies("11a3", 5, 1)
        };

        let test = test_congruence(5, &e2, &e3, &base(), &options()).unwrap();
        assert_eq!(test.verdict, Verdict::Congruent(Justification::Semistable));
        let swapped = test_congruence(5, &e3, &e2, &base(), &options()).unwrap();
        assert_eq!(swapped.verdict, test.verdict);

        let different = base().with_image_type("11a3", "Split Cartan");
        let test = test_congruence(5, &e2, &e3, &different, &options()).unwrap();
        assert_eq!(
            test.verdict,
            Verdict::NotCongruent(Obstruction::ImageType {
                first: "Borel".to_string(),
                second: "Split Cartan".to_string()
            })
        );
        let swapped = test_congruence(5, &e3, &e2, &different, &options()).unwrap();
        assert_eq!(
            swapped.verdict,
            Verdict::NotCongruent(Obstruction::ImageType {
                first: "Split Cartan".to_string(),
                second: "Borel".to_string()
            })
        );
    }

    #[test]
    fn test_additive_at_p_is_indeterminate() {
        use ReductionType::Additive;
        // y^2 = x^3 + 5x has discriminant -2^6 * 5^3
        let local = [(2, 6, Additive), (5, 2, Additive)];
        let e = curve("1600z1", [0, 0, 0, 5, 0], &local);
        let copy = curve("1600z2", [0, 0, 0, 5, 0], &local);
        let backend = FakeBackend::new()
            .with_isogenies("1600z1", 5, 1)
            .with_isogenies("1600z2", 5, 1);
        let test = test_congruence(5, &e, &copy, &backend, &options()).unwrap();
        assert_eq!(test.verdict, Verdict::Indeterminate);
        assert!(!test.is_congruent());
        assert!(!test.is_disproved());
        let swapped = test_congruence(5, &copy, &e, &backend, &options()).unwrap();
        assert_eq!(swapped.verdict, Verdict::Indeterminate);
        // M = 1600, mu = 160 * 3 * 6
        assert_eq!(test.sufficient_bound, BigUint::from(480u32));
    }

    #[test]
    fn test_bound_cap_limits_scan() {
        let opts = TestOptions {
            bound_cap: 2,
            ..options()
        };
        let backend = FakeBackend::new();
        let test = test_congruence(
            5,
            &fixture_curve("11a1"),
            &fixture_curve("37a1"),
            &backend,
            &opts,
        )
        .unwrap();
        // no primes below 2, so the trace mismatch at 3 is never seen
        assert_eq!(test.tested_below, 2);
        assert!(!test.reached_bound());
        assert_eq!(test.verdict, Verdict::Congruent(Justification::Irreducible));
    }
}
