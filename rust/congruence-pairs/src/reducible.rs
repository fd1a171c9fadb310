//! Classification of groups with reducible mod-p image.
//!
//! A reducible representation has the shape (χ, *; 0, χ') after choosing a
//! basis adapted to the stable line. Two curves with the same
//! semisimplification χ ⊕ χ' can still differ in which character sits on the
//! diagonal first, and in the extension class *. The stages here:
//!
//! 1. saturate each group under isogeny;
//! 2. drop curves whose * vanishes (the representation is then split and
//!    carries no extension data);
//! 3. separate χ-first from χ'-first curves by their isogeny kernel fields;
//! 4. within each class, pair curves whose star fields are isomorphic.

use std::collections::{HashMap, HashSet};

use congruence_core::{first_primes, fricke_j_polynomial, Curve, CurveLabel, Mat2, NumberField};
use num_integer::Integer;
use serde::{Deserialize, Serialize};

use crate::backend::AlgebraBackend;
use crate::config::StarZeroConfig;
use crate::database::CurveDatabase;
use crate::error::{CongruenceError, Result};
use crate::hasher::CongruenceGroup;
use crate::report::CongruentPair;

// ---------------------------------------------------------------------------
// Saturation
// ---------------------------------------------------------------------------

/// Close each group under isogeny class membership.
///
/// Each member is followed by the rest of its class in database order, so a
/// second pass returns the same lists.
pub fn saturate(groups: &[CongruenceGroup], db: &dyn CurveDatabase) -> Result<Vec<CongruenceGroup>> {
    groups
        .iter()
        .map(|group| {
            let mut seen = HashSet::new();
            let mut saturated = Vec::new();
            for label in group {
                if seen.insert(label.clone()) {
                    saturated.push(label.clone());
                }
                for member in db.isogeny_class(label)?.labels() {
                    if seen.insert(member.clone()) {
                        saturated.push(member.clone());
                    }
                }
            }
            Ok(saturated)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Star-zero filter
// ---------------------------------------------------------------------------

/// Whether some Frobenius among the first `prime_count` primes (skipping p
/// and the bad primes) has order divisible by p in GL_2(F_p).
///
/// Such an element is not semisimple, so * is nonzero. `false` is
/// inconclusive.
pub fn star_is_nonzero_heuristic(
    p: u64,
    curve: &Curve,
    prime_count: usize,
    backend: &dyn AlgebraBackend,
) -> Result<bool> {
    let primes: Vec<u64> = first_primes(prime_count)
        .into_iter()
        .filter(|&q| q != p && curve.reduction_at(q).is_none())
        .collect();
    let matrices = backend.integral_frobenius(curve, &primes)?;
    Ok(matrices.into_iter().any(|m| {
        Mat2::from_integral(m, p)
            .order()
            .is_some_and(|order| order % p == 0)
    }))
}

/// * is zero iff the p-torsion field has degree prime to p.
pub fn star_is_zero_exact(p: u64, curve: &Curve, backend: &dyn AlgebraBackend) -> Result<bool> {
    Ok(backend.torsion_field_degree(curve, p)? % p != 0)
}

/// Star-zero classification of one saturated group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarFilter {
    /// Curves with * nonzero, in group order.
    pub survivors: Vec<CurveLabel>,
    /// Heuristic inconclusive, exact test found * = 0.
    pub confirmed_zero: Vec<CurveLabel>,
    /// Heuristic inconclusive and no exact test run.
    pub unresolved: Vec<CurveLabel>,
    /// Every curve the heuristic could not resolve.
    pub possible_zeros: Vec<CurveLabel>,
}

pub fn filter_star_zero(
    groups: &[CongruenceGroup],
    p: u64,
    db: &dyn CurveDatabase,
    backend: &dyn AlgebraBackend,
    config: &StarZeroConfig,
) -> Result<Vec<StarFilter>> {
    groups
        .iter()
        .map(|group| filter_group(group, p, db, backend, config))
        .collect()
}

fn filter_group(
    group: &CongruenceGroup,
    p: u64,
    db: &dyn CurveDatabase,
    backend: &dyn AlgebraBackend,
    config: &StarZeroConfig,
) -> Result<StarFilter> {
    let mut nonzero: HashSet<&CurveLabel> = HashSet::new();
    let mut pending: Vec<&CurveLabel> = group.iter().collect();
    let mut prime_count = config.start_prime_count;
    loop {
        let mut still_pending = Vec::new();
        for label in pending {
            if star_is_nonzero_heuristic(p, db.curve(label)?, prime_count, backend)? {
                nonzero.insert(label);
            } else {
                still_pending.push(label);
            }
        }
        pending = still_pending;
        prime_count *= 2;
        if pending.is_empty() || prime_count >= config.prime_count_cap {
            break;
        }
    }

    let mut filter = StarFilter {
        possible_zeros: pending.iter().map(|&l| l.clone()).collect(),
        ..Default::default()
    };
    for label in pending {
        if !config.exact_fallback {
            log::warn!(
                "Star of {} may be zero: heuristic inconclusive at {} primes and exact test disabled",
                label,
                config.prime_count_cap
            );
            filter.unresolved.push(label.clone());
        } else if star_is_zero_exact(p, db.curve(label)?, backend)? {
            log::info!("Star of {} is really zero", label);
            filter.confirmed_zero.push(label.clone());
        } else {
            log::info!("Star of {} is not really zero", label);
            nonzero.insert(label);
        }
    }
    filter.survivors = group
        .iter()
        .filter(|l| nonzero.contains(l))
        .cloned()
        .collect();
    Ok(filter)
}

// ---------------------------------------------------------------------------
// Field cache
// ---------------------------------------------------------------------------

/// Kernel and star fields computed during one pass.
#[derive(Debug, Default)]
pub struct FieldCache {
    kernel: HashMap<CurveLabel, NumberField>,
    star: HashMap<CurveLabel, NumberField>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernel_field(
        &mut self,
        curve: &Curve,
        p: u64,
        optimize: bool,
        backend: &dyn AlgebraBackend,
    ) -> Result<NumberField> {
        if let Some(field) = self.kernel.get(&curve.label) {
            return Ok(field.clone());
        }
        let field = kernel_field(curve, p, optimize, backend)?;
        self.kernel.insert(curve.label.clone(), field.clone());
        Ok(field)
    }

    pub fn star_field(
        &mut self,
        curve: &Curve,
        p: u64,
        optimize: bool,
        backend: &dyn AlgebraBackend,
    ) -> Result<NumberField> {
        if let Some(field) = self.star.get(&curve.label) {
            return Ok(field.clone());
        }
        let field = star_field(curve, p, optimize, backend)?;
        self.star.insert(curve.label.clone(), field.clone());
        Ok(field)
    }
}

// ---------------------------------------------------------------------------
// Kernel fields
// ---------------------------------------------------------------------------

/// Field of definition of a kernel generator of the first rational p-isogeny.
pub fn kernel_field(
    curve: &Curve,
    p: u64,
    optimize: bool,
    backend: &dyn AlgebraBackend,
) -> Result<NumberField> {
    let isogeny = backend
        .prime_isogenies(curve, p)?
        .into_iter()
        .next()
        .ok_or_else(|| CongruenceError::MissingIsogeny {
            curve: curve.label.clone(),
            p,
        })?;
    let field = backend.isogeny_kernel_field(curve, &isogeny)?;
    if optimize {
        Ok(backend.optimized_field(&field)?)
    } else {
        Ok(field)
    }
}

/// Survivors split by whether their kernel field matches the first curve's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelPartition {
    pub chi: Vec<CurveLabel>,
    pub chi_prime: Vec<CurveLabel>,
}

pub fn partition_by_kernel_field(
    survivors: &[CurveLabel],
    p: u64,
    optimize: bool,
    db: &dyn CurveDatabase,
    backend: &dyn AlgebraBackend,
    cache: &mut FieldCache,
) -> Result<KernelPartition> {
    let mut partition = KernelPartition::default();
    let Some((first, rest)) = survivors.split_first() else {
        return Ok(partition);
    };
    let reference = cache.kernel_field(db.curve(first)?, p, optimize, backend)?;
    partition.chi.push(first.clone());
    for label in rest {
        let field = cache.kernel_field(db.curve(label)?, p, optimize, backend)?;
        if backend.fields_isomorphic(&field, &reference)? {
            partition.chi.push(label.clone());
        } else {
            partition.chi_prime.push(label.clone());
        }
    }
    log::debug!(
        "Kernel field classes of sizes {} and {}",
        partition.chi.len(),
        partition.chi_prime.len()
    );
    Ok(partition)
}

// ---------------------------------------------------------------------------
// Star fields
// ---------------------------------------------------------------------------

/// The degree-p field cut out by * : the first irreducible factor of degree p
/// of F_p(t) - t*j.
pub fn star_field(
    curve: &Curve,
    p: u64,
    optimize: bool,
    backend: &dyn AlgebraBackend,
) -> Result<NumberField> {
    let poly = fricke_j_polynomial(p, &curve.j_invariant())
        .ok_or(CongruenceError::UnsupportedPrime(p))?;
    let factor = backend
        .factor(&poly)?
        .into_iter()
        .map(|(f, _)| f)
        .find(|f| f.degree() == Some(p as usize))
        .ok_or_else(|| CongruenceError::MissingStarFactor {
            curve: curve.label.clone(),
            p,
        })?;
    let field = NumberField::new(factor);
    if optimize {
        Ok(backend.optimized_field(&field)?)
    } else {
        Ok(field)
    }
}

/// Bucket curves by star field isomorphism class and pair up each bucket,
/// leaving out pairs linked by an isogeny of degree prime to p.
pub fn pairs_with_same_star_field(
    curves: &[CurveLabel],
    p: u64,
    optimize: bool,
    db: &dyn CurveDatabase,
    backend: &dyn AlgebraBackend,
    cache: &mut FieldCache,
) -> Result<Vec<CongruentPair>> {
    let mut buckets: Vec<(NumberField, Vec<&CurveLabel>)> = Vec::new();
    for label in curves {
        let field = cache.star_field(db.curve(label)?, p, optimize, backend)?;
        let mut placed = false;
        for (representative, members) in buckets.iter_mut() {
            if backend.fields_isomorphic(representative, &field)? {
                members.push(label);
                placed = true;
                break;
            }
        }
        if !placed {
            buckets.push((field, vec![label]));
        }
    }

    let mut pairs = Vec::new();
    for (_, members) in buckets.iter().filter(|(_, m)| m.len() >= 2) {
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if let Some(degree) = db.isogeny_degree(a, b)? {
                    if degree.gcd(&p) == 1 {
                        log::debug!("Skipping {} and {}: {}-isogenous", a, b, degree);
                        continue;
                    }
                }
                pairs.push(CongruentPair::new((*a).clone(), (*b).clone(), "star field"));
            }
        }
    }
    Ok(pairs)
}

/// Star field pairs of every kernel class of every group, in group order.
pub fn reducible_pairs(
    partitions: &[KernelPartition],
    p: u64,
    optimize: bool,
    db: &dyn CurveDatabase,
    backend: &dyn AlgebraBackend,
) -> Result<Vec<CongruentPair>> {
    let mut cache = FieldCache::new();
    let mut pairs = Vec::new();
    for partition in partitions {
        pairs.extend(pairs_with_same_star_field(
            &partition.chi,
            p,
            optimize,
            db,
            backend,
            &mut cache,
        )?);
        pairs.extend(pairs_with_same_star_field(
            &partition.chi_prime,
            p,
            optimize,
            db,
            backend,
            &mut cache,
        )?);
    }
    log::info!("{} reducible pairs", pairs.len());
    Ok(pairs)
}
