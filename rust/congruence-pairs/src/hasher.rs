//! Frobenius fingerprints and congruence candidate groups.
//!
//! Two curves with congruent mod-p representations have a_q = a'_q mod p at
//! every good prime q. The fingerprint packs (a_q mod p) for a fixed list of
//! sample primes into one base-p integer; curves sharing a fingerprint are
//! congruence candidates. Collisions between non-congruent curves are
//! possible and are weeded out by the later exact tests.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use congruence_core::{primes_after, BigUint, Curve, CurveLabel};
use num_traits::Zero;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::CurveDatabase;

/// Curve labels sharing a fingerprint, in discovery order.
pub type CongruenceGroup = Vec<CurveLabel>;

/// The first `count` primes strictly greater than `start_after`.
pub fn sample_primes(start_after: u64, count: usize) -> Vec<u64> {
    primes_after(start_after, count)
}

/// sum_i (a_{q_i}(E) mod p) * p^i over the sample primes q_i != p.
pub fn frobenius_hash(p: u64, curve: &Curve, primes: &[u64]) -> BigUint {
    primes
        .iter()
        .filter(|&&q| q != p)
        .rev()
        .fold(BigUint::zero(), |acc, &q| {
            let residue = curve.ap(q).rem_euclid(p as i64) as u64;
            acc * p + residue
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashBucket {
    pub hash: BigUint,
    pub curves: Vec<CurveLabel>,
}

/// Fingerprint buckets of the optimal curves in a conductor range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashTable {
    pub p: u64,
    pub sample_primes: Vec<u64>,
    pub min_conductor: u64,
    pub max_conductor: u64,
    /// Buckets in order of first discovery.
    pub buckets: Vec<HashBucket>,
}

impl HashTable {
    /// Whether this table was built with the given parameters.
    pub fn matches(&self, p: u64, sample_primes: &[u64], conductors: &RangeInclusive<u64>) -> bool {
        self.p == p
            && self.sample_primes == sample_primes
            && self.min_conductor == *conductors.start()
            && self.max_conductor == *conductors.end()
    }

    /// Buckets with at least two curves.
    pub fn congruence_groups(&self) -> Vec<CongruenceGroup> {
        self.buckets
            .iter()
            .filter(|b| b.curves.len() > 1)
            .map(|b| b.curves.clone())
            .collect()
    }

    /// Drop singleton buckets; they never produce pairs.
    pub fn without_singletons(mut self) -> Self {
        self.buckets.retain(|b| b.curves.len() > 1);
        self
    }
}

/// Hash the optimal curve of every isogeny class with conductor in range.
///
/// Hashing runs in parallel; buckets are filled in database order so the
/// result does not depend on scheduling.
pub fn build_hash_table(
    p: u64,
    db: &dyn CurveDatabase,
    conductors: RangeInclusive<u64>,
    primes: &[u64],
) -> HashTable {
    let classes = db.isogeny_classes(conductors.clone());
    log::info!(
        "Hashing {} isogeny classes with conductor in {}..={} at {} primes",
        classes.len(),
        conductors.start(),
        conductors.end(),
        primes.len()
    );

    let hashes: Vec<(CurveLabel, BigUint)> = classes
        .par_iter()
        .map(|class| {
            let curve = class.optimal();
            (curve.label.clone(), frobenius_hash(p, curve, primes))
        })
        .collect();

    let mut index: HashMap<BigUint, usize> = HashMap::new();
    let mut buckets: Vec<HashBucket> = Vec::new();
    for (label, hash) in hashes {
        match index.get(&hash) {
            Some(&i) => buckets[i].curves.push(label),
            None => {
                index.insert(hash.clone(), buckets.len());
                buckets.push(HashBucket {
                    hash,
                    curves: vec![label],
                });
            }
        }
    }

    let table = HashTable {
        p,
        sample_primes: primes.to_vec(),
        min_conductor: *conductors.start(),
        max_conductor: *conductors.end(),
        buckets,
    };
    log::info!(
        "{} sets of congruent candidates",
        table.congruence_groups().len()
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{IsogenyClass, MemoryDatabase};
    use crate::testing::{fixture_curve, fixture_database, label};

    #[test]
    fn test_sample_primes() {
        let primes = sample_primes(400_000, 20);
        assert_eq!(primes.len(), 20);
        assert_eq!(primes[0], 400_009);
        assert!(primes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_frobenius_hash_11a1() {
        // traces 1175, 57, -486, -348, 28, -230, -682, -506 reduce to
        // 0, 2, 4, 2, 3, 0, 3, 4 mod 5
        let primes = sample_primes(400_000, 8);
        let hash = frobenius_hash(5, &fixture_curve("11a1"), &primes);
        assert_eq!(hash, BigUint::from(361_610u32));
    }

    #[test]
    fn test_isogenous_curves_share_hash() {
        let primes = sample_primes(400_000, 20);
        let h1 = frobenius_hash(5, &fixture_curve("11a1"), &primes);
        let h2 = frobenius_hash(5, &fixture_curve("11a2"), &primes);
        let h3 = frobenius_hash(5, &fixture_curve("11a3"), &primes);
        assert_eq!(h1, h2);
        assert_eq!(h1, h3);
        assert_ne!(h1, frobenius_hash(5, &fixture_curve("37a1"), &primes));
    }

    #[test]
    fn test_build_hash_table_uses_optimal_curves() {
        let db = fixture_database();
        let primes = sample_primes(400_000, 20);
        let table = build_hash_table(5, &db, 1..=100, &primes);
        assert_eq!(table.buckets.len(), 2);
        assert_eq!(table.buckets[0].curves, vec![label("11a1")]);
        assert!(table.congruence_groups().is_empty());
        assert!(table.matches(5, &primes, &(1..=100)));
        assert!(!table.matches(5, &primes[..10], &(1..=100)));
        assert!(!table.matches(5, &primes, &(11..=100)));
    }

    #[test]
    fn test_groups_in_discovery_order() {
        // 11a3 stored as the optimal curve of its own class collides with 11a1
        let classes = vec![
            IsogenyClass::new("11a", vec![fixture_curve("11a1")], vec![vec![1]]).unwrap(),
            IsogenyClass::new("37a", vec![fixture_curve("37a1")], vec![vec![1]]).unwrap(),
            IsogenyClass::new("11b", vec![fixture_curve("11a3")], vec![vec![1]]).unwrap(),
        ];
        let db = MemoryDatabase::from_classes(classes).unwrap();
        let table = build_hash_table(5, &db, 11..=37, &sample_primes(400_000, 20));
        assert_eq!(
            table.congruence_groups(),
            vec![vec![label("11a1"), label("11a3")]]
        );
        let pruned = table.without_singletons();
        assert_eq!(pruned.buckets.len(), 1);
    }
}
