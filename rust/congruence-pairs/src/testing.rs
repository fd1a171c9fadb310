//! Fixtures shared by the unit tests: a few curves of conductor 11 and 37 and
//! an in-memory algebra backend answering from tables.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use congruence_core::{
    fricke_j_polynomial, BigInt, Curve, CurveLabel, LocalData, NumberField, Polynomial,
    ReductionType,
};

use crate::backend::{AlgebraBackend, Isogeny};
use crate::database::{IsogenyClass, MemoryDatabase};
use crate::error::BackendError;

pub fn label(s: &str) -> CurveLabel {
    CurveLabel::cremona(s)
}

pub fn curve(name: &str, ainvs: [i64; 5], local: &[(u64, u32, ReductionType)]) -> Curve {
    Curve::new(
        label(name),
        ainvs.map(BigInt::from),
        local
            .iter()
            .map(|&(prime, exponent, reduction)| LocalData {
                prime,
                exponent,
                reduction,
            })
            .collect(),
    )
    .unwrap()
}

pub fn fixture_curve(name: &str) -> Curve {
    use ReductionType::*;
    match name {
        "11a1" => curve(name, [0, -1, 1, -10, -20], &[(11, 1, SplitMultiplicative)]),
        "11a2" => curve(name, [0, -1, 1, -7820, -263580], &[(11, 1, SplitMultiplicative)]),
        "11a3" => curve(name, [0, -1, 1, 0, 0], &[(11, 1, SplitMultiplicative)]),
        "37a1" => curve(name, [0, 0, 1, -1, 0], &[(37, 1, NonSplitMultiplicative)]),
        _ => panic!("no fixture curve {}", name),
    }
}

/// Classes 11a (three curves linked by 5-isogenies) and 37a.
pub fn fixture_database() -> MemoryDatabase {
    let class_11a = IsogenyClass::new(
        "11a",
        vec![
            fixture_curve("11a1"),
            fixture_curve("11a2"),
            fixture_curve("11a3"),
        ],
        vec![vec![1, 5, 5], vec![5, 1, 25], vec![5, 25, 1]],
    )
    .unwrap();
    let class_37a =
        IsogenyClass::new("37a", vec![fixture_curve("37a1")], vec![vec![1]]).unwrap();
    MemoryDatabase::from_classes(vec![class_11a, class_37a]).unwrap()
}

/// A field given by an integer polynomial, low degree first.
pub fn field(coeffs: &[i64]) -> NumberField {
    NumberField::new(Polynomial::from_integers(coeffs))
}

/// Backend answering from tables keyed by curve label.
///
/// Unregistered curves have no isogenies, image type "Borel", a Frobenius
/// matrix of order divisible by p and a torsion field of degree p - 1.
/// Polynomials factor as themselves unless registered. Fields are
/// isomorphic iff their monic defining polynomials agree.
#[derive(Default)]
pub struct FakeBackend {
    pub isogenies: HashMap<String, Vec<Isogeny>>,
    pub kernel_fields: HashMap<String, NumberField>,
    pub image_types: HashMap<String, String>,
    pub frobenius: HashMap<String, [i64; 4]>,
    pub torsion_degrees: HashMap<String, u64>,
    pub factorizations: HashMap<Polynomial, Vec<(Polynomial, u32)>>,
    pub frobenius_calls: AtomicUsize,
    pub isomorphism_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `curve` `count` distinct rational p-isogenies.
    pub fn with_isogenies(mut self, curve: &str, p: u64, count: usize) -> Self {
        let isogenies = (0..count)
            .map(|i| Isogeny {
                degree: p,
                kernel_polynomial: Polynomial::from_integers(&[i as i64, 1]),
            })
            .collect();
        self.isogenies.insert(curve.to_string(), isogenies);
        self
    }

    pub fn with_kernel_field(mut self, curve: &str, field: NumberField) -> Self {
        self.kernel_fields.insert(curve.to_string(), field);
        self
    }

    pub fn with_image_type(mut self, curve: &str, image: &str) -> Self {
        self.image_types.insert(curve.to_string(), image.to_string());
        self
    }

    /// Every Frobenius matrix of `curve` is `matrix`.
    pub fn with_frobenius(mut self, curve: &str, matrix: [i64; 4]) -> Self {
        self.frobenius.insert(curve.to_string(), matrix);
        self
    }

    pub fn with_torsion_degree(mut self, curve: &str, degree: u64) -> Self {
        self.torsion_degrees.insert(curve.to_string(), degree);
        self
    }

    /// Make F_p(t) - t*j(curve) factor as a linear factor times `star`.
    pub fn with_star_field(mut self, curve: &Curve, p: u64, star: &NumberField) -> Self {
        let poly = fricke_j_polynomial(p, &curve.j_invariant()).unwrap();
        let linear = Polynomial::from_integers(&[-1, 1]);
        self.factorizations
            .insert(poly, vec![(linear, 1), (star.polynomial.clone(), 1)]);
        self
    }

    /// Make F_p(t) - t*j(curve) factor without a factor of degree p.
    pub fn with_reducible_no_star(mut self, curve: &Curve, p: u64) -> Self {
        let poly = fricke_j_polynomial(p, &curve.j_invariant()).unwrap();
        let linear = Polynomial::from_integers(&[-1, 1]);
        self.factorizations.insert(poly, vec![(linear, 1)]);
        self
    }

    /// Mark the curve as having a rational p-isogeny (a linear factor).
    pub fn with_reducible(self, curve: &Curve, p: u64) -> Self {
        let star = field(&[1, 0, 0, 0, 0, 1]);
        self.with_star_field(curve, p, &star)
    }
}

impl AlgebraBackend for FakeBackend {
    fn factor(&self, poly: &Polynomial) -> Result<Vec<(Polynomial, u32)>, BackendError> {
        Ok(self
            .factorizations
            .get(poly)
            .cloned()
            .unwrap_or_else(|| vec![(poly.clone(), 1)]))
    }

    fn minimal_quadratic_twist(&self, curve: &Curve) -> Result<(Curve, i64), BackendError> {
        Ok((curve.clone(), 1))
    }

    fn quadratic_twist(&self, curve: &Curve, _d: i64) -> Result<Curve, BackendError> {
        Ok(curve.clone())
    }

    fn prime_isogenies(&self, curve: &Curve, _p: u64) -> Result<Vec<Isogeny>, BackendError> {
        Ok(self
            .isogenies
            .get(&curve.label.to_string())
            .cloned()
            .unwrap_or_default())
    }

    fn isogeny_kernel_field(
        &self,
        curve: &Curve,
        _isogeny: &Isogeny,
    ) -> Result<NumberField, BackendError> {
        self.kernel_fields
            .get(&curve.label.to_string())
            .cloned()
            .ok_or_else(|| BackendError::ExecutionFailed(format!("no kernel field for {}", curve.label)))
    }

    fn optimized_field(&self, field: &NumberField) -> Result<NumberField, BackendError> {
        Ok(NumberField::new(field.polynomial.monic()))
    }

    fn image_type(&self, curve: &Curve, _p: u64) -> Result<String, BackendError> {
        Ok(self
            .image_types
            .get(&curve.label.to_string())
            .cloned()
            .unwrap_or_else(|| "Borel".to_string()))
    }

    fn torsion_field_degree(&self, curve: &Curve, p: u64) -> Result<u64, BackendError> {
        Ok(self
            .torsion_degrees
            .get(&curve.label.to_string())
            .copied()
            .unwrap_or(p - 1))
    }

    fn integral_frobenius(
        &self,
        curve: &Curve,
        primes: &[u64],
    ) -> Result<Vec<[i64; 4]>, BackendError> {
        self.frobenius_calls.fetch_add(1, Ordering::SeqCst);
        let matrix = self
            .frobenius
            .get(&curve.label.to_string())
            .copied()
            .unwrap_or([1, 1, 0, 1]);
        Ok(vec![matrix; primes.len()])
    }

    fn fields_isomorphic(&self, a: &NumberField, b: &NumberField) -> Result<bool, BackendError> {
        self.isomorphism_calls.fetch_add(1, Ordering::SeqCst);
        Ok(a.polynomial.monic() == b.polynomial.monic())
    }
}
