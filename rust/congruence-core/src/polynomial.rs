//! Univariate polynomials over Q and the number fields they define.
//!
//! The Fricke polynomial F_l of a prime l with X_0(l) of genus zero satisfies
//! j = F_l(t) / t on X_0(l). A curve with j-invariant j has a rational
//! l-isogeny iff F_l(t) - j*t has a rational root, and for reducible mod-l
//! representations the degree-l factor of the same polynomial cuts out the
//! "star" field.

use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};

/// Polynomial with rational coefficients, lowest degree first, no trailing zeros.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polynomial {
    coeffs: Vec<BigRational>,
}

impl Polynomial {
    pub fn new(mut coeffs: Vec<BigRational>) -> Self {
        while coeffs.last().is_some_and(|c| c.is_zero()) {
            coeffs.pop();
        }
        Polynomial { coeffs }
    }

    pub fn from_integers(coeffs: &[i64]) -> Self {
        Polynomial::new(
            coeffs
                .iter()
                .map(|&c| BigRational::from_integer(BigInt::from(c)))
                .collect(),
        )
    }

    /// Parse coefficients written as integers or fractions `a/b`.
    pub fn from_coefficient_strings<S: AsRef<str>>(coeffs: &[S]) -> Option<Self> {
        coeffs
            .iter()
            .map(|c| c.as_ref().trim().parse::<BigRational>().ok())
            .collect::<Option<Vec<_>>>()
            .map(Polynomial::new)
    }

    pub fn zero() -> Self {
        Polynomial { coeffs: Vec::new() }
    }

    /// The monomial x.
    pub fn x() -> Self {
        Polynomial::from_integers(&[0, 1])
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Degree, `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    pub fn coefficients(&self) -> &[BigRational] {
        &self.coeffs
    }

    pub fn coefficient_strings(&self) -> Vec<String> {
        self.coeffs.iter().map(|c| c.to_string()).collect()
    }

    pub fn leading_coefficient(&self) -> Option<&BigRational> {
        self.coeffs.last()
    }

    pub fn add(&self, other: &Polynomial) -> Polynomial {
        let n = self.coeffs.len().max(other.coeffs.len());
        let zero = BigRational::zero();
        Polynomial::new(
            (0..n)
                .map(|i| {
                    self.coeffs.get(i).unwrap_or(&zero) + other.coeffs.get(i).unwrap_or(&zero)
                })
                .collect(),
        )
    }

    pub fn sub(&self, other: &Polynomial) -> Polynomial {
        self.add(&other.scale(&-BigRational::one()))
    }

    pub fn scale(&self, factor: &BigRational) -> Polynomial {
        Polynomial::new(self.coeffs.iter().map(|c| c * factor).collect())
    }

    pub fn mul(&self, other: &Polynomial) -> Polynomial {
        if self.is_zero() || other.is_zero() {
            return Polynomial::zero();
        }
        let mut coeffs = vec![BigRational::zero(); self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                coeffs[i + j] += a * b;
            }
        }
        Polynomial::new(coeffs)
    }

    pub fn pow(&self, exp: u32) -> Polynomial {
        let mut result = Polynomial::from_integers(&[1]);
        for _ in 0..exp {
            result = result.mul(self);
        }
        result
    }

    /// Evaluate by Horner's rule.
    pub fn eval(&self, x: &BigRational) -> BigRational {
        self.coeffs
            .iter()
            .rev()
            .fold(BigRational::zero(), |acc, c| acc * x + c)
    }

    /// Scale to the monic polynomial with the same roots.
    pub fn monic(&self) -> Polynomial {
        match self.leading_coefficient() {
            Some(lead) => self.scale(&lead.recip()),
            None => Polynomial::zero(),
        }
    }
}

impl fmt::Display for Polynomial {
    /// Sage/Magma syntax in the variable x, highest degree first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let mut first = true;
        for (k, c) in self.coeffs.iter().enumerate().rev() {
            if c.is_zero() {
                continue;
            }
            let magnitude = c.abs();
            if first {
                if c.is_negative() {
                    write!(f, "-")?;
                }
            } else if c.is_negative() {
                write!(f, " - ")?;
            } else {
                write!(f, " + ")?;
            }
            first = false;

            let monomial = match k {
                0 => String::new(),
                1 => "x".to_string(),
                _ => format!("x^{}", k),
            };
            if monomial.is_empty() {
                write!(f, "{}", magnitude)?;
            } else if magnitude.is_one() {
                write!(f, "{}", monomial)?;
            } else {
                write!(f, "{}*{}", magnitude, monomial)?;
            }
        }
        Ok(())
    }
}

/// The number field Q[x]/(f) of an irreducible polynomial f.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberField {
    pub polynomial: Polynomial,
}

impl NumberField {
    pub fn new(polynomial: Polynomial) -> Self {
        NumberField { polynomial }
    }

    pub fn degree(&self) -> usize {
        self.polynomial.degree().unwrap_or(0)
    }
}

impl fmt::Display for NumberField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q[x]/({})", self.polynomial)
    }
}

/// Fricke polynomial F_l for l in {2, 3, 5, 7, 13}.
pub fn fricke_polynomial(l: u64) -> Option<Polynomial> {
    let p = Polynomial::from_integers;
    let poly = match l {
        2 => p(&[16, 1]).pow(3),
        3 => p(&[27, 1]).mul(&p(&[3, 1]).pow(3)),
        5 => p(&[5, 10, 1]).pow(3),
        7 => p(&[49, 13, 1]).mul(&p(&[1, 5, 1]).pow(3)),
        13 => p(&[13, 5, 1]).mul(&p(&[1, 19, 20, 7, 1]).pow(3)),
        _ => return None,
    };
    Some(poly)
}

/// F_l(x) - j*x.
pub fn fricke_j_polynomial(l: u64, j: &BigRational) -> Option<Polynomial> {
    let fricke = fricke_polynomial(l)?;
    Some(fricke.sub(&Polynomial::x().scale(j)))
}
