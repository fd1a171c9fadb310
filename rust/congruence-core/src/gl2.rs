//! 2x2 matrices over F_p.

use serde::{Deserialize, Serialize};

use crate::mul_mod;

/// Matrix [[a, b], [c, d]] with entries reduced mod p.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mat2 {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
    pub p: u64,
}

impl Mat2 {
    /// Reduce an integral matrix (row major) modulo p.
    pub fn from_integral(entries: [i64; 4], p: u64) -> Self {
        let r = |v: i64| v.rem_euclid(p as i64) as u64;
        Mat2 {
            a: r(entries[0]),
            b: r(entries[1]),
            c: r(entries[2]),
            d: r(entries[3]),
            p,
        }
    }

    pub fn identity(p: u64) -> Self {
        Mat2 {
            a: 1,
            b: 0,
            c: 0,
            d: 1,
            p,
        }
    }

    pub fn mul(&self, other: &Mat2) -> Mat2 {
        let p = self.p;
        Mat2 {
            a: (mul_mod(self.a, other.a, p) + mul_mod(self.b, other.c, p)) % p,
            b: (mul_mod(self.a, other.b, p) + mul_mod(self.b, other.d, p)) % p,
            c: (mul_mod(self.c, other.a, p) + mul_mod(self.d, other.c, p)) % p,
            d: (mul_mod(self.c, other.b, p) + mul_mod(self.d, other.d, p)) % p,
            p,
        }
    }

    pub fn determinant(&self) -> u64 {
        let p = self.p;
        (mul_mod(self.a, self.d, p) + p - mul_mod(self.b, self.c, p)) % p
    }

    pub fn trace(&self) -> u64 {
        (self.a + self.d) % self.p
    }

    /// Order in GL_2(F_p), or `None` for a singular matrix.
    ///
    /// Every element order divides |GL_2(F_p)| = (p^2 - 1)(p^2 - p), so the
    /// walk terminates.
    pub fn order(&self) -> Option<u64> {
        if self.determinant() == 0 {
            return None;
        }
        let identity = Mat2::identity(self.p);
        let mut power = *self;
        let mut order = 1u64;
        while power != identity {
            power = power.mul(self);
            order += 1;
        }
        Some(order)
    }
}
