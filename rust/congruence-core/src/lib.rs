//! Shared types and arithmetic for the mod-p congruence search.
//!
//! Curve records with their labels and local data, Frobenius traces by point
//! counting, polynomials over Q (including the Fricke polynomials of the genus
//! zero modular curves X_0(l)), and 2x2 matrices over F_p.

pub mod curve;
pub mod frobenius;
pub mod gl2;
pub mod polynomial;

pub use curve::{Curve, CurveError, CurveLabel, LocalData, ReductionType};
pub use gl2::Mat2;
pub use polynomial::{fricke_j_polynomial, fricke_polynomial, NumberField, Polynomial};

// Re-export the big number types used throughout the public API
pub use num_bigint::{BigInt, BigUint};
pub use num_rational::BigRational;

/// Modular multiplication without overflow: a * b mod m.
#[inline]
pub fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

/// Modular exponentiation: base^exp mod m.
pub fn pow_mod(base: u64, mut exp: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let mut result = 1u64;
    let mut b = base % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, b, m);
        }
        b = mul_mod(b, b, m);
        exp >>= 1;
    }
    result
}

/// Inverse of `a` modulo the prime `p` (Fermat). Returns 0 when p | a.
pub fn inv_mod(a: u64, p: u64) -> u64 {
    pow_mod(a, p - 2, p)
}

/// Legendre symbol (a / p) for an odd prime p, via Euler's criterion.
pub fn legendre(a: u64, p: u64) -> i64 {
    let a = a % p;
    if a == 0 {
        return 0;
    }
    if pow_mod(a, (p - 1) / 2, p) == 1 {
        1
    } else {
        -1
    }
}

/// Deterministic Miller-Rabin for 64-bit integers.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    const SMALL: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    for &p in &SMALL {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut r = 0u32;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    'witness: for &a in &SMALL {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue 'witness;
        }
        for _ in 1..r {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime strictly greater than `n`.
pub fn next_prime(n: u64) -> u64 {
    let mut candidate = n + 1;
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// The first `count` primes strictly greater than `start`.
pub fn primes_after(start: u64, count: usize) -> Vec<u64> {
    let mut primes = Vec::with_capacity(count);
    let mut last = start;
    while primes.len() < count {
        last = next_prime(last);
        primes.push(last);
    }
    primes
}

/// Generate all primes up to `limit` (inclusive) using the Sieve of Eratosthenes.
pub fn sieve_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return Vec::new();
    }
    let size = (limit + 1) as usize;
    let mut is_prime = vec![true; size];
    is_prime[0] = false;
    is_prime[1] = false;
    let mut i = 2usize;
    while i * i < size {
        if is_prime[i] {
            let mut j = i * i;
            while j < size {
                is_prime[j] = false;
                j += i;
            }
        }
        i += 1;
    }
    is_prime
        .iter()
        .enumerate()
        .filter(|(_, &p)| p)
        .map(|(i, _)| i as u64)
        .collect()
}

/// All primes strictly below `bound`.
pub fn primes_below(bound: u64) -> Vec<u64> {
    if bound < 3 {
        return Vec::new();
    }
    sieve_primes(bound - 1)
}

/// The first `count` primes.
pub fn first_primes(count: usize) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    // p_n < n (ln n + ln ln n) for n >= 6
    let n = count.max(6) as f64;
    let bound = (n * (n.ln() + n.ln().ln())).ceil() as u64 + 1;
    let mut primes = sieve_primes(bound);
    primes.truncate(count);
    primes
}

/// Factor a machine-sized integer by trial division.
///
/// Returns (prime, exponent) pairs in increasing order of the prime.
pub fn factor_u64(n: u64) -> Vec<(u64, u32)> {
    let mut factors = Vec::new();
    let mut remaining = n;
    if remaining < 2 {
        return factors;
    }

    let mut divisor = 2u64;
    while divisor * divisor <= remaining {
        if remaining % divisor == 0 {
            let mut e = 0u32;
            while remaining % divisor == 0 {
                remaining /= divisor;
                e += 1;
            }
            factors.push((divisor, e));
        }
        divisor += if divisor == 2 { 1 } else { 2 };
    }
    if remaining > 1 {
        factors.push((remaining, 1));
    }
    factors
}

/// Integer square root (floor).
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    while x * x > n {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}
