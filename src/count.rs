//! Arbitrary-precision counts with a machine-word fast path.
//!
//! String counts, permutation counts, and guess ranks routinely exceed 64
//! bits. [`BigCount`] keeps values in a `u64` until an operation would
//! overflow, then promotes to [`BigUint`]. Values demote again after division
//! so the fast path stays hot.

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::cmp::Ordering;
use std::fmt;

/// Factorials that fit in a `u64`; `21!` overflows.
pub const FACTORIALS: [u64; 21] = [
    1,
    1,
    2,
    6,
    24,
    120,
    720,
    5_040,
    40_320,
    362_880,
    3_628_800,
    39_916_800,
    479_001_600,
    6_227_020_800,
    87_178_291_200,
    1_307_674_368_000,
    20_922_789_888_000,
    355_687_428_096_000,
    6_402_373_705_728_000,
    121_645_100_408_832_000,
    2_432_902_008_176_640_000,
];

/// A non-negative integer count, promoted to arbitrary precision on demand.
#[derive(Clone, Debug)]
pub enum BigCount {
    Small(u64),
    Big(BigUint),
}

impl BigCount {
    pub fn zero() -> Self {
        BigCount::Small(0)
    }

    pub fn one() -> Self {
        BigCount::Small(1)
    }

    /// `n!`, from the table when it fits in a word.
    pub fn factorial(n: u64) -> Self {
        if n < FACTORIALS.len() as u64 {
            return BigCount::Small(FACTORIALS[n as usize]);
        }
        let mut result = BigUint::from(FACTORIALS[FACTORIALS.len() - 1]);
        for k in FACTORIALS.len() as u64..=n {
            result *= k;
        }
        BigCount::Big(result)
    }

    /// Add a word-sized value in place.
    pub fn add_u64(&mut self, rhs: u64) {
        match self {
            BigCount::Small(v) => match v.checked_add(rhs) {
                Some(sum) => *v = sum,
                None => *self = BigCount::Big(BigUint::from(*v) + rhs),
            },
            BigCount::Big(v) => *v += rhs,
        }
    }

    /// Multiply by a word-sized value in place.
    pub fn mul_u64(&mut self, rhs: u64) {
        match self {
            BigCount::Small(v) => match v.checked_mul(rhs) {
                Some(product) => *v = product,
                None => *self = BigCount::Big(BigUint::from(*v) * rhs),
            },
            BigCount::Big(v) => *v *= rhs,
        }
    }

    /// Integer division by a word-sized value in place. Callers in the
    /// permutation math rely on the division being exact.
    pub fn div_u64(&mut self, rhs: u64) {
        match self {
            BigCount::Small(v) => *v /= rhs,
            BigCount::Big(v) => {
                *v /= rhs;
                self.demote();
            }
        }
    }

    /// Integer division by another count in place. Callers in the
    /// permutation math rely on the division being exact.
    pub fn div_assign(&mut self, rhs: &BigCount) {
        match rhs {
            BigCount::Small(r) => self.div_u64(*r),
            BigCount::Big(r) => {
                let quotient = self.to_biguint() / r;
                *self = BigCount::from(quotient);
            }
        }
    }

    /// Add another count in place.
    pub fn add_assign(&mut self, rhs: &BigCount) {
        match rhs {
            BigCount::Small(r) => self.add_u64(*r),
            BigCount::Big(r) => {
                let sum = self.to_biguint() + r;
                *self = BigCount::from(sum);
            }
        }
    }

    /// Multiply by another count in place.
    pub fn mul_assign(&mut self, rhs: &BigCount) {
        match rhs {
            BigCount::Small(r) => self.mul_u64(*r),
            BigCount::Big(r) => {
                let product = self.to_biguint() * r;
                *self = BigCount::from(product);
            }
        }
    }

    pub fn to_biguint(&self) -> BigUint {
        match self {
            BigCount::Small(v) => BigUint::from(*v),
            BigCount::Big(v) => v.clone(),
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        match self {
            BigCount::Small(v) => Some(*v),
            BigCount::Big(v) => v.to_u64(),
        }
    }

    /// Lossy conversion for probability arithmetic.
    pub fn to_f64(&self) -> f64 {
        match self {
            BigCount::Small(v) => *v as f64,
            BigCount::Big(v) => v.to_f64().unwrap_or(f64::INFINITY),
        }
    }

    fn demote(&mut self) {
        if let BigCount::Big(v) = self {
            if let Some(small) = v.to_u64() {
                *self = BigCount::Small(small);
            }
        }
    }
}

impl From<u64> for BigCount {
    fn from(v: u64) -> Self {
        BigCount::Small(v)
    }
}

impl From<BigUint> for BigCount {
    fn from(v: BigUint) -> Self {
        match v.to_u64() {
            Some(small) => BigCount::Small(small),
            None => BigCount::Big(v),
        }
    }
}

impl PartialEq for BigCount {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BigCount {}

impl PartialOrd for BigCount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigCount {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BigCount::Small(a), BigCount::Small(b)) => a.cmp(b),
            // A promoted value is always larger than a word: demotion keeps
            // every Big variant above u64::MAX.
            (BigCount::Big(_), BigCount::Small(_)) => Ordering::Greater,
            (BigCount::Small(_), BigCount::Big(_)) => Ordering::Less,
            (BigCount::Big(a), BigCount::Big(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for BigCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BigCount::Small(v) => write!(f, "{}", v),
            BigCount::Big(v) => write!(f, "{}", v),
        }
    }
}
