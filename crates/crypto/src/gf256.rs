//! Arithmetic in GF(2^8) with the AES reduction polynomial x^8 + x^4 + x^3 + x + 1.
//!
//! Multiplication and inversion go through exp/log tables for the generator 3,
//! built at compile time.

use std::ops::{Add, Div, Mul, Sub};

const TABLES: ([u8; 256], [u8; 256]) = build_tables();
const EXP: [u8; 256] = TABLES.0;
const LOG: [u8; 256] = TABLES.1;

const fn build_tables() -> ([u8; 256], [u8; 256]) {
    let mut exp = [0u8; 256];
    let mut log = [0u8; 256];
    let mut x: u8 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x;
        log[x as usize] = i as u8;
        // x <- x * 3 = x ^ xtime(x)
        let mut doubled = x << 1;
        if x & 0x80 != 0 {
            doubled ^= 0x1b;
        }
        x ^= doubled;
        i += 1;
    }
    exp[255] = exp[0];
    (exp, log)
}

/// An element of GF(256).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GF256(pub u8);

impl GF256 {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);

    /// Multiplicative inverse, `None` for zero.
    pub fn invert(self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        let log = LOG[self.0 as usize] as usize;
        Some(Self(EXP[(255 - log) % 255]))
    }
}

impl From<u8> for GF256 {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl Add for GF256 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Sub for GF256 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Mul for GF256 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        if self.0 == 0 || rhs.0 == 0 {
            return Self::ZERO;
        }
        let log = LOG[self.0 as usize] as usize + LOG[rhs.0 as usize] as usize;
        Self(EXP[log % 255])
    }
}

impl Div for GF256 {
    type Output = Option<Self>;

    fn div(self, rhs: Self) -> Option<Self> {
        rhs.invert().map(|inv| self * inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_products() {
        // FIPS-197 section 4.2
        assert_eq!(GF256(0x57) * GF256(0x83), GF256(0xc1));
        assert_eq!(GF256(0x57) * GF256(0x13), GF256(0xfe));
        // 0x53 and 0xca are inverses
        assert_eq!(GF256(0x53) * GF256(0xca), GF256::ONE);
    }

    #[test]
    fn test_every_nonzero_element_has_inverse() {
        for a in 1..=255u8 {
            let inv = GF256(a).invert().unwrap();
            assert_eq!(GF256(a) * inv, GF256::ONE, "a = {a}");
        }
        assert_eq!(GF256::ZERO.invert(), None);
    }

    #[test]
    fn test_division_and_characteristic_two() {
        let a = GF256(0x9d);
        let b = GF256(0x4e);
        assert_eq!((a * b / b).unwrap(), a);
        assert_eq!(a + a, GF256::ZERO);
        assert_eq!(a - b, a + b);
        assert_eq!(a / GF256::ZERO, None);
    }
}
