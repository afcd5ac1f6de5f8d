//! 64-bit state fingerprints.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A fingerprint is a 64-bit hash identifying a state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Hash any value with fixed-key AHash, stable within a build.
    pub fn of<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = ahash::AHasher::default();
        value.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }

    /// Fold another fingerprint into this one.
    #[inline]
    pub fn combine(self, other: Fingerprint) -> Self {
        Fingerprint((self.0 ^ 0x2d358dccaa6c78a5).wrapping_mul(0x9e3779b97f4a7c15) ^ other.0)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_u64(v: u64) -> Self {
        Fingerprint(v)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = Fingerprint::of(&(1u32, "x", vec![3i64, 4]));
        let b = Fingerprint::of(&(1u32, "x", vec![3i64, 4]));
        let c = Fingerprint::of(&(1u32, "x", vec![4i64, 3]));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.combine(c), c.combine(a));
        assert_eq!(format!("{}", Fingerprint::from_u64(255)), "00000000000000ff");
    }
}
