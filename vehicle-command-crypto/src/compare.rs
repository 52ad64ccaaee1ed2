//! Constant-time comparison for authentication tags (spec §4.B, invariant 2).
//!
//! Tags must never be compared with `==`: a timing side channel on tag
//! comparison would let an attacker forge authenticated commands one byte at
//! a time.

use subtle::ConstantTimeEq;

/// Returns `true` if `a` and `b` are equal, in time independent of where they
/// first differ. Unequal lengths short-circuit (also in constant time with
/// respect to content, since length is not secret).
pub fn tags_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tags_compare_equal() {
        assert!(tags_equal(&[1, 2, 3], &[1, 2, 3]));
    }

    #[test]
    fn differing_tags_compare_unequal() {
        assert!(!tags_equal(&[1, 2, 3], &[1, 2, 4]));
    }

    #[test]
    fn differing_lengths_compare_unequal() {
        assert!(!tags_equal(&[1, 2, 3], &[1, 2, 3, 4]));
    }
}
