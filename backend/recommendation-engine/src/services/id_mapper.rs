use crate::models::StoreId;
use sha2::{Digest, Sha256};

const ID_SPACE: u128 = 1_000_000_000_000_000_000;

/// Map an external identifier onto the vector store's integer id space.
///
/// All-digit identifiers that fit in an `i64` are used as is. Everything else is hashed with
/// SHA-256 and reduced modulo 10^18, so the result is stable across processes and always
/// non-negative.
pub fn to_store_id(external_id: &str) -> StoreId {
    if !external_id.is_empty() && external_id.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(id) = external_id.parse::<i64>() {
            return id;
        }
    }

    let digest = Sha256::digest(external_id.as_bytes());
    let reduced = digest
        .iter()
        .fold(0_u128, |acc, b| (acc * 256 + *b as u128) % ID_SPACE);
    reduced as StoreId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids_pass_through() {
        assert_eq!(to_store_id("42"), 42);
        assert_eq!(to_store_id("0"), 0);
        assert_eq!(to_store_id("007"), 7);
    }

    #[test]
    fn test_hashed_ids_are_stable_and_bounded() {
        let first = to_store_id("sku-ABC");
        assert_eq!(first, to_store_id("sku-ABC"));
        assert!((0..ID_SPACE as i64).contains(&first));
        assert_ne!(first, to_store_id("sku-ABD"));
    }

    #[test]
    fn test_overflowing_and_signed_inputs_are_hashed() {
        let huge = "99999999999999999999999";
        assert!((0..ID_SPACE as i64).contains(&to_store_id(huge)));
        assert!(to_store_id("-5") >= 0);
        assert!(to_store_id("") >= 0);
    }

    #[test]
    fn test_matches_integer_digest_reduction() {
        // Big-endian SHA-256 digest reduced mod 10^18
        assert_eq!(to_store_id("sku-ABC"), 40093381687110662);
        assert_eq!(to_store_id("user-1"), 713821469824996379);
    }
}
