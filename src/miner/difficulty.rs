// src/miner/difficulty.rs
//! Difficulty evaluation
//!
//! A hash passes difficulty `d` when the hash, read as a 256-bit little-endian
//! integer, times `d` still fits in 256 bits. This is the CryptoNote
//! `check_hash` rule, equivalent to `hash <= (2^256 - 1) / d`.

use crate::miner::algorithm::Hash;
use crate::utils::error::MinerError;

/// Returns whether `hash` satisfies `difficulty`
///
/// Difficulty 0 and 1 accept every hash.
pub fn check_hash(hash: &Hash, difficulty: u64) -> bool {
    let d = difficulty as u128;

    // The top word decides for almost every random hash.
    if (word(hash, 3) as u128 * d) >> 64 != 0 {
        return false;
    }

    let mut carry: u128 = 0;
    for i in 0..4 {
        let product = word(hash, i) as u128 * d + carry;
        carry = product >> 64;
    }
    carry == 0
}

fn word(hash: &Hash, index: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[index * 8..index * 8 + 8]);
    u64::from_le_bytes(bytes)
}

/// Converts a stratum job target into a difficulty
///
/// Pools send either a 4-byte ("short") or an 8-byte ("mid") little-endian
/// target. The short form is widened to 64 bits the way CPU miners do it.
///
/// # Errors
/// Returns `MinerError::InputError` for other lengths and for zero targets.
pub fn difficulty_from_target(target: &[u8]) -> Result<u64, MinerError> {
    match target.len() {
        4 => {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(target);
            let short = u32::from_le_bytes(bytes) as u64;
            if short == 0 {
                return Err(MinerError::InputError("Target must be non-zero".into()));
            }
            let wide = u64::MAX / (0xFFFF_FFFF / short);
            Ok(u64::MAX / wide)
        }
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(target);
            let mid = u64::from_le_bytes(bytes);
            if mid == 0 {
                return Err(MinerError::InputError("Target must be non-zero".into()));
            }
            Ok(u64::MAX / mid)
        }
        n => Err(MinerError::InputError(format!(
            "Unsupported target length {} (expected 4 or 8 bytes)",
            n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn hash_with_top_word(top: u64) -> Hash {
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&top.to_le_bytes());
        hash
    }

    #[test]
    fn difficulty_one_accepts_everything() {
        assert!(check_hash(&[0xFF; 32], 1));
        assert!(check_hash(&[0x00; 32], 1));
    }

    #[test]
    fn zero_hash_passes_any_difficulty() {
        assert!(check_hash(&[0; 32], u64::MAX));
    }

    #[test]
    fn max_hash_fails_difficulty_two() {
        assert!(!check_hash(&[0xFF; 32], 2));
    }

    #[test]
    fn boundary_on_top_word() {
        let d = 1000;
        assert!(
            check_hash(&hash_with_top_word(u64::MAX / d), d),
            "hash at the target must pass"
        );
        assert!(
            !check_hash(&hash_with_top_word(u64::MAX / d + 1), d),
            "hash just above the target must fail"
        );
    }

    #[test]
    fn carry_from_lower_words_is_counted() {
        // top * 3 == 2^64 - 1 fits, but the low words carry into it.
        let mut hash = [0xFFu8; 32];
        hash[24..].copy_from_slice(&(u64::MAX / 3).to_le_bytes());
        assert!(!check_hash(&hash, 3));

        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&(u64::MAX / 3).to_le_bytes());
        assert!(check_hash(&hash, 3));
    }

    #[test]
    fn known_vector() {
        let hash = hex!("00000000000000000000000000000000000000000000000000000000000f0000");
        // top word = 0x00000f0000000000 (LE bytes 24..32)
        assert!(check_hash(&hash, 0x10_0000));
        assert!(!check_hash(&hash, 0x100_0000));
    }

    #[test]
    fn short_target_conversion() {
        // 0xFFFFFFFF / 0x00418937 = 1000 => difficulty 1000.
        let diff = difficulty_from_target(&hex!("37894100")).unwrap();
        assert_eq!(diff, 1000);
        assert_eq!(difficulty_from_target(&hex!("ffffffff")).unwrap(), 1);
    }

    #[test]
    fn mid_target_conversion() {
        let target = (u64::MAX / 5000).to_le_bytes();
        assert_eq!(difficulty_from_target(&target).unwrap(), 5000);
    }

    #[test]
    fn invalid_targets_are_rejected() {
        assert!(difficulty_from_target(&[0; 4]).is_err());
        assert!(difficulty_from_target(&[0; 8]).is_err());
        assert!(difficulty_from_target(&[1, 2, 3]).is_err());
    }
}
