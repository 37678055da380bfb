// SPDX-License-Identifier: Apache-2.0

//! bcrypt credential hashing. The cost factor is pinned so hashes written
//! by earlier deployments keep verifying after upgrades.

pub(crate) const BCRYPT_COST: u32 = 10;

pub(crate) fn hash_password(plain: &str) -> Result<String, String> {
    bcrypt::hash(plain, BCRYPT_COST).map_err(|e| format!("bcrypt hash failed: {e}"))
}

/// A malformed stored hash counts as a mismatch, never a crash.
pub(crate) fn verify_password(plain: &str, stored_hash: &str) -> bool {
    match bcrypt::verify(plain, stored_hash) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!("bcrypt verify rejected stored hash: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_round_trips() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn hashes_carry_the_pinned_cost() {
        let hash = hash_password("pw").expect("hash");
        assert!(hash.contains("$10$"), "unexpected cost marker in {hash}");
    }

    #[test]
    fn malformed_stored_hash_is_a_mismatch() {
        assert!(!verify_password("pw", "not-a-bcrypt-hash"));
        assert!(!verify_password("pw", ""));
    }
}
