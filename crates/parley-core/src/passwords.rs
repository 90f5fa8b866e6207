//! Salted scrypt hashing, used for login passwords and email-verification
//! codes alike.
//!
//! Fixed work factors (N=2^14, r=8, p=1); verification recomputes the hash
//! and compares in constant time.

use crate::errors::{MarketError, MarketResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;
const LOG_N: u8 = 14;
const R: u32 = 8;
const P: u32 = 1;

/// A salt plus the scrypt digest of (secret, salt).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
}

fn derive(secret: &str, salt: &[u8]) -> MarketResult<Vec<u8>> {
    let params = scrypt::Params::new(LOG_N, R, P, HASH_BYTES)
        .map_err(|e| MarketError::internal(format!("bad scrypt params: {e}")))?;
    let mut out = vec![0u8; HASH_BYTES];
    scrypt::scrypt(secret.as_bytes(), salt, &params, &mut out)
        .map_err(|e| MarketError::internal(format!("scrypt failed: {e}")))?;
    Ok(out)
}

/// Hash a fresh secret under a random salt.
pub fn hash_password(secret: &str) -> MarketResult<PasswordHash> {
    let mut salt = vec![0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(secret, &salt)?;
    Ok(PasswordHash { salt, hash })
}

/// Constant-time check of a candidate secret against a stored hash.
pub fn check_password(candidate: &str, stored: &PasswordHash) -> bool {
    match derive(candidate, &stored.salt) {
        Ok(recomputed) => recomputed.ct_eq(&stored.hash).into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let hashed = hash_password("hunter2").unwrap();
        assert!(check_password("hunter2", &hashed));
        assert!(!check_password("hunter3", &hashed));
        assert!(!check_password("", &hashed));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }
}
