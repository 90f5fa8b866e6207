//! Parley Token - Credential Mint
//!
//! Signed, expiring bearer tokens. A token is a self-contained capability:
//! owner, mint time, expiry, and an HMAC-SHA256 tag over the other fields
//! under a server-held secret. Nothing is persisted: there are no session
//! rows, and minting is side-effect-free.
//!
//! Verification failures are silent: [`TokenMint::check`] returns `None`
//! and callers treat "no credential" identically to "never logged in". The
//! one caller-level exception is the forgotten-token condition (valid tag,
//! owner absent from world-state), which belongs to the ledger, not here.

#![forbid(unsafe_code)]

use hmac::{Hmac, Mac};
use parley_core::time::Clock;
use parley_core::{MarketError, MarketResult, Username};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// A bearer credential. Held by clients, never stored server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub owner: Username,
    pub minted_unixtime: i64,
    pub expires_unixtime: i64,
    /// HMAC-SHA256 over the other three fields.
    pub tag: Vec<u8>,
}

impl AuthToken {
    /// Canonical byte encoding of everything the tag covers.
    fn claims_bytes(&self) -> MarketResult<Vec<u8>> {
        postcard::to_allocvec(&(
            self.owner.as_str(),
            self.minted_unixtime,
            self.expires_unixtime,
        ))
        .map_err(|e| MarketError::internal(format!("token claims encoding failed: {e}")))
    }
}

/// Seam for a future revocation list. Consulted on every `check`; the
/// default accepts everything, and `revoke` is a no-op until a real list
/// exists. Adding one must not change the verification contract.
pub trait RevocationCheck: Send + Sync {
    fn is_revoked(&self, token: &AuthToken) -> bool;
}

/// The default: nothing is ever revoked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevocations;

impl RevocationCheck for NoRevocations {
    fn is_revoked(&self, _token: &AuthToken) -> bool {
        false
    }
}

/// Issues and verifies tokens. Stateless beyond the secret and a clock.
pub struct TokenMint {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
    revocations: Arc<dyn RevocationCheck>,
}

impl TokenMint {
    pub fn new(secret: impl Into<Vec<u8>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.into(),
            clock,
            revocations: Arc::new(NoRevocations),
        }
    }

    pub fn with_revocations(mut self, revocations: Arc<dyn RevocationCheck>) -> Self {
        self.revocations = revocations;
        self
    }

    fn compute_tag(&self, token: &AuthToken) -> MarketResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| MarketError::internal(format!("bad hmac key: {e}")))?;
        mac.update(&token.claims_bytes()?);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Mint a token for `owner` valid from now until now + `ttl_seconds`.
    pub fn mint(&self, owner: Username, ttl_seconds: i64) -> MarketResult<AuthToken> {
        let now = self.clock.now_unixtime();
        let mut token = AuthToken {
            owner,
            minted_unixtime: now,
            expires_unixtime: now.saturating_add(ttl_seconds),
            tag: Vec::new(),
        };
        token.tag = self.compute_tag(&token)?;
        Ok(token)
    }

    /// Verify a client-presented token. `None` means "no credential": the
    /// token was absent, outside its `minted <= now < expires` window,
    /// revoked, or carried a bad tag. Constant-time tag comparison.
    pub fn check(&self, token: Option<&AuthToken>) -> Option<AuthToken> {
        let token = token?;
        let now = self.clock.now_unixtime();
        if !(token.minted_unixtime <= now && now < token.expires_unixtime) {
            return None;
        }
        if self.revocations.is_revoked(token) {
            return None;
        }
        let true_tag = match self.compute_tag(token) {
            Ok(tag) => tag,
            Err(_) => return None,
        };
        if bool::from(true_tag.ct_eq(&token.tag)) {
            Some(token.clone())
        } else {
            tracing::debug!(owner = %token.owner, "token presented with bad tag");
            None
        }
    }

    /// Revocation is not implemented yet; the [`RevocationCheck`] seam is
    /// where a real list would plug in.
    pub fn revoke(&self, token: &AuthToken) {
        tracing::debug!(owner = %token.owner, "revoke requested (no-op)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::time::ManualClock;

    fn mint_at(now: i64) -> (TokenMint, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let mint = TokenMint::new(b"test secret".to_vec(), clock.clone());
        (mint, clock)
    }

    #[test]
    fn round_trip_inside_window() {
        let (mint, clock) = mint_at(1000);
        let token = mint.mint(Username::from("alice"), 3600).unwrap();
        assert_eq!(token.minted_unixtime, 1000);
        assert_eq!(token.expires_unixtime, 4600);

        // Valid at mint time and just before expiry.
        assert_eq!(mint.check(Some(&token)), Some(token.clone()));
        clock.set(4599);
        assert!(mint.check(Some(&token)).is_some());
    }

    #[test]
    fn rejected_outside_window() {
        let (mint, clock) = mint_at(1000);
        let token = mint.mint(Username::from("alice"), 3600).unwrap();

        // Expiry is exclusive.
        clock.set(4600);
        assert!(mint.check(Some(&token)).is_none());

        // A clock that went backwards past the mint time also rejects.
        clock.set(999);
        assert!(mint.check(Some(&token)).is_none());
    }

    #[test]
    fn absent_token_is_no_credential() {
        let (mint, _clock) = mint_at(1000);
        assert!(mint.check(None).is_none());
    }

    #[test]
    fn tampered_tag_rejected() {
        let (mint, _clock) = mint_at(1000);
        let mut token = mint.mint(Username::from("alice"), 3600).unwrap();
        token.tag[0] ^= 0x01;
        assert!(mint.check(Some(&token)).is_none());
    }

    #[test]
    fn tampered_claims_rejected() {
        let (mint, _clock) = mint_at(1000);
        let mut token = mint.mint(Username::from("alice"), 3600).unwrap();
        token.owner = Username::from("mallory");
        assert!(mint.check(Some(&token)).is_none());

        let mut extended = mint.mint(Username::from("alice"), 3600).unwrap();
        extended.expires_unixtime += 1_000_000;
        assert!(mint.check(Some(&extended)).is_none());
    }

    #[test]
    fn different_secret_rejects() {
        let clock = Arc::new(ManualClock::new(1000));
        let mint_a = TokenMint::new(b"secret a".to_vec(), clock.clone());
        let mint_b = TokenMint::new(b"secret b".to_vec(), clock);
        let token = mint_a.mint(Username::from("alice"), 3600).unwrap();
        assert!(mint_b.check(Some(&token)).is_none());
        assert!(mint_a.check(Some(&token)).is_some());
    }

    #[test]
    fn revocation_seam_is_consulted() {
        struct RevokeEveryone;
        impl RevocationCheck for RevokeEveryone {
            fn is_revoked(&self, _token: &AuthToken) -> bool {
                true
            }
        }

        let clock = Arc::new(ManualClock::new(1000));
        let mint =
            TokenMint::new(b"secret".to_vec(), clock).with_revocations(Arc::new(RevokeEveryone));
        let token = mint.mint(Username::from("alice"), 3600).unwrap();
        assert!(mint.check(Some(&token)).is_none());
    }

    #[test]
    fn revoke_is_currently_a_noop() {
        let (mint, _clock) = mint_at(1000);
        let token = mint.mint(Username::from("alice"), 3600).unwrap();
        mint.revoke(&token);
        assert!(mint.check(Some(&token)).is_some());
    }
}
