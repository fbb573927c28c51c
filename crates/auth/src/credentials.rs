//! Password hashing (PBKDF2-HMAC-SHA256).
//!
//! Stored format: `pbkdf2-sha256$<rounds>$<salt hex>$<digest hex>`.
//! Authentication is hash comparison only; anything fancier (lockouts,
//! rotation policies, MFA) is out of scope.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use millbook_core::{DomainError, DomainResult};

const ROUNDS: u32 = 100_000;
const DIGEST_LEN: usize = 32;

/// A derived password hash, safe to persist in events and read models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Derive a hash from a plaintext password with a fresh random salt.
    pub fn derive(password: &str) -> Self {
        let salt = *Uuid::now_v7().as_bytes();
        Self(encode(password, &salt, ROUNDS))
    }

    /// Re-wrap an already-stored hash string, validating its shape.
    pub fn from_stored(stored: &str) -> DomainResult<Self> {
        parse(stored)?;
        Ok(Self(stored.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare a plaintext password against this hash.
    ///
    /// The comparison runs over the full digest regardless of where the first
    /// mismatch occurs.
    pub fn verify(&self, password: &str) -> bool {
        let Ok((rounds, salt, expected)) = parse(&self.0) else {
            return false;
        };

        let mut digest = [0u8; DIGEST_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut digest);

        let mut diff = 0u8;
        for (a, b) in digest.iter().zip(expected.iter()) {
            diff |= a ^ b;
        }
        diff == 0 && expected.len() == DIGEST_LEN
    }
}

fn encode(password: &str, salt: &[u8; 16], rounds: u32) -> String {
    let mut digest = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut digest);
    format!(
        "pbkdf2-sha256${rounds}${}${}",
        hex::encode(salt),
        hex::encode(digest)
    )
}

fn parse(stored: &str) -> DomainResult<(u32, [u8; 16], Vec<u8>)> {
    let mut parts = stored.split('$');

    let malformed = || DomainError::validation("malformed password hash");

    if parts.next() != Some("pbkdf2-sha256") {
        return Err(malformed());
    }
    let rounds: u32 = parts.next().ok_or_else(malformed)?.parse().map_err(|_| malformed())?;
    let salt_hex = parts.next().ok_or_else(malformed)?;
    let digest_hex = parts.next().ok_or_else(malformed)?;
    if parts.next().is_some() {
        return Err(malformed());
    }

    let salt_bytes = hex::decode(salt_hex).map_err(|_| malformed())?;
    let salt: [u8; 16] = salt_bytes.try_into().map_err(|_| malformed())?;
    let digest = hex::decode(digest_hex).map_err(|_| malformed())?;

    Ok((rounds, salt, digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_then_verify_round_trips() {
        let hash = PasswordHash::derive("paddy@2024");
        assert!(hash.verify("paddy@2024"));
        assert!(!hash.verify("paddy@2025"));
    }

    #[test]
    fn salts_are_unique_per_derivation() {
        let a = PasswordHash::derive("same-password");
        let b = PasswordHash::derive("same-password");
        assert_ne!(a.as_str(), b.as_str());
        assert!(a.verify("same-password"));
        assert!(b.verify("same-password"));
    }

    #[test]
    fn stored_hashes_are_shape_checked() {
        assert!(PasswordHash::from_stored("pbkdf2-sha256$100000$deadbeef$oops").is_err());
        let good = PasswordHash::derive("x");
        assert!(PasswordHash::from_stored(good.as_str()).is_ok());
    }
}
