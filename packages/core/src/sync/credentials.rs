//! Account password digests
//!
//! A [`PasswordDigest`] is an Argon2id PHC string carrying its own
//! parameters and salt. Digesting is deliberately slow, so the async entry
//! points run it on tokio's blocking pool instead of a runtime worker.

use crate::error::{FamilyError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Digest `password` under a fresh random salt
    pub fn create(password: &str) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| FamilyError::credential(format!("cannot digest password: {e}")))?;
        Ok(Self(digest.to_string()))
    }

    /// Wrap a stored PHC string, checking that it parses
    pub fn parse(phc: impl Into<String>) -> Result<Self> {
        let phc = phc.into();
        PasswordHash::new(&phc)
            .map_err(|e| FamilyError::credential(format!("malformed password digest: {e}")))?;
        Ok(Self(phc))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `password` produces this digest
    pub fn matches(&self, password: &str) -> Result<bool> {
        let parsed = PasswordHash::new(&self.0)
            .map_err(|e| FamilyError::credential(format!("malformed password digest: {e}")))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// [`create`](Self::create) on the blocking pool
    pub async fn create_blocking(password: String) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::create(&password))
            .await
            .map_err(|e| FamilyError::credential(format!("digest task failed: {e}")))?
    }

    /// [`matches`](Self::matches) on the blocking pool
    pub async fn matches_blocking(&self, password: String) -> Result<bool> {
        let digest = self.clone();
        tokio::task::spawn_blocking(move || digest.matches(&password))
            .await
            .map_err(|e| FamilyError::credential(format!("verify task failed: {e}")))?
    }
}

// Digests stay out of logs
impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(..)")
    }
}
