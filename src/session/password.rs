//! One-way salted password hashing.
//!
//! Hashing is deliberately slow; the session manager runs it on the blocking pool.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

pub trait PasswordHasher: Send + Sync {
    /// Produce a PHC-formatted hash with a fresh salt.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    fn hash(&self, password: &str) -> Result<String>;

    /// Check a password against a stored hash. Malformed hashes never verify.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id hasher.
#[derive(Clone, Debug)]
pub struct Argon2Passwords {
    params: Params,
}

impl Argon2Passwords {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Minimum-cost parameters, only suitable for tests.
    #[must_use]
    pub fn insecure_fast() -> Self {
        let params = Params::new(
            Params::MIN_M_COST,
            Params::MIN_T_COST,
            Params::MIN_P_COST,
            None,
        )
        .unwrap_or_default();
        Self::new(params)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Passwords {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl PasswordHasher for Argon2Passwords {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        // Parameters come from the PHC string, not from `self.params`.
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
