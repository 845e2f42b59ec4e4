//! Refresh secret generation and digests.
//!
//! The raw secret is only ever handed to the client; storage sees the
//! SHA-256 digest, which is deterministic so the presented secret can be
//! looked up without keeping it.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt;

const SECRET_BYTES: usize = 32;

/// SHA-256 digest of a refresh secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretDigest([u8; 32]);

impl SecretDigest {
    #[must_use]
    pub fn of(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Rebuild a digest read back from storage.
    ///
    /// # Errors
    /// Returns an error if the stored value is not 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .context("stored refresh digest must be 32 bytes")?;
        Ok(Self(array))
    }
}

// Only a short prefix, enough to correlate log lines.
impl fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SecretDigest({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Create a new refresh secret from the OS CSPRNG.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn generate_refresh_secret() -> Result<SecretString> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh secret")?;
    Ok(SecretString::from(Base64UrlUnpadded::encode_string(&bytes)))
}

/// Digest a secret held in a `SecretString`.
#[must_use]
pub fn digest_secret(secret: &SecretString) -> SecretDigest {
    SecretDigest::of(secret.expose_secret())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_decode_to_32_bytes() -> Result<()> {
        let secret = generate_refresh_secret()?;
        let decoded = Base64UrlUnpadded::decode_vec(secret.expose_secret())
            .map_err(|_| anyhow::anyhow!("secret is not base64url"))?;
        assert_eq!(decoded.len(), SECRET_BYTES);
        Ok(())
    }

    #[test]
    fn generated_secrets_differ() -> Result<()> {
        let first = generate_refresh_secret()?;
        let second = generate_refresh_secret()?;
        assert_ne!(first.expose_secret(), second.expose_secret());
        Ok(())
    }

    #[test]
    fn digest_is_stable_and_distinct() {
        assert_eq!(SecretDigest::of("token"), SecretDigest::of("token"));
        assert_ne!(SecretDigest::of("token"), SecretDigest::of("other"));
    }

    #[test]
    fn digest_round_trips_through_storage_bytes() -> Result<()> {
        let digest = SecretDigest::of("token");
        assert_eq!(SecretDigest::from_slice(digest.as_bytes())?, digest);
        assert!(SecretDigest::from_slice(&[1, 2, 3]).is_err());
        Ok(())
    }

    #[test]
    fn debug_does_not_print_full_digest() {
        let rendered = format!("{:?}", SecretDigest::of("token"));
        assert!(rendered.ends_with("..)"));
        assert!(rendered.len() < 30);
    }
}
