//! Access token codec: HS256 JWTs carrying subject id and role.
//!
//! Verification is local: signature and expiry only, no storage lookups.
//! Revoking refresh credentials therefore does not shorten the life of an
//! access token already handed out; the short TTL bounds that window.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::principal::{Principal, Role};

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid signing key")]
    InvalidKey,
    #[error("invalid token ttl")]
    InvalidTtl,
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Verified access token claims, attached to requests by the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, CodecError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| CodecError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Debug)]
pub struct AccessTokenCodec {
    key: SecretString,
    ttl: Duration,
}

impl AccessTokenCodec {
    /// # Errors
    /// Returns an error if the key is empty or the TTL is out of range.
    pub fn new(key: SecretString, ttl: std::time::Duration) -> Result<Self, CodecError> {
        if key.expose_secret().is_empty() {
            return Err(CodecError::InvalidKey);
        }
        let ttl = Duration::from_std(ttl).map_err(|_| CodecError::InvalidTtl)?;
        if ttl <= Duration::zero() {
            return Err(CodecError::InvalidTtl);
        }
        Ok(Self { key, ttl })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, CodecError> {
        <HmacSha256 as Mac>::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|_| CodecError::InvalidKey)
    }

    /// Sign a token for `principal` valid from `now` for the configured TTL.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or the expiry falls
    /// outside the representable date range.
    pub fn issue(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, CodecError> {
        let header = TokenHeader {
            alg: ALG.to_string(),
            typ: "JWT".to_string(),
        };
        let exp = now
            .checked_add_signed(self.ttl)
            .ok_or(CodecError::InvalidTtl)?;
        let claims = AccessClaims {
            sub: principal.id,
            role: principal.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let signing_input = format!("{}.{}", b64e_json(&header)?, b64e_json(&claims)?);

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }

    /// Check signature and expiry and return the embedded claims.
    ///
    /// # Errors
    /// Returns an error for malformed tokens, foreign algorithms, bad
    /// signatures, or `exp` at or before `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, CodecError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(CodecError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(CodecError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(CodecError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(CodecError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG {
            return Err(CodecError::UnsupportedAlg(header.alg));
        }

        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| CodecError::Base64)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CodecError::InvalidSignature)?;

        let claims: AccessClaims = b64d_json(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(CodecError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const NOW: i64 = 1_700_000_000;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(NOW, 0).unwrap_or_default()
    }

    fn codec(key: &str) -> Result<AccessTokenCodec> {
        Ok(AccessTokenCodec::new(
            SecretString::from(key.to_string()),
            std::time::Duration::from_secs(15 * 60),
        )?)
    }

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::from_u128(7),
            name: "Cook".to_string(),
            email: "cook@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn issue_then_verify_returns_claims() -> Result<()> {
        let codec = codec("kitchen-secret")?;
        let token = codec.issue(&principal(Role::Admin), now())?;
        let claims = codec.verify(&token, now())?;
        assert_eq!(claims.sub, Uuid::from_u128(7));
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 900);
        Ok(())
    }

    #[test]
    fn token_expires_at_exp() -> Result<()> {
        let codec = codec("kitchen-secret")?;
        let token = codec.issue(&principal(Role::RegularUser), now())?;
        let almost = now() + Duration::seconds(899);
        assert!(codec.verify(&token, almost).is_ok());
        let at_exp = now() + Duration::seconds(900);
        assert!(matches!(
            codec.verify(&token, at_exp),
            Err(CodecError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn expiry_past_the_date_range_is_an_error() -> Result<()> {
        let codec = AccessTokenCodec::new(
            SecretString::from("kitchen-secret".to_string()),
            std::time::Duration::from_secs(8_640_000_000_000),
        )?;
        assert!(matches!(
            codec.issue(&principal(Role::RegularUser), now()),
            Err(CodecError::InvalidTtl)
        ));
        Ok(())
    }

    #[test]
    fn foreign_key_is_rejected() -> Result<()> {
        let token = codec("kitchen-secret")?.issue(&principal(Role::RegularUser), now())?;
        assert!(matches!(
            codec("other-secret")?.verify(&token, now()),
            Err(CodecError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn tampered_claims_are_rejected() -> Result<()> {
        let codec = codec("kitchen-secret")?;
        let token = codec.issue(&principal(Role::RegularUser), now())?;
        let parts: Vec<&str> = token.split('.').collect();
        let forged = AccessClaims {
            sub: Uuid::from_u128(7),
            role: Role::Admin,
            iat: NOW,
            exp: NOW + 900,
        };
        let forged_token = format!("{}.{}.{}", parts[0], b64e_json(&forged)?, parts[2]);
        assert!(matches!(
            codec.verify(&forged_token, now()),
            Err(CodecError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn malformed_tokens_are_rejected() -> Result<()> {
        let codec = codec("kitchen-secret")?;
        assert!(matches!(
            codec.verify("", now()),
            Err(CodecError::TokenFormat | CodecError::Base64 | CodecError::Json(_))
        ));
        assert!(matches!(
            codec.verify("a.b", now()),
            Err(CodecError::TokenFormat)
        ));
        assert!(matches!(
            codec.verify("a.b.c.d", now()),
            Err(CodecError::TokenFormat)
        ));
        assert!(codec.verify("!!.!!.!!", now()).is_err());
        Ok(())
    }

    #[test]
    fn none_algorithm_is_rejected() -> Result<()> {
        let codec = codec("kitchen-secret")?;
        let header = TokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = AccessClaims {
            sub: Uuid::nil(),
            role: Role::Admin,
            iat: NOW,
            exp: NOW + 900,
        };
        let token = format!("{}.{}.", b64e_json(&header)?, b64e_json(&claims)?);
        assert!(matches!(
            codec.verify(&token, now()),
            Err(CodecError::UnsupportedAlg(alg)) if alg == "none"
        ));
        Ok(())
    }

    #[test]
    fn empty_key_and_zero_ttl_are_refused() {
        assert!(matches!(
            AccessTokenCodec::new(
                SecretString::from(String::new()),
                std::time::Duration::from_secs(60)
            ),
            Err(CodecError::InvalidKey)
        ));
        assert!(matches!(
            AccessTokenCodec::new(
                SecretString::from("k".to_string()),
                std::time::Duration::ZERO
            ),
            Err(CodecError::InvalidTtl)
        ));
    }
}
