//! Access-token verification and the live-mode eligibility gate.
//!
//! Tokens are issued by the platform's auth service and signed with the
//! shared `JWT_SECRET`. Besides the subject they carry the account flags
//! live mode depends on; the [`EligibilityGate`] turns those into an allow
//! or a typed rejection.

use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use live_match::profile::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims of a platform access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    pub sub: UserId,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
    /// Active premium subscription
    #[serde(default)]
    pub premium: bool,
    /// Identity verification completed
    #[serde(default)]
    pub verified: bool,
    /// Consent to location-based live matching
    #[serde(default)]
    pub live_consent: bool,
}

/// Why an authenticated caller may not use live mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("Live mode requires a premium subscription")]
    PremiumRequired,

    #[error("Live mode requires a verified identity")]
    VerificationRequired,

    #[error("Live mode requires location consent")]
    ConsentRequired,
}

impl Ineligible {
    pub fn code(&self) -> &'static str {
        match self {
            Ineligible::PremiumRequired => "PREMIUM_REQUIRED",
            Ineligible::VerificationRequired => "VERIFICATION_REQUIRED",
            Ineligible::ConsentRequired => "CONSENT_REQUIRED",
        }
    }
}

/// Decides whether a caller may use live mode
#[async_trait]
pub trait EligibilityGate: Send + Sync {
    async fn check(&self, claims: &AccessClaims) -> Result<(), Ineligible>;
}

/// Gate that trusts the flags carried in the token
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaimsGate;

#[async_trait]
impl EligibilityGate for ClaimsGate {
    async fn check(&self, claims: &AccessClaims) -> Result<(), Ineligible> {
        if !claims.premium {
            return Err(Ineligible::PremiumRequired);
        }
        if !claims.verified {
            return Err(Ineligible::VerificationRequired);
        }
        if !claims.live_consent {
            return Err(Ineligible::ConsentRequired);
        }
        Ok(())
    }
}

/// Verifies HS256 access tokens
pub struct TokenVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Decode and validate a token, including its expiry
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error for malformed, mis-signed or
    /// expired tokens
    pub fn verify(&self, token: &str) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
        decode::<AccessClaims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

/// Sign claims with `secret`
///
/// The platform issues real tokens; this is used by local tooling and tests.
///
/// # Errors
///
/// Returns the `jsonwebtoken` error if encoding fails
pub fn issue_token(
    secret: &str,
    claims: &AccessClaims,
) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
