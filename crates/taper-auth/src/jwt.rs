//! Token minting and verification.
//!
//! Tokens are compact HS256 JWTs with the claims `sub`, `type`, `iat`, `exp`
//! and `jti`. Verification accepts HS256 only, then checks expiry a second
//! time against the injected clock.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use taper_core::{Clock, TokenId, UserId};

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// The purpose of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived credential for API calls.
    Access,
    /// Long-lived credential exchanged for a new pair.
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Verified claims carried by a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// The user the token was issued to (`sub`).
    pub subject: UserId,
    /// Access or refresh (`type`).
    pub token_type: TokenType,
    /// Issue instant, whole seconds (`iat`).
    pub issued_at: DateTime<Utc>,
    /// Expiry instant, whole seconds (`exp`).
    pub expires_at: DateTime<Utc>,
    /// Unique token id (`jti`).
    pub token_id: TokenId,
}

impl TokenClaims {
    /// Whether this is a refresh token.
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        self.token_type == TokenType::Refresh
    }

    /// The subject of the token.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.subject
    }
}

/// A freshly minted token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The compact JWT.
    pub token: String,
    /// Its claims.
    pub claims: TokenClaims,
}

/// Claims as they appear on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(rename = "type")]
    token_type: TokenType,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Mints and verifies HS256 tokens with a shared secret.
pub struct TokenSigner {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenSigner {
    /// Create a signer for the given configuration and time source.
    #[must_use]
    pub fn new(config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
            clock,
        }
    }

    /// The signer's configuration.
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Mint an access token for a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if encoding fails.
    pub fn issue_access(&self, user_id: UserId) -> Result<IssuedToken> {
        self.issue(user_id, TokenType::Access, self.config.access_ttl_seconds)
    }

    /// Mint a refresh token for a user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if encoding fails.
    pub fn issue_refresh(&self, user_id: UserId) -> Result<IssuedToken> {
        self.issue(user_id, TokenType::Refresh, self.config.refresh_ttl_seconds)
    }

    fn issue(
        &self,
        user_id: UserId,
        token_type: TokenType,
        ttl_seconds: u64,
    ) -> Result<IssuedToken> {
        let ttl = i64::try_from(ttl_seconds)
            .map_err(|_| AuthError::Internal("token TTL out of range".to_string()))?;
        let iat = self.clock.now().timestamp();
        let exp = iat
            .checked_add(ttl)
            .ok_or_else(|| AuthError::Internal("token expiry out of range".to_string()))?;
        let token_id = TokenId::generate();

        let raw = RawClaims {
            sub: user_id.to_string(),
            token_type,
            iat,
            exp,
            jti: token_id.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &raw, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(IssuedToken {
            token,
            claims: TokenClaims {
                subject: user_id,
                token_type,
                issued_at: timestamp(iat)?,
                expires_at: timestamp(exp)?,
                token_id,
            },
        })
    }

    /// Verify a token of either type and return its claims.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidSignature` if the signature does not verify or the
    ///   token was signed with any algorithm other than HS256
    /// - `AuthError::TokenExpired` if the clock has reached `exp`
    /// - `AuthError::Malformed` or `AuthError::InvalidUserId` for bad claims
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let token_data = decode::<RawClaims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                _ => AuthError::Malformed(e.to_string()),
            },
        )?;

        let raw = token_data.claims;

        let expires_at = timestamp(raw.exp)?;
        if self.clock.now() >= expires_at {
            return Err(AuthError::TokenExpired);
        }

        let subject = UserId::from_str(&raw.sub).map_err(|_| AuthError::InvalidUserId)?;
        let token_id = TokenId::from_str(&raw.jti)
            .map_err(|_| AuthError::Malformed("invalid jti".to_string()))?;

        Ok(TokenClaims {
            subject,
            token_type: raw.token_type,
            issued_at: timestamp(raw.iat)?,
            expires_at,
            token_id,
        })
    }

    /// Verify a token and require it to be an access token.
    ///
    /// # Errors
    ///
    /// Returns any error of [`TokenSigner::verify`], or
    /// `AuthError::WrongTokenType` for a refresh token.
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims> {
        self.verify_typed(token, TokenType::Access)
    }

    /// Verify a token and require it to be a refresh token.
    ///
    /// # Errors
    ///
    /// Returns any error of [`TokenSigner::verify`], or
    /// `AuthError::WrongTokenType` for an access token.
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims> {
        self.verify_typed(token, TokenType::Refresh)
    }

    fn verify_typed(&self, token: &str, expected: TokenType) -> Result<TokenClaims> {
        let claims = self.verify(token)?;
        if claims.token_type != expected {
            return Err(AuthError::WrongTokenType {
                expected,
                found: claims.token_type,
            });
        }
        Ok(claims)
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Malformed("timestamp out of range".to_string()))
}
