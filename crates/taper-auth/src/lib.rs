//! Bearer token signing and verification for taper.
//!
//! This crate mints and verifies the two tokens of a session:
//!
//! - Access tokens: short-lived, presented on every protected request
//! - Refresh tokens: long-lived, exchanged for a new pair and bound to a device
//!
//! Both are HS256 JWTs signed with one shared secret. Any other `alg` is
//! rejected.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│   TokenSigner    │
//! │   (middleware)   │     │   verify_access  │
//! └──────────────────┘     └────────┬─────────┘
//!                                   │
//! ┌──────────────────┐     ┌────────▼─────────┐
//! │  SessionManager  │────▶│   Clock          │
//! │  issue/refresh   │     │   (injected)     │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taper_auth::{AuthConfig, TokenSigner};
//! use taper_core::{SystemClock, UserId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new("a-secret-of-at-least-thirty-two-bytes");
//! let signer = TokenSigner::new(config, Arc::new(SystemClock));
//!
//! let issued = signer.issue_access(UserId::generate())?;
//! let claims = signer.verify_access(&issued.token)?;
//!
//! println!("User ID: {}", claims.user_id());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::fmt;

pub mod error;
pub mod jwt;

pub use error::{AuthError, Result};
pub use jwt::{IssuedToken, TokenClaims, TokenSigner, TokenType};

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;

/// Default refresh token lifetime (7 days).
pub const DEFAULT_REFRESH_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Minimum accepted length of the signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Configuration for token signing.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HS256 secret.
    pub secret: String,
    /// Access token lifetime in seconds.
    pub access_ttl_seconds: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_seconds: u64,
}

impl AuthConfig {
    /// Create a configuration with the default lifetimes.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .finish()
    }
}

/// A short, log-safe identifier for a token.
///
/// Hex of the first 8 bytes of the token's blake3 digest.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(&blake3::hash(token.as_bytes()).as_bytes()[..8])
}
