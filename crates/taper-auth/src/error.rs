//! Authentication error types.

use thiserror::Error;

use crate::jwt::TokenType;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during token signing and verification.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token could not be parsed or its claims are malformed.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The signature does not verify, or the token uses another algorithm.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The token verified but carries the wrong type tag.
    #[error("expected {expected} token, found {found}")]
    WrongTokenType {
        /// The type the caller required.
        expected: TokenType,
        /// The type carried by the token.
        found: TokenType,
    },

    /// The user ID in the `sub` claim is malformed.
    #[error("invalid user ID format")]
    InvalidUserId,

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns `true` if this error indicates the client should retry with a new token.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::TokenExpired)
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Malformed(_)
            | Self::InvalidSignature
            | Self::TokenExpired
            | Self::WrongTokenType { .. }
            | Self::InvalidUserId => 401,
            Self::Internal(_) => 500,
        }
    }
}
