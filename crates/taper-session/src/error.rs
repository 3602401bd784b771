//! Error types for OTP and session operations.

use std::fmt;

use taper_store::RotationOutcome;
use thiserror::Error;

/// A result type using `SessionError`.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Why a refresh token was not accepted for rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    /// No session exists for the device.
    Missing,
    /// The device's session holds a different token.
    Mismatch,
    /// The device's session has expired.
    Expired,
}

impl RefreshRejection {
    /// Map a store rotation outcome to a rejection, `None` when rotated.
    #[must_use]
    pub const fn from_outcome(outcome: RotationOutcome) -> Option<Self> {
        match outcome {
            RotationOutcome::Rotated => None,
            RotationOutcome::Missing => Some(Self::Missing),
            RotationOutcome::Mismatch => Some(Self::Mismatch),
            RotationOutcome::Expired => Some(Self::Expired),
        }
    }
}

impl fmt::Display for RefreshRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no session for device"),
            Self::Mismatch => f.write_str("token does not match session"),
            Self::Expired => f.write_str("session expired"),
        }
    }
}

/// Errors that can occur in OTP and session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No user exists for the given mobile number or ID.
    #[error("user not found")]
    UserNotFound,

    /// The code is wrong, expired, or already used.
    #[error("invalid or expired OTP")]
    InvalidOtp,

    /// The refresh token was not accepted.
    #[error("refresh rejected: {0}")]
    RefreshRejected(RefreshRejection),

    /// The SMS could not be delivered.
    #[error("OTP dispatch failed: {0}")]
    Dispatch(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] taper_store::StoreError),

    /// Token error.
    #[error("authentication error: {0}")]
    Auth(#[from] taper_auth::AuthError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::UserNotFound => 404,
            Self::InvalidOtp | Self::RefreshRejected(_) => 401,
            Self::Auth(e) => e.http_status_code(),
            Self::Dispatch(_) | Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Dispatch(_) | Self::Store(_) | Self::Internal(_))
    }
}
