//! Domain types stored in the database.
//!
//! These types represent the persisted state of OTP challenges, refresh
//! sessions, and users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taper_core::{DeviceId, UserId};

/// A one-time passcode issued to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    /// User the code was issued to.
    pub user_id: UserId,
    /// Fixed-width numeric code.
    pub code: String,
    /// Instant from which the code is no longer accepted.
    pub expires_at: DateTime<Utc>,
    /// Set once the code has been consumed.
    pub used: bool,
    /// Issue timestamp.
    pub created_at: DateTime<Utc>,
}

impl OtpChallenge {
    /// Whether the code can still be consumed at `now`.
    #[must_use]
    pub fn is_acceptable(&self, now: DateTime<Utc>) -> bool {
        !self.used && now < self.expires_at
    }
}

/// The current refresh token of one device of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSession {
    /// Owning user.
    pub user_id: UserId,
    /// Device the session is bound to.
    pub device_id: DeviceId,
    /// The refresh token currently on file.
    pub token_value: String,
    /// Expiry of `token_value`.
    pub expires_at: DateTime<Utc>,
    /// Last time the session was written.
    pub updated_at: DateTime<Utc>,
}

impl RefreshSession {
    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Compare the stored token with a presented one.
    ///
    /// Compares digests so the comparison time does not depend on where the
    /// two strings first differ.
    #[must_use]
    pub fn token_matches(&self, presented: &str) -> bool {
        blake3::hash(self.token_value.as_bytes()) == blake3::hash(presented.as_bytes())
    }
}

/// Result of a conditional refresh-session rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The presented token matched and the session was replaced.
    Rotated,
    /// No session exists for the user and device.
    Missing,
    /// A session exists but holds a different token.
    Mismatch,
    /// The session on file has expired.
    Expired,
}

/// A user record stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier for the user.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Mobile number in E.164 form, unique across users.
    pub mobile: String,
    /// Optional email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Optional avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Account status.
    pub status: UserStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account may use protected endpoints.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Account status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UserStatus {
    /// Registered, not yet activated.
    Pending = 1,
    /// Normal account.
    Active = 2,
    /// Temporarily blocked by an operator.
    Suspended = 3,
    /// Dormant account.
    Inactive = 4,
    /// Permanently blocked.
    Banned = 5,
    /// Deleted by the user.
    Deleted = 6,
    /// Retained for records only.
    Archived = 7,
}

impl UserStatus {
    /// Only `Active` passes the account-status policy.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `UserStatus`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Pending),
            2 => Some(Self::Active),
            3 => Some(Self::Suspended),
            4 => Some(Self::Inactive),
            5 => Some(Self::Banned),
            6 => Some(Self::Deleted),
            7 => Some(Self::Archived),
            _ => None,
        }
    }
}
