//! Configuration and result types for session operations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Random source used for OTP codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpStrength {
    /// Thread-local PRNG.
    #[default]
    Easy,
    /// Operating system CSPRNG.
    Strong,
}

impl FromStr for OtpStrength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "strong" => Ok(Self::Strong),
            other => Err(format!("unknown OTP strength: {other}")),
        }
    }
}

/// The environment the service is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentProfile {
    /// Local development.
    #[default]
    Dev,
    /// Pre-production.
    Staging,
    /// Production. Test shortcuts are disabled.
    Prod,
}

impl DeploymentProfile {
    /// Whether this is the production profile.
    #[must_use]
    pub const fn is_prod(self) -> bool {
        matches!(self, Self::Prod)
    }
}

impl FromStr for DeploymentProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Self::Dev),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for DeploymentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => f.write_str("dev"),
            Self::Staging => f.write_str("staging"),
            Self::Prod => f.write_str("prod"),
        }
    }
}

/// Configuration for OTP issuance and verification.
#[derive(Clone)]
pub struct OtpConfig {
    /// Random source for codes.
    pub strength: OtpStrength,
    /// Number of digits per code.
    pub code_length: u32,
    /// How long a code stays valid (seconds).
    pub ttl_seconds: u64,
    /// Code accepted for every user outside production.
    pub magic_code: Option<String>,
    /// Upper bound on one SMS dispatch (seconds).
    pub dispatch_timeout_seconds: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            strength: OtpStrength::Easy,
            code_length: 6,
            ttl_seconds: 300, // 5 minutes
            magic_code: None,
            dispatch_timeout_seconds: 10,
        }
    }
}

impl fmt::Debug for OtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpConfig")
            .field("strength", &self.strength)
            .field("code_length", &self.code_length)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("magic_code", &self.magic_code.as_ref().map(|_| "<set>"))
            .field("dispatch_timeout_seconds", &self.dispatch_timeout_seconds)
            .finish()
    }
}

/// An access and refresh token issued together.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Device-bound refresh token.
    pub refresh_token: String,
    /// Expiry of the access token.
    pub access_expires_at: DateTime<Utc>,
    /// Expiry of the refresh token.
    pub refresh_expires_at: DateTime<Utc>,
}
