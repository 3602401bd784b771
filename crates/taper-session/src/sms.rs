//! SMS dispatch for OTP codes.
//!
//! This module provides the `SmsSender` trait and its implementations:
//! a no-op sender for local development, a Twilio sender, and a recording
//! sender for tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use taper_core::UserId;

use crate::error::{Result, SessionError};

/// Trait for delivering OTP codes.
///
/// This trait abstracts the SMS provider, allowing for mock implementations
/// in tests.
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Deliver `code` to `mobile`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Dispatch` if the message could not be handed to
    /// the provider.
    async fn send_otp(&self, user_id: &UserId, mobile: &str, code: &str) -> Result<()>;
}

/// A sender that only logs the code.
///
/// For local development only. Configuration loading refuses it under the
/// production profile.
#[derive(Debug, Clone, Default)]
pub struct NoopSmsSender;

impl NoopSmsSender {
    /// Create a new no-op sender.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SmsSender for NoopSmsSender {
    async fn send_otp(&self, user_id: &UserId, mobile: &str, code: &str) -> Result<()> {
        tracing::warn!(
            user_id = %user_id,
            mobile = %mobile,
            code = %code,
            "NoopSmsSender: OTP not sent, no SMS provider configured"
        );
        Ok(())
    }
}

/// Credentials for the Twilio Messages API.
#[derive(Clone)]
pub struct TwilioConfig {
    /// Account SID.
    pub account_sid: String,
    /// Auth token.
    pub auth_token: String,
    /// Sender number in E.164 form.
    pub from: String,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

/// Sends OTP codes through the Twilio Messages API.
#[derive(Debug, Clone)]
pub struct TwilioSmsSender {
    client: reqwest::Client,
    base_url: String,
    config: TwilioConfig,
}

/// Default Twilio API base URL.
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Error body returned by Twilio.
#[derive(Debug, Deserialize)]
struct TwilioError {
    message: String,
}

impl TwilioSmsSender {
    /// Create a sender against the public Twilio API.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Internal` if the HTTP client cannot be created.
    pub fn new(config: TwilioConfig) -> Result<Self> {
        Self::with_base_url(config, TWILIO_API_BASE)
    }

    /// Create a sender against a custom API base URL.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Internal` if the HTTP client cannot be created.
    pub fn with_base_url(config: TwilioConfig, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SessionError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            config,
        })
    }

    /// Get the base URL of the Twilio API.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send_otp(&self, user_id: &UserId, mobile: &str, code: &str) -> Result<()> {
        let body = format!("Your verification code is {code}");
        let form = [
            ("To", mobile),
            ("From", self.config.from.as_str()),
            ("Body", body.as_str()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| SessionError::Dispatch(format!("Twilio request failed: {e}")))?;

        if response.status().is_success() {
            tracing::debug!(user_id = %user_id, "OTP dispatched via Twilio");
            Ok(())
        } else {
            let status = response.status();
            let error = response
                .json::<TwilioError>()
                .await
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("Twilio returned status {status}"));

            tracing::error!(
                user_id = %user_id,
                status = %status,
                error = %error,
                "Failed to dispatch OTP"
            );

            Err(SessionError::Dispatch(format!("Twilio error: {error}")))
        }
    }
}

/// A message captured by [`RecordingSmsSender`].
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentOtp {
    /// Recipient user.
    pub user_id: UserId,
    /// Recipient number.
    pub mobile: String,
    /// The code sent.
    pub code: String,
}

/// A sender that records every message for inspection in tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingSmsSender {
    sent: parking_lot::Mutex<Vec<SentOtp>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingSmsSender {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with a dispatch error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// All messages sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentOtp> {
        self.sent.lock().clone()
    }

    /// The most recent code sent to `mobile`.
    #[must_use]
    pub fn last_code_for(&self, mobile: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.mobile == mobile)
            .map(|m| m.code.clone())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send_otp(&self, user_id: &UserId, mobile: &str, code: &str) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SessionError::Dispatch("provider unavailable".to_string()));
        }
        self.sent.lock().push(SentOtp {
            user_id: *user_id,
            mobile: mobile.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }
}
