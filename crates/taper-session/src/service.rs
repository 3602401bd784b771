//! The authentication service used by the HTTP layer.
//!
//! `AuthService` resolves users by mobile number or ID and routes each
//! request to the OTP or session manager.

use std::sync::Arc;

use taper_core::{DeviceId, UserId};
use taper_store::{Store, User};

use crate::error::{Result, SessionError};
use crate::otp::OtpManager;
use crate::session::SessionManager;
use crate::types::TokenPair;

/// Facade over the OTP and session managers.
pub struct AuthService<S: Store> {
    store: Arc<S>,
    otp: OtpManager<S>,
    sessions: SessionManager<S>,
}

impl<S: Store> AuthService<S> {
    /// Create a new service from its managers.
    #[must_use]
    pub fn new(store: Arc<S>, otp: OtpManager<S>, sessions: SessionManager<S>) -> Self {
        Self {
            store,
            otp,
            sessions,
        }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the OTP manager.
    #[must_use]
    pub const fn otp(&self) -> &OtpManager<S> {
        &self.otp
    }

    /// Get the session manager.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    /// Send a new OTP to the user registered with `mobile`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UserNotFound` for an unknown number, or any
    /// error of [`OtpManager::request_challenge`].
    pub async fn request_otp(&self, mobile: &str) -> Result<()> {
        let user = self
            .store
            .get_user_by_mobile(mobile)?
            .ok_or(SessionError::UserNotFound)?;

        self.otp.request_challenge(&user).await
    }

    /// Verify an OTP and start a session on `device_id`.
    ///
    /// An unknown number is reported as `SessionError::InvalidOtp`, the same
    /// as a wrong code.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidOtp` if the number or code is not
    /// accepted, or any error of [`SessionManager::login`].
    pub fn verify_otp(
        &self,
        mobile: &str,
        code: &str,
        device_id: DeviceId,
    ) -> Result<(User, TokenPair)> {
        let Some(user) = self.store.get_user_by_mobile(mobile)? else {
            tracing::debug!("OTP verification for unknown mobile");
            return Err(SessionError::InvalidOtp);
        };

        self.otp.verify_challenge(&user.user_id, code)?;
        let pair = self.sessions.login(user.user_id, device_id)?;

        Ok((user, pair))
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::refresh`].
    pub fn refresh(&self, device_id: DeviceId, refresh_token: &str) -> Result<TokenPair> {
        self.sessions.refresh(device_id, refresh_token)
    }

    /// End the session of one device.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::logout`].
    pub fn logout(&self, user_id: UserId, device_id: DeviceId) -> Result<()> {
        self.sessions.logout(user_id, device_id)
    }

    /// End the sessions of every device of a user.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::revoke_all`].
    pub fn logout_all(&self, user_id: UserId) -> Result<usize> {
        self.sessions.revoke_all(user_id)
    }

    /// Mint a fresh pair for an authenticated user.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::create_bootstrap_token`].
    pub fn create_bootstrap_token(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<TokenPair> {
        self.sessions.create_bootstrap_token(user_id, device_id)
    }

    /// Read a user straight from the store.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UserNotFound` if the user does not exist.
    pub fn profile(&self, user_id: &UserId) -> Result<User> {
        self.store
            .get_user(user_id)?
            .ok_or(SessionError::UserNotFound)
    }
}
