//! Device-bound refresh session management.
//!
//! Each (user, device) pair holds at most one live refresh token. A session
//! moves through these states:
//!
//! - no session → active (`login`, `create_bootstrap_token`)
//! - active → active with a new token (`refresh`)
//! - active → revoked (`logout`, `revoke_all`)

use std::sync::Arc;

use taper_auth::{token_fingerprint, TokenSigner};
use taper_core::{Clock, DeviceId, UserId};
use taper_store::{RefreshSession, Store};

use crate::error::{RefreshRejection, Result, SessionError};
use crate::types::TokenPair;

/// Mints token pairs and keeps the refresh session of each device.
pub struct SessionManager<S: Store> {
    store: Arc<S>,
    signer: Arc<TokenSigner>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> SessionManager<S> {
    /// Create a new session manager.
    #[must_use]
    pub fn new(store: Arc<S>, signer: Arc<TokenSigner>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            signer,
            clock,
        }
    }

    /// Get the token signer.
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Mint an access and refresh token and the session record that will
    /// hold the refresh token.
    fn mint(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<(TokenPair, RefreshSession)> {
        let access = self.signer.issue_access(user_id)?;
        let refresh = self.signer.issue_refresh(user_id)?;

        let session = RefreshSession {
            user_id,
            device_id,
            token_value: refresh.token.clone(),
            expires_at: refresh.claims.expires_at,
            updated_at: self.clock.now(),
        };
        let pair = TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.claims.expires_at,
            refresh_expires_at: refresh.claims.expires_at,
        };

        Ok((pair, session))
    }

    /// Complete a login for `device_id`, replacing any session the device had.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Auth` if signing fails or `SessionError::Store`
    /// if the session cannot be written.
    pub fn login(&self, user_id: UserId, device_id: DeviceId) -> Result<TokenPair> {
        let (pair, session) = self.mint(user_id, device_id)?;
        self.store.put_refresh_session(&session)?;

        tracing::info!(
            user_id = %user_id,
            device_id = %device_id,
            token = %token_fingerprint(&pair.refresh_token),
            "Refresh session started"
        );

        Ok(pair)
    }

    /// Mint a fresh pair for an already authenticated user.
    ///
    /// Follows the same path as [`SessionManager::login`].
    ///
    /// # Errors
    ///
    /// Same as [`SessionManager::login`].
    pub fn create_bootstrap_token(
        &self,
        user_id: UserId,
        device_id: DeviceId,
    ) -> Result<TokenPair> {
        tracing::debug!(user_id = %user_id, device_id = %device_id, "Bootstrap token requested");
        self.login(user_id, device_id)
    }

    /// Exchange the device's current refresh token for a new pair.
    ///
    /// The presented token must verify as a refresh token, and must be the
    /// exact value on file for its user and `device_id`. The check and the
    /// replacement happen in one store operation, so of two concurrent calls
    /// with the same token at most one succeeds.
    ///
    /// # Errors
    ///
    /// - `SessionError::Auth` if the token does not verify as a refresh token
    /// - `SessionError::RefreshRejected` if the device has no session, holds
    ///   another token, or its session expired
    /// - `SessionError::Store` on storage failure
    pub fn refresh(&self, device_id: DeviceId, presented: &str) -> Result<TokenPair> {
        let claims = self.signer.verify_refresh(presented)?;
        let user_id = claims.user_id();

        let (pair, replacement) = self.mint(user_id, device_id)?;
        let outcome = self
            .store
            .rotate_refresh_session(presented, &replacement, self.clock.now())?;

        if let Some(rejection) = RefreshRejection::from_outcome(outcome) {
            tracing::debug!(
                user_id = %user_id,
                device_id = %device_id,
                token = %token_fingerprint(presented),
                reason = %rejection,
                "Refresh rejected"
            );
            return Err(SessionError::RefreshRejected(rejection));
        }

        tracing::info!(
            user_id = %user_id,
            device_id = %device_id,
            token = %token_fingerprint(&pair.refresh_token),
            "Refresh session rotated"
        );

        Ok(pair)
    }

    /// Revoke the session of one device. Revoking a device without a session
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` on storage failure.
    pub fn logout(&self, user_id: UserId, device_id: DeviceId) -> Result<()> {
        let existed = self.store.delete_refresh_session(&user_id, &device_id)?;
        tracing::info!(user_id = %user_id, device_id = %device_id, existed, "Logged out device");
        Ok(())
    }

    /// Revoke the sessions of every device of a user.
    ///
    /// Returns the number of sessions revoked.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` on storage failure.
    pub fn revoke_all(&self, user_id: UserId) -> Result<usize> {
        let revoked = self.store.delete_user_sessions(&user_id)?;
        tracing::info!(user_id = %user_id, revoked, "Revoked all refresh sessions");
        Ok(revoked)
    }

    /// Find the unexpired session currently holding `token`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` on storage failure.
    pub fn find_by_token(&self, token: &str) -> Result<Option<RefreshSession>> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_refresh_session_by_token(token)?
            .filter(|session| !session.is_expired(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use taper_auth::{AuthConfig, AuthError};
    use taper_core::ManualClock;
    use taper_store::RocksStore;
    use tempfile::TempDir;

    struct Fixture {
        manager: Arc<SessionManager<RocksStore>>,
        store: Arc<RocksStore>,
        clock: Arc<ManualClock>,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let clock = Arc::new(ManualClock::new());
        let signer = Arc::new(TokenSigner::new(
            AuthConfig::new("0123456789abcdef0123456789abcdef"),
            clock.clone(),
        ));
        let manager = Arc::new(SessionManager::new(store.clone(), signer, clock.clone()));
        Fixture {
            manager,
            store,
            clock,
            _dir: dir,
        }
    }

    #[test]
    fn login_stores_session() {
        let f = fixture();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();

        let pair = f.manager.login(user_id, device_id).unwrap();

        let stored = f
            .store
            .get_refresh_session(&user_id, &device_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.token_value, pair.refresh_token);
        assert_eq!(stored.expires_at, pair.refresh_expires_at);

        let claims = f.manager.signer().verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.user_id(), user_id);
    }

    #[test]
    fn refresh_rotates_and_old_token_fails() {
        let f = fixture();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();

        let first = f.manager.login(user_id, device_id).unwrap();
        let second = f.manager.refresh(device_id, &first.refresh_token).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        assert!(matches!(
            f.manager.refresh(device_id, &first.refresh_token),
            Err(SessionError::RefreshRejected(RefreshRejection::Mismatch))
        ));

        f.manager.refresh(device_id, &second.refresh_token).unwrap();
    }

    #[test]
    fn refresh_requires_refresh_token() {
        let f = fixture();
        let device_id = DeviceId::generate();
        let pair = f.manager.login(UserId::generate(), device_id).unwrap();

        assert!(matches!(
            f.manager.refresh(device_id, &pair.access_token),
            Err(SessionError::Auth(AuthError::WrongTokenType { .. }))
        ));
    }

    #[test]
    fn refresh_with_other_device_rejected() {
        let f = fixture();
        let user_id = UserId::generate();
        let pair = f.manager.login(user_id, DeviceId::generate()).unwrap();

        assert!(matches!(
            f.manager.refresh(DeviceId::generate(), &pair.refresh_token),
            Err(SessionError::RefreshRejected(RefreshRejection::Missing))
        ));
    }

    #[test]
    fn rotating_one_device_leaves_others_alone() {
        let f = fixture();
        let user_id = UserId::generate();
        let phone = DeviceId::generate();
        let tablet = DeviceId::generate();

        let phone_pair = f.manager.login(user_id, phone).unwrap();
        let tablet_pair = f.manager.login(user_id, tablet).unwrap();

        f.manager.refresh(phone, &phone_pair.refresh_token).unwrap();

        let tablet_session = f
            .store
            .get_refresh_session(&user_id, &tablet)
            .unwrap()
            .unwrap();
        assert_eq!(tablet_session.token_value, tablet_pair.refresh_token);
        f.manager.refresh(tablet, &tablet_pair.refresh_token).unwrap();
    }

    #[test]
    fn expired_refresh_token_rejected() {
        let f = fixture();
        let device_id = DeviceId::generate();
        let pair = f.manager.login(UserId::generate(), device_id).unwrap();

        f.clock.advance(Duration::days(7));
        assert!(matches!(
            f.manager.refresh(device_id, &pair.refresh_token),
            Err(SessionError::Auth(AuthError::TokenExpired))
        ));
    }

    #[test]
    fn logout_is_idempotent() {
        let f = fixture();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();
        let pair = f.manager.login(user_id, device_id).unwrap();

        f.manager.logout(user_id, device_id).unwrap();
        f.manager.logout(user_id, device_id).unwrap();

        assert!(f.store.get_refresh_session(&user_id, &device_id).unwrap().is_none());
        assert!(matches!(
            f.manager.refresh(device_id, &pair.refresh_token),
            Err(SessionError::RefreshRejected(RefreshRejection::Missing))
        ));
    }

    #[test]
    fn revoke_all_ends_every_device() {
        let f = fixture();
        let user_id = UserId::generate();
        for _ in 0..3 {
            f.manager.login(user_id, DeviceId::generate()).unwrap();
        }

        assert_eq!(f.manager.revoke_all(user_id).unwrap(), 3);
        assert_eq!(f.manager.revoke_all(user_id).unwrap(), 0);
    }

    #[test]
    fn bootstrap_token_replaces_device_session() {
        let f = fixture();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();

        let first = f.manager.login(user_id, device_id).unwrap();
        let boot = f.manager.create_bootstrap_token(user_id, device_id).unwrap();

        assert!(f.manager.find_by_token(&first.refresh_token).unwrap().is_none());
        let session = f.manager.find_by_token(&boot.refresh_token).unwrap().unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.device_id, device_id);
    }

    #[test]
    fn find_by_token_skips_expired() {
        let f = fixture();
        let pair = f.manager.login(UserId::generate(), DeviceId::generate()).unwrap();

        f.clock.advance(Duration::days(7));
        assert!(f.manager.find_by_token(&pair.refresh_token).unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refresh_has_one_winner() {
        let f = fixture();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();
        let pair = f.manager.login(user_id, device_id).unwrap();

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let manager = f.manager.clone();
                let token = pair.refresh_token.clone();
                tokio::task::spawn_blocking(move || manager.refresh(device_id, &token))
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => winners += 1,
                Err(SessionError::RefreshRejected(RefreshRejection::Mismatch)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
    }
}
