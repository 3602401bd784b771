//! OTP challenge issuance and verification.
//!
//! A challenge is generated, persisted, then handed to the SMS sender. The
//! code never leaves this module except through the sender.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::Rng;
use taper_core::{Clock, UserId};
use taper_store::{OtpChallenge, Store, User};

use crate::error::{Result, SessionError};
use crate::sms::SmsSender;
use crate::types::{DeploymentProfile, OtpConfig, OtpStrength};

/// Generate a zero-padded numeric code of `length` digits.
///
/// Every value in `0..10^length` is equally likely.
///
/// # Errors
///
/// Returns `SessionError::Internal` if `length` is zero or too large.
pub fn generate_code(strength: OtpStrength, length: u32) -> Result<String> {
    let upper = 10u64
        .checked_pow(length)
        .filter(|_| length > 0)
        .ok_or_else(|| SessionError::Internal(format!("unsupported OTP length: {length}")))?;

    let value = match strength {
        OtpStrength::Easy => rand::thread_rng().gen_range(0..upper),
        OtpStrength::Strong => OsRng.gen_range(0..upper),
    };

    Ok(format!("{value:0width$}", width = length as usize))
}

/// Issues and verifies OTP challenges.
pub struct OtpManager<S: Store> {
    store: Arc<S>,
    sms: Arc<dyn SmsSender>,
    clock: Arc<dyn Clock>,
    config: OtpConfig,
    profile: DeploymentProfile,
}

impl<S: Store> OtpManager<S> {
    /// Create a new OTP manager.
    ///
    /// A magic code is discarded under the production profile.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        sms: Arc<dyn SmsSender>,
        clock: Arc<dyn Clock>,
        mut config: OtpConfig,
        profile: DeploymentProfile,
    ) -> Self {
        if profile.is_prod() && config.magic_code.take().is_some() {
            tracing::warn!("Magic OTP ignored under the production profile");
        }

        Self {
            store,
            sms,
            clock,
            config,
            profile,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issue a new challenge to `user` and send it by SMS.
    ///
    /// The user's used and expired challenges are pruned first. Outstanding
    /// codes stay valid alongside the new one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if persisting fails, and
    /// `SessionError::Dispatch` if the SMS fails or exceeds the dispatch
    /// timeout. A challenge whose dispatch failed stays persisted.
    pub async fn request_challenge(&self, user: &User) -> Result<()> {
        let now = self.clock.now();

        let pruned = self.store.delete_expired_otps(&user.user_id, now)?;
        if pruned > 0 {
            tracing::debug!(user_id = %user.user_id, pruned, "Pruned stale OTP challenges");
        }

        let ttl = i64::try_from(self.config.ttl_seconds)
            .map_err(|_| SessionError::Internal("OTP TTL out of range".to_string()))?;
        let challenge = OtpChallenge {
            user_id: user.user_id,
            code: generate_code(self.config.strength, self.config.code_length)?,
            expires_at: now + chrono::Duration::seconds(ttl),
            used: false,
            created_at: now,
        };
        self.store.put_otp(&challenge)?;

        let timeout = Duration::from_secs(self.config.dispatch_timeout_seconds);
        let dispatch = self
            .sms
            .send_otp(&user.user_id, &user.mobile, &challenge.code);

        match tokio::time::timeout(timeout, dispatch).await {
            Ok(Ok(())) => {
                tracing::info!(
                    user_id = %user.user_id,
                    expires_at = %challenge.expires_at,
                    "OTP challenge issued"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(user_id = %user.user_id, error = %e, "OTP dispatch failed");
                Err(e)
            }
            Err(_) => {
                tracing::error!(
                    user_id = %user.user_id,
                    timeout_secs = self.config.dispatch_timeout_seconds,
                    "OTP dispatch timed out"
                );
                Err(SessionError::Dispatch("timed out".to_string()))
            }
        }
    }

    /// Verify `code` for `user_id`, consuming the challenge on success.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidOtp` if no matching, unused, unexpired
    /// challenge exists, and `SessionError::Store` on storage failure.
    pub fn verify_challenge(&self, user_id: &UserId, code: &str) -> Result<()> {
        if let Some(magic) = self.magic_code() {
            if code == magic {
                tracing::warn!(user_id = %user_id, profile = %self.profile, "Magic OTP accepted");
                return Ok(());
            }
        }

        if self.store.consume_otp(user_id, code, self.clock.now())? {
            tracing::debug!(user_id = %user_id, "OTP challenge consumed");
            Ok(())
        } else {
            tracing::debug!(user_id = %user_id, "OTP rejected");
            Err(SessionError::InvalidOtp)
        }
    }

    fn magic_code(&self) -> Option<&str> {
        if self.profile.is_prod() {
            return None;
        }
        self.config.magic_code.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::RecordingSmsSender;
    use async_trait::async_trait;
    use chrono::Utc;
    use taper_core::ManualClock;
    use taper_store::{RocksStore, UserStatus};
    use tempfile::TempDir;

    struct Fixture {
        manager: OtpManager<RocksStore>,
        store: Arc<RocksStore>,
        sms: Arc<RecordingSmsSender>,
        clock: Arc<ManualClock>,
        user: User,
        _dir: TempDir,
    }

    fn fixture(config: OtpConfig, profile: DeploymentProfile) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let sms = Arc::new(RecordingSmsSender::new());
        let clock = Arc::new(ManualClock::new());

        let user = User {
            user_id: UserId::generate(),
            name: "Ada".to_string(),
            mobile: "+15550001111".to_string(),
            email: None,
            avatar_url: None,
            status: UserStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.put_user(&user).unwrap();

        let manager = OtpManager::new(store.clone(), sms.clone(), clock.clone(), config, profile);
        Fixture {
            manager,
            store,
            sms,
            clock,
            user,
            _dir: dir,
        }
    }

    #[test]
    fn generated_codes_have_fixed_width() {
        for strength in [OtpStrength::Easy, OtpStrength::Strong] {
            for length in [4, 6, 10] {
                let code = generate_code(strength, length).unwrap();
                assert_eq!(code.len(), length as usize);
                assert!(code.chars().all(|c| c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn generate_code_rejects_bad_length() {
        assert!(generate_code(OtpStrength::Easy, 0).is_err());
        assert!(generate_code(OtpStrength::Easy, 20).is_err());
    }

    #[tokio::test]
    async fn challenge_verifies_exactly_once() {
        let f = fixture(OtpConfig::default(), DeploymentProfile::Dev);

        f.manager.request_challenge(&f.user).await.unwrap();
        let code = f.sms.last_code_for(&f.user.mobile).unwrap();
        assert_eq!(code.len(), 6);

        f.manager.verify_challenge(&f.user.user_id, &code).unwrap();
        assert!(matches!(
            f.manager.verify_challenge(&f.user.user_id, &code),
            Err(SessionError::InvalidOtp)
        ));
    }

    #[tokio::test]
    async fn wrong_code_rejected() {
        let f = fixture(OtpConfig::default(), DeploymentProfile::Dev);
        f.manager.request_challenge(&f.user).await.unwrap();
        let code = f.sms.last_code_for(&f.user.mobile).unwrap();

        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(matches!(
            f.manager.verify_challenge(&f.user.user_id, wrong),
            Err(SessionError::InvalidOtp)
        ));

        // The real code is unaffected by the failed attempt
        f.manager.verify_challenge(&f.user.user_id, &code).unwrap();
    }

    #[tokio::test]
    async fn expired_code_rejected() {
        let f = fixture(OtpConfig::default(), DeploymentProfile::Dev);
        f.manager.request_challenge(&f.user).await.unwrap();
        let code = f.sms.last_code_for(&f.user.mobile).unwrap();

        f.clock.advance(chrono::Duration::seconds(300));
        assert!(matches!(
            f.manager.verify_challenge(&f.user.user_id, &code),
            Err(SessionError::InvalidOtp)
        ));
    }

    #[tokio::test]
    async fn earlier_codes_stay_valid() {
        let f = fixture(OtpConfig::default(), DeploymentProfile::Dev);

        f.manager.request_challenge(&f.user).await.unwrap();
        let first = f.sms.last_code_for(&f.user.mobile).unwrap();
        f.manager.request_challenge(&f.user).await.unwrap();

        f.manager.verify_challenge(&f.user.user_id, &first).unwrap();
    }

    #[tokio::test]
    async fn request_prunes_stale_challenges() {
        let f = fixture(OtpConfig::default(), DeploymentProfile::Dev);

        f.manager.request_challenge(&f.user).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(10));
        f.manager.request_challenge(&f.user).await.unwrap();

        let otps = f.store.list_otps(&f.user.user_id).unwrap();
        assert_eq!(otps.len(), 1);
        assert!(otps[0].is_acceptable(f.clock.now()));
    }

    #[tokio::test]
    async fn dispatch_failure_reported_and_challenge_kept() {
        let f = fixture(OtpConfig::default(), DeploymentProfile::Dev);
        f.sms.set_failing(true);

        let result = f.manager.request_challenge(&f.user).await;
        assert!(matches!(result, Err(SessionError::Dispatch(_))));
        assert_eq!(f.store.list_otps(&f.user.user_id).unwrap().len(), 1);
    }

    struct StalledSender;

    #[async_trait]
    impl SmsSender for StalledSender {
        async fn send_otp(&self, _: &UserId, _: &str, _: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_timeout_reported() {
        let f = fixture(OtpConfig::default(), DeploymentProfile::Dev);
        let manager = OtpManager::new(
            f.store.clone(),
            Arc::new(StalledSender),
            f.clock.clone(),
            OtpConfig::default(),
            DeploymentProfile::Dev,
        );

        let result = manager.request_challenge(&f.user).await;
        assert!(matches!(result, Err(SessionError::Dispatch(_))));
    }

    #[tokio::test]
    async fn magic_code_accepted_outside_prod() {
        let config = OtpConfig {
            magic_code: Some("999999".to_string()),
            ..OtpConfig::default()
        };
        let f = fixture(config, DeploymentProfile::Staging);

        f.manager.verify_challenge(&f.user.user_id, "999999").unwrap();
        // Not single-use
        f.manager.verify_challenge(&f.user.user_id, "999999").unwrap();
    }

    #[tokio::test]
    async fn magic_code_ignored_in_prod() {
        let config = OtpConfig {
            magic_code: Some("999999".to_string()),
            ..OtpConfig::default()
        };
        let f = fixture(config, DeploymentProfile::Prod);

        assert!(f.manager.config().magic_code.is_none());
        assert!(matches!(
            f.manager.verify_challenge(&f.user.user_id, "999999"),
            Err(SessionError::InvalidOtp)
        ));
    }
}
