//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//!
//! Every operation that reads a record and writes depending on what it read
//! holds `write_lock` for the whole read, check, and `WriteBatch`. Plain
//! reads take no lock.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use taper_core::{DeviceId, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::{OtpChallenge, RefreshSession, RotationOutcome, User};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read and decode a single record.
    fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect every entry of a column family whose key starts with `prefix`.
    fn scan_prefix(&self, name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, rocksdb::Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(prefix) {
                break;
            }

            entries.push((key, value));
        }

        Ok(entries)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // OTP Operations
    // =========================================================================

    fn put_otp(&self, otp: &OtpChallenge) -> Result<()> {
        let cf = self.cf(cf::OTPS)?;
        let key = keys::otp_key(&otp.user_id, &otp.code);
        let value = Self::serialize(otp)?;

        let _guard = self.write_lock.lock();
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn consume_otp(&self, user_id: &UserId, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let cf = self.cf(cf::OTPS)?;
        let key = keys::otp_key(user_id, code);

        let _guard = self.write_lock.lock();

        let Some(mut otp) = self.get_value::<OtpChallenge>(cf::OTPS, &key)? else {
            return Ok(false);
        };
        if !otp.is_acceptable(now) {
            return Ok(false);
        }

        otp.used = true;
        self.db
            .put_cf(&cf, &key, Self::serialize(&otp)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    fn list_otps(&self, user_id: &UserId) -> Result<Vec<OtpChallenge>> {
        self.scan_prefix(cf::OTPS, &keys::user_prefix(user_id))?
            .into_iter()
            .map(|(_, value)| Self::deserialize(&value))
            .collect()
    }

    fn delete_expired_otps(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<usize> {
        let cf = self.cf(cf::OTPS)?;

        let _guard = self.write_lock.lock();

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for (key, value) in self.scan_prefix(cf::OTPS, &keys::user_prefix(user_id))? {
            let otp: OtpChallenge = Self::deserialize(&value)?;
            if !otp.is_acceptable(now) {
                batch.delete_cf(&cf, &key);
                removed += 1;
            }
        }

        if removed > 0 {
            self.write(batch)?;
        }

        Ok(removed)
    }

    // =========================================================================
    // Refresh Session Operations
    // =========================================================================

    fn put_refresh_session(&self, session: &RefreshSession) -> Result<()> {
        let cf_sessions = self.cf(cf::REFRESH_SESSIONS)?;
        let cf_by_token = self.cf(cf::REFRESH_BY_TOKEN)?;

        let session_key = keys::refresh_session_key(&session.user_id, &session.device_id);
        let value = Self::serialize(session)?;

        let _guard = self.write_lock.lock();

        let old = self.get_value::<RefreshSession>(cf::REFRESH_SESSIONS, &session_key)?;

        let mut batch = WriteBatch::default();
        if let Some(old) = old {
            batch.delete_cf(&cf_by_token, keys::refresh_token_key(&old.token_value));
        }
        batch.put_cf(&cf_sessions, &session_key, &value);
        batch.put_cf(
            &cf_by_token,
            keys::refresh_token_key(&session.token_value),
            &session_key,
        );

        self.write(batch)
    }

    fn get_refresh_session(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
    ) -> Result<Option<RefreshSession>> {
        let key = keys::refresh_session_key(user_id, device_id);
        self.get_value(cf::REFRESH_SESSIONS, &key)
    }

    fn delete_refresh_session(&self, user_id: &UserId, device_id: &DeviceId) -> Result<bool> {
        let cf_sessions = self.cf(cf::REFRESH_SESSIONS)?;
        let cf_by_token = self.cf(cf::REFRESH_BY_TOKEN)?;
        let session_key = keys::refresh_session_key(user_id, device_id);

        let _guard = self.write_lock.lock();

        let Some(session) = self.get_value::<RefreshSession>(cf::REFRESH_SESSIONS, &session_key)?
        else {
            return Ok(false);
        };

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_sessions, &session_key);
        batch.delete_cf(&cf_by_token, keys::refresh_token_key(&session.token_value));
        self.write(batch)?;

        Ok(true)
    }

    fn delete_user_sessions(&self, user_id: &UserId) -> Result<usize> {
        let cf_sessions = self.cf(cf::REFRESH_SESSIONS)?;
        let cf_by_token = self.cf(cf::REFRESH_BY_TOKEN)?;

        let _guard = self.write_lock.lock();

        let entries = self.scan_prefix(cf::REFRESH_SESSIONS, &keys::user_prefix(user_id))?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::default();
        for (key, value) in &entries {
            let session: RefreshSession = Self::deserialize(value)?;
            batch.delete_cf(&cf_sessions, key);
            batch.delete_cf(&cf_by_token, keys::refresh_token_key(&session.token_value));
        }
        self.write(batch)?;

        Ok(entries.len())
    }

    fn find_refresh_session_by_token(&self, token: &str) -> Result<Option<RefreshSession>> {
        let cf_by_token = self.cf(cf::REFRESH_BY_TOKEN)?;

        let Some(session_key) = self
            .db
            .get_cf(&cf_by_token, keys::refresh_token_key(token))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        // The index is updated in the same batch as the session, but a rotation
        // can land between the two reads.
        Ok(self
            .get_value::<RefreshSession>(cf::REFRESH_SESSIONS, &session_key)?
            .filter(|session| session.token_matches(token)))
    }

    fn rotate_refresh_session(
        &self,
        expected_token: &str,
        replacement: &RefreshSession,
        now: DateTime<Utc>,
    ) -> Result<RotationOutcome> {
        let cf_sessions = self.cf(cf::REFRESH_SESSIONS)?;
        let cf_by_token = self.cf(cf::REFRESH_BY_TOKEN)?;

        let session_key = keys::refresh_session_key(&replacement.user_id, &replacement.device_id);
        let value = Self::serialize(replacement)?;

        let _guard = self.write_lock.lock();

        let Some(current) = self.get_value::<RefreshSession>(cf::REFRESH_SESSIONS, &session_key)?
        else {
            return Ok(RotationOutcome::Missing);
        };
        if !current.token_matches(expected_token) {
            return Ok(RotationOutcome::Mismatch);
        }
        if current.is_expired(now) {
            return Ok(RotationOutcome::Expired);
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_by_token, keys::refresh_token_key(&current.token_value));
        batch.put_cf(&cf_sessions, &session_key, &value);
        batch.put_cf(
            &cf_by_token,
            keys::refresh_token_key(&replacement.token_value),
            &session_key,
        );
        self.write(batch)?;

        tracing::debug!(
            user_id = %replacement.user_id,
            device_id = %replacement.device_id,
            "Refresh session rotated"
        );

        Ok(RotationOutcome::Rotated)
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    fn put_user(&self, user: &User) -> Result<()> {
        let cf_users = self.cf(cf::USERS)?;
        let cf_by_mobile = self.cf(cf::USERS_BY_MOBILE)?;

        let user_key = keys::user_key(&user.user_id);
        let mobile_key = keys::mobile_key(&user.mobile);
        let value = Self::serialize(user)?;

        let _guard = self.write_lock.lock();

        let owner = self
            .db
            .get_cf(&cf_by_mobile, &mobile_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .and_then(|v| keys::decode_user_id(&v));
        if owner.is_some_and(|owner| owner != user.user_id) {
            return Err(StoreError::Conflict(format!(
                "mobile already registered: {}",
                user.mobile
            )));
        }

        let old = self.get_value::<User>(cf::USERS, &user_key)?;

        let mut batch = WriteBatch::default();
        if let Some(old) = old {
            if old.mobile != user.mobile {
                batch.delete_cf(&cf_by_mobile, keys::mobile_key(&old.mobile));
            }
        }
        batch.put_cf(&cf_users, &user_key, &value);
        batch.put_cf(&cf_by_mobile, &mobile_key, user.user_id.as_bytes());

        self.write(batch)
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.get_value(cf::USERS, &keys::user_key(user_id))
    }

    fn get_user_by_mobile(&self, mobile: &str) -> Result<Option<User>> {
        let cf_by_mobile = self.cf(cf::USERS_BY_MOBILE)?;

        let user_id = self
            .db
            .get_cf(&cf_by_mobile, keys::mobile_key(mobile))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .and_then(|v| keys::decode_user_id(&v));

        match user_id {
            Some(user_id) => self.get_user(&user_id),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserStatus;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_user(mobile: &str) -> User {
        User {
            user_id: UserId::generate(),
            name: "Test User".to_string(),
            mobile: mobile.to_string(),
            email: None,
            avatar_url: None,
            status: UserStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn create_test_otp(user_id: UserId, code: &str, now: DateTime<Utc>) -> OtpChallenge {
        OtpChallenge {
            user_id,
            code: code.to_string(),
            expires_at: now + Duration::minutes(5),
            used: false,
            created_at: now,
        }
    }

    fn create_test_session(
        user_id: UserId,
        device_id: DeviceId,
        token: &str,
        now: DateTime<Utc>,
    ) -> RefreshSession {
        RefreshSession {
            user_id,
            device_id,
            token_value: token.to_string(),
            expires_at: now + Duration::days(7),
            updated_at: now,
        }
    }

    #[test]
    fn otp_consumed_exactly_once() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let now = Utc::now();

        store.put_otp(&create_test_otp(user_id, "482913", now)).unwrap();

        assert!(store.consume_otp(&user_id, "482913", now).unwrap());
        assert!(!store.consume_otp(&user_id, "482913", now).unwrap());

        let otps = store.list_otps(&user_id).unwrap();
        assert_eq!(otps.len(), 1);
        assert!(otps[0].used);
    }

    #[test]
    fn otp_rejected_when_wrong_or_expired() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let now = Utc::now();

        let otp = create_test_otp(user_id, "111111", now);
        store.put_otp(&otp).unwrap();

        assert!(!store.consume_otp(&user_id, "222222", now).unwrap());
        assert!(!store.consume_otp(&UserId::generate(), "111111", now).unwrap());
        assert!(!store.consume_otp(&user_id, "111111", otp.expires_at).unwrap());

        // Still unused after the failed attempts
        assert!(store
            .consume_otp(&user_id, "111111", otp.expires_at - Duration::seconds(1))
            .unwrap());
    }

    #[test]
    fn multiple_outstanding_otps_coexist() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let now = Utc::now();

        store.put_otp(&create_test_otp(user_id, "100001", now)).unwrap();
        store.put_otp(&create_test_otp(user_id, "100002", now)).unwrap();

        assert!(store.consume_otp(&user_id, "100002", now).unwrap());
        assert!(store.consume_otp(&user_id, "100001", now).unwrap());
    }

    #[test]
    fn delete_expired_otps_keeps_live_ones() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let other_user = UserId::generate();
        let now = Utc::now();

        let mut stale = create_test_otp(user_id, "000001", now - Duration::minutes(10));
        stale.expires_at = now - Duration::minutes(5);
        store.put_otp(&stale).unwrap();
        store.put_otp(&create_test_otp(user_id, "000002", now)).unwrap();
        store.put_otp(&create_test_otp(user_id, "000003", now)).unwrap();
        store.consume_otp(&user_id, "000003", now).unwrap();
        store.put_otp(&create_test_otp(other_user, "000004", now)).unwrap();

        assert_eq!(store.delete_expired_otps(&user_id, now).unwrap(), 2);

        let remaining = store.list_otps(&user_id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].code, "000002");
        assert_eq!(store.list_otps(&other_user).unwrap().len(), 1);
    }

    #[test]
    fn refresh_session_crud() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();
        let now = Utc::now();

        let session = create_test_session(user_id, device_id, "token-1", now);
        store.put_refresh_session(&session).unwrap();

        let retrieved = store.get_refresh_session(&user_id, &device_id).unwrap();
        assert_eq!(retrieved, Some(session.clone()));

        let found = store.find_refresh_session_by_token("token-1").unwrap();
        assert_eq!(found, Some(session));

        assert!(store.delete_refresh_session(&user_id, &device_id).unwrap());
        assert!(!store.delete_refresh_session(&user_id, &device_id).unwrap());
        assert!(store.get_refresh_session(&user_id, &device_id).unwrap().is_none());
        assert!(store.find_refresh_session_by_token("token-1").unwrap().is_none());
    }

    #[test]
    fn put_refresh_session_replaces_token_index() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();
        let now = Utc::now();

        store
            .put_refresh_session(&create_test_session(user_id, device_id, "old", now))
            .unwrap();
        store
            .put_refresh_session(&create_test_session(user_id, device_id, "new", now))
            .unwrap();

        assert!(store.find_refresh_session_by_token("old").unwrap().is_none());
        assert!(store.find_refresh_session_by_token("new").unwrap().is_some());
    }

    #[test]
    fn rotate_outcomes() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();
        let now = Utc::now();

        let replacement = create_test_session(user_id, device_id, "t2", now);
        assert_eq!(
            store.rotate_refresh_session("t1", &replacement, now).unwrap(),
            RotationOutcome::Missing
        );

        let original = create_test_session(user_id, device_id, "t1", now);
        store.put_refresh_session(&original).unwrap();

        assert_eq!(
            store
                .rotate_refresh_session("other", &replacement, now)
                .unwrap(),
            RotationOutcome::Mismatch
        );
        assert_eq!(
            store
                .rotate_refresh_session("t1", &replacement, original.expires_at)
                .unwrap(),
            RotationOutcome::Expired
        );
        // Failed rotations leave the session untouched
        assert_eq!(
            store.get_refresh_session(&user_id, &device_id).unwrap(),
            Some(original)
        );

        assert_eq!(
            store.rotate_refresh_session("t1", &replacement, now).unwrap(),
            RotationOutcome::Rotated
        );
        assert_eq!(
            store.rotate_refresh_session("t1", &replacement, now).unwrap(),
            RotationOutcome::Mismatch
        );
        assert!(store.find_refresh_session_by_token("t1").unwrap().is_none());
        assert_eq!(
            store.find_refresh_session_by_token("t2").unwrap(),
            Some(replacement)
        );
    }

    #[test]
    fn rotation_does_not_touch_other_devices() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let phone = DeviceId::generate();
        let tablet = DeviceId::generate();
        let now = Utc::now();

        let tablet_session = create_test_session(user_id, tablet, "tablet-1", now);
        store
            .put_refresh_session(&create_test_session(user_id, phone, "phone-1", now))
            .unwrap();
        store.put_refresh_session(&tablet_session).unwrap();

        let outcome = store
            .rotate_refresh_session(
                "phone-1",
                &create_test_session(user_id, phone, "phone-2", now),
                now,
            )
            .unwrap();
        assert_eq!(outcome, RotationOutcome::Rotated);

        assert_eq!(
            store.get_refresh_session(&user_id, &tablet).unwrap(),
            Some(tablet_session)
        );
    }

    #[test]
    fn concurrent_rotation_has_one_winner() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let user_id = UserId::generate();
        let device_id = DeviceId::generate();
        let now = Utc::now();

        store
            .put_refresh_session(&create_test_session(user_id, device_id, "shared", now))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let replacement =
                        create_test_session(user_id, device_id, &format!("next-{i}"), now);
                    store
                        .rotate_refresh_session("shared", &replacement, now)
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes
            .iter()
            .filter(|o| **o == RotationOutcome::Rotated)
            .count();
        assert_eq!(winners, 1);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, RotationOutcome::Rotated | RotationOutcome::Mismatch)));
    }

    #[test]
    fn delete_user_sessions_removes_all_devices() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let other_user = UserId::generate();
        let now = Utc::now();

        for i in 0..3 {
            store
                .put_refresh_session(&create_test_session(
                    user_id,
                    DeviceId::generate(),
                    &format!("token-{i}"),
                    now,
                ))
                .unwrap();
        }
        let other_device = DeviceId::generate();
        store
            .put_refresh_session(&create_test_session(other_user, other_device, "other", now))
            .unwrap();

        assert_eq!(store.delete_user_sessions(&user_id).unwrap(), 3);
        assert_eq!(store.delete_user_sessions(&user_id).unwrap(), 0);
        assert!(store.find_refresh_session_by_token("token-0").unwrap().is_none());
        assert!(store
            .get_refresh_session(&other_user, &other_device)
            .unwrap()
            .is_some());
    }

    #[test]
    fn user_crud() {
        let (store, _dir) = create_test_store();
        let user = create_test_user("+15550001111");

        // Create
        store.put_user(&user).unwrap();

        // Read
        let retrieved = store.get_user(&user.user_id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Test User");
        let by_mobile = store.get_user_by_mobile("+15550001111").unwrap().unwrap();
        assert_eq!(by_mobile.user_id, user.user_id);

        // Non-existent user
        assert!(store.get_user(&UserId::generate()).unwrap().is_none());
        assert!(store.get_user_by_mobile("+15559999999").unwrap().is_none());
    }

    #[test]
    fn changing_mobile_moves_index() {
        let (store, _dir) = create_test_store();
        let mut user = create_test_user("+15550001111");
        store.put_user(&user).unwrap();

        user.mobile = "+15550002222".to_string();
        store.put_user(&user).unwrap();

        assert!(store.get_user_by_mobile("+15550001111").unwrap().is_none());
        assert_eq!(
            store
                .get_user_by_mobile("+15550002222")
                .unwrap()
                .map(|u| u.user_id),
            Some(user.user_id)
        );
    }

    #[test]
    fn duplicate_mobile_rejected() {
        let (store, _dir) = create_test_store();
        store.put_user(&create_test_user("+15550001111")).unwrap();

        let result = store.put_user(&create_test_user("+15550001111"));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }
}
