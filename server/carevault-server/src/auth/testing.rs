//! In-memory implementations of the storage seams
//!
//! Back the auth flows with plain maps so the signup / login / device-trust
//! state machine can be exercised end to end without Postgres or Redis. The
//! fakes mirror the semantics the SQL relies on: unique emails, upserting
//! device registration, newest-first history.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::db::{
    AuditLogStore, AuthRepository, DbResult, DeviceStore, NewAuditLog, PasswordHistoryStore,
    ProfileStore, UserStore,
};
use crate::auth::models::{
    PasswordHistoryEntry, ProfilePayload, TrustedDevice, User, UserProfile, UserRole,
};
use crate::auth::store::KvBackend;
use crate::error::ApiResult;

/// An [`AuthRepository`] backed entirely by in-memory fakes
pub fn memory_repository() -> AuthRepository {
    AuthRepository {
        users: std::sync::Arc::new(MemoryUsers::default()),
        devices: std::sync::Arc::new(MemoryDevices::default()),
        password_history: std::sync::Arc::new(MemoryPasswordHistory::default()),
        profiles: std::sync::Arc::new(MemoryProfiles::default()),
        audit_logs: std::sync::Arc::new(MemoryAuditLog::default()),
    }
}

fn duplicate_key(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("unique constraint violated: {what}"))
}

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn create(
        &self,
        email: &str,
        name: &str,
        hashed_password: &str,
        salt: &str,
        role: UserRole,
        is_verified: bool,
    ) -> DbResult<User> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == email) {
            return Err(duplicate_key("users.email"));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            hashed_password: hashed_password.to_string(),
            salt: salt.to_string(),
            role,
            is_verified,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> DbResult<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.id == user_id).cloned())
    }

    async fn update_account(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        name: Option<&str>,
    ) -> DbResult<User> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(candidate) = email {
            if rows.iter().any(|u| u.email == candidate && u.id != user_id) {
                return Err(duplicate_key("users.email"));
            }
        }
        let user = rows
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        if let Some(candidate) = email {
            if candidate != user.email {
                user.email = candidate.to_string();
                user.is_verified = false;
            }
        }
        if let Some(candidate) = name {
            user.name = candidate.to_string();
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        hashed_password: &str,
        salt: &str,
    ) -> DbResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let user = rows
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.hashed_password = hashed_password.to_string();
        user.salt = salt.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn deactivate(&self, user_id: Uuid) -> DbResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let user = rows
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(sqlx::Error::RowNotFound)?;
        user.is_active = false;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDevices {
    rows: Mutex<Vec<TrustedDevice>>,
}

#[async_trait]
impl DeviceStore for MemoryDevices {
    async fn register(&self, user_id: Uuid, fingerprint_hash: &str) -> DbResult<TrustedDevice> {
        let mut rows = self.rows.lock().unwrap();
        // Same upsert the unique index gives the SQL path
        if let Some(device) = rows
            .iter_mut()
            .find(|d| d.user_id == user_id && d.fingerprint_hash == fingerprint_hash)
        {
            device.last_used_at = Some(Utc::now());
            return Ok(device.clone());
        }
        let device = TrustedDevice {
            id: Uuid::new_v4(),
            user_id,
            fingerprint_hash: fingerprint_hash.to_string(),
            created_at: Utc::now(),
            last_used_at: None,
        };
        rows.push(device.clone());
        Ok(device)
    }

    async fn find_by_fingerprint(
        &self,
        user_id: Uuid,
        fingerprint_hash: &str,
    ) -> DbResult<Option<TrustedDevice>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|d| d.user_id == user_id && d.fingerprint_hash == fingerprint_hash)
            .cloned())
    }

    async fn count_for_user(&self, user_id: Uuid) -> DbResult<i64> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|d| d.user_id == user_id).count() as i64)
    }

    async fn touch(&self, device_id: Uuid) -> DbResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(device) = rows.iter_mut().find(|d| d.id == device_id) {
            device.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> DbResult<Vec<TrustedDevice>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove(&self, user_id: Uuid, device_id: Uuid) -> DbResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|d| !(d.id == device_id && d.user_id == user_id));
        Ok(rows.len() < before)
    }
}

#[derive(Default)]
pub struct MemoryPasswordHistory {
    // Insertion order stands in for created_at, which can tie in tests
    rows: Mutex<Vec<PasswordHistoryEntry>>,
}

#[async_trait]
impl PasswordHistoryStore for MemoryPasswordHistory {
    async fn append(&self, user_id: Uuid, hashed_password: &str, salt: &str) -> DbResult<()> {
        let mut rows = self.rows.lock().unwrap();
        rows.push(PasswordHistoryEntry {
            id: Uuid::new_v4(),
            user_id,
            hashed_password: hashed_password.to_string(),
            salt: salt.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<PasswordHistoryEntry>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryProfiles {
    rows: Mutex<HashMap<Uuid, UserProfile>>,
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn find_by_user(&self, user_id: Uuid) -> DbResult<Option<UserProfile>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&user_id).cloned())
    }

    async fn upsert(&self, user_id: Uuid, payload: &ProfilePayload) -> DbResult<UserProfile> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        let profile = rows.entry(user_id).or_insert_with(|| UserProfile {
            id: Uuid::new_v4(),
            user_id,
            first_name: None,
            last_name: None,
            date_of_birth: None,
            phone: None,
            address: None,
            medical_record_number: None,
            insurance_number: None,
            blood_type: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            profile_picture_url: None,
            created_at: now,
            updated_at: now,
        });

        // COALESCE semantics: absent payload fields keep stored values
        merge(&mut profile.first_name, &payload.first_name);
        merge(&mut profile.last_name, &payload.last_name);
        merge(&mut profile.date_of_birth, &payload.date_of_birth);
        merge(&mut profile.phone, &payload.phone);
        merge(&mut profile.address, &payload.address);
        merge(&mut profile.medical_record_number, &payload.medical_record_number);
        merge(&mut profile.insurance_number, &payload.insurance_number);
        merge(&mut profile.blood_type, &payload.blood_type);
        merge(&mut profile.emergency_contact_name, &payload.emergency_contact_name);
        merge(&mut profile.emergency_contact_phone, &payload.emergency_contact_phone);
        merge(&mut profile.profile_picture_url, &payload.profile_picture_url);
        profile.updated_at = now;

        Ok(profile.clone())
    }
}

fn merge(stored: &mut Option<String>, incoming: &Option<String>) {
    if incoming.is_some() {
        stored.clone_from(incoming);
    }
}

/// Records (action, status) pairs so tests can assert the trail exists
#[derive(Default)]
pub struct MemoryAuditLog {
    pub entries: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl AuditLogStore for MemoryAuditLog {
    async fn insert(&self, entry: NewAuditLog<'_>) -> DbResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.push((entry.action.to_string(), entry.status.to_string()));
        Ok(())
    }
}

/// Expiring key-value fake; TTLs are accepted and ignored, tests drive
/// expiry by deleting keys
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn set_ex(&self, key: String, value: String, _ttl_seconds: u64) -> ApiResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: String) -> ApiResult<Option<String>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&key).cloned())
    }

    async fn del(&self, key: String) -> ApiResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&key);
        Ok(())
    }

    async fn ping(&self) -> ApiResult<()> {
        Ok(())
    }
}
