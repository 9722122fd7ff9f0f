//! User profile repository
//!
//! Stores the profile row as handed to it; encryption of sensitive columns
//! happens in the service layer before the payload reaches this repository.

use super::{DbResult, ProfileStore};
use crate::auth::models::{ProfilePayload, UserProfile};
use async_trait::async_trait;
use sqlx::types::Uuid;
use sqlx::PgPool;

const PROFILE_COLUMNS: &str = "id, user_id, first_name, last_name, date_of_birth, phone, \
     address, medical_record_number, insurance_number, blood_type, \
     emergency_contact_name, emergency_contact_phone, profile_picture_url, \
     created_at, updated_at";

#[derive(Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    async fn find_by_user(&self, user_id: Uuid) -> DbResult<Option<UserProfile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1");
        sqlx::query_as::<_, UserProfile>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Insert or merge-update the caller's profile. Fields absent from the
    /// payload keep their stored values.
    async fn upsert(&self, user_id: Uuid, payload: &ProfilePayload) -> DbResult<UserProfile> {
        let sql = format!(
            "INSERT INTO user_profiles ( \
                 user_id, first_name, last_name, date_of_birth, phone, address, \
                 medical_record_number, insurance_number, blood_type, \
                 emergency_contact_name, emergency_contact_phone, profile_picture_url \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 first_name = COALESCE(EXCLUDED.first_name, user_profiles.first_name), \
                 last_name = COALESCE(EXCLUDED.last_name, user_profiles.last_name), \
                 date_of_birth = COALESCE(EXCLUDED.date_of_birth, user_profiles.date_of_birth), \
                 phone = COALESCE(EXCLUDED.phone, user_profiles.phone), \
                 address = COALESCE(EXCLUDED.address, user_profiles.address), \
                 medical_record_number = COALESCE(EXCLUDED.medical_record_number, user_profiles.medical_record_number), \
                 insurance_number = COALESCE(EXCLUDED.insurance_number, user_profiles.insurance_number), \
                 blood_type = COALESCE(EXCLUDED.blood_type, user_profiles.blood_type), \
                 emergency_contact_name = COALESCE(EXCLUDED.emergency_contact_name, user_profiles.emergency_contact_name), \
                 emergency_contact_phone = COALESCE(EXCLUDED.emergency_contact_phone, user_profiles.emergency_contact_phone), \
                 profile_picture_url = COALESCE(EXCLUDED.profile_picture_url, user_profiles.profile_picture_url), \
                 updated_at = NOW() \
             RETURNING {PROFILE_COLUMNS}"
        );
        sqlx::query_as::<_, UserProfile>(&sql)
            .bind(user_id)
            .bind(payload.first_name.as_deref())
            .bind(payload.last_name.as_deref())
            .bind(payload.date_of_birth.as_deref())
            .bind(payload.phone.as_deref())
            .bind(payload.address.as_deref())
            .bind(payload.medical_record_number.as_deref())
            .bind(payload.insurance_number.as_deref())
            .bind(payload.blood_type.as_deref())
            .bind(payload.emergency_contact_name.as_deref())
            .bind(payload.emergency_contact_phone.as_deref())
            .bind(payload.profile_picture_url.as_deref())
            .fetch_one(&self.pool)
            .await
    }
}
