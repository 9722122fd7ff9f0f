use crate::aes_gcm::FieldCipher;
use crate::error::CryptoResult;
use serde_json::{Map, Value};
use tracing::warn;

/// Profile attributes that are encrypted before they reach the database.
pub const SENSITIVE_PROFILE_FIELDS: [&str; 9] = [
    "first_name",
    "last_name",
    "date_of_birth",
    "phone",
    "address",
    "medical_record_number",
    "insurance_number",
    "emergency_contact_name",
    "emergency_contact_phone",
];

impl FieldCipher {
    /// Encrypt the named string fields of a JSON object in place.
    ///
    /// Fields that are absent, non-string, or empty are left untouched.
    pub fn encrypt_fields(
        &self,
        data: &mut Map<String, Value>,
        fields: &[&str],
    ) -> CryptoResult<()> {
        for field in fields {
            if let Some(Value::String(plaintext)) = data.get(*field) {
                if plaintext.is_empty() {
                    continue;
                }
                let encrypted = self.encrypt(plaintext)?;
                data.insert((*field).to_string(), Value::String(encrypted));
            }
        }
        Ok(())
    }

    /// Decrypt the named string fields of a JSON object in place.
    ///
    /// A value that fails to decrypt is kept as stored; rows written before
    /// encryption was enabled still hold plaintext.
    pub fn decrypt_fields(&self, data: &mut Map<String, Value>, fields: &[&str]) {
        for field in fields {
            if let Some(Value::String(stored)) = data.get(*field) {
                if stored.is_empty() {
                    continue;
                }
                match self.decrypt(stored) {
                    Ok(plaintext) => {
                        data.insert((*field).to_string(), Value::String(plaintext));
                    }
                    Err(err) => {
                        warn!(field = *field, error = %err, "field left as stored, not decryptable");
                    }
                }
            }
        }
    }

    /// Encrypt the standard sensitive profile attributes.
    pub fn encrypt_profile(&self, data: &mut Map<String, Value>) -> CryptoResult<()> {
        self.encrypt_fields(data, &SENSITIVE_PROFILE_FIELDS)
    }

    /// Decrypt the standard sensitive profile attributes.
    pub fn decrypt_profile(&self, data: &mut Map<String, Value>) {
        self.decrypt_fields(data, &SENSITIVE_PROFILE_FIELDS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_cipher() -> FieldCipher {
        FieldCipher::new(FieldCipher::generate_key()).unwrap()
    }

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_encrypt_decrypt_profile_roundtrip() {
        let cipher = test_cipher();
        let mut data = as_map(json!({
            "first_name": "Grace",
            "last_name": "Hopper",
            "phone": "+1-555-0100",
            "role": "patient"
        }));

        cipher.encrypt_profile(&mut data).unwrap();

        assert!(data["first_name"].as_str().unwrap().starts_with("v1:"));
        assert!(data["phone"].as_str().unwrap().starts_with("v1:"));
        // Non-sensitive fields stay in the clear
        assert_eq!(data["role"], "patient");

        cipher.decrypt_profile(&mut data);

        assert_eq!(data["first_name"], "Grace");
        assert_eq!(data["last_name"], "Hopper");
        assert_eq!(data["phone"], "+1-555-0100");
    }

    #[test]
    fn test_absent_and_empty_fields_skipped() {
        let cipher = test_cipher();
        let mut data = as_map(json!({
            "first_name": "",
            "address": Value::Null
        }));

        cipher.encrypt_profile(&mut data).unwrap();

        assert_eq!(data["first_name"], "");
        assert_eq!(data["address"], Value::Null);
        assert!(!data.contains_key("last_name"));
    }

    #[test]
    fn test_legacy_plaintext_kept_on_decrypt() {
        let cipher = test_cipher();
        let mut data = as_map(json!({
            "first_name": "never encrypted",
            "last_name": cipher.encrypt("Lovelace").unwrap()
        }));

        cipher.decrypt_profile(&mut data);

        assert_eq!(data["first_name"], "never encrypted");
        assert_eq!(data["last_name"], "Lovelace");
    }

    #[test]
    fn test_custom_field_list() {
        let cipher = test_cipher();
        let mut data = as_map(json!({
            "note": "confidential",
            "first_name": "visible"
        }));

        cipher.encrypt_fields(&mut data, &["note"]).unwrap();

        assert!(data["note"].as_str().unwrap().starts_with("v1:"));
        assert_eq!(data["first_name"], "visible");
    }
}
