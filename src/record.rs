//! Persisted records and the caller-facing views built from them.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::{CipherAlgorithm, CryptoConfig, DerivationAlgorithm, HashAlgorithm};

/// Identifier assigned to a secret by the store.
pub type SecretId = String;

/// The vault's wrapped DEK plus everything needed to unwrap it.
///
/// Self-describing: the KDF and cipher parameters travel with the record, so
/// the global default never has to be consulted to unlock an existing vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRecord {
    /// Base64 ciphertext of the DEK.
    pub wrapped_key: String,
    /// Base64 nonce used to wrap the DEK.
    #[serde(rename = "wrapIV")]
    pub wrap_iv: String,
    /// Base64 KDF salt.
    pub salt: String,
    pub salt_size: usize,
    pub iterations: u32,
    pub algorithm: CipherAlgorithm,
    pub hash: HashAlgorithm,
    pub derivation_algorithm: DerivationAlgorithm,
    /// DEK/KEK length in bits.
    pub key_size: u32,
}

impl SecretKeyRecord {
    /// Rebuild the config this record was created with.
    pub fn crypto_config(&self) -> CryptoConfig {
        CryptoConfig {
            algorithm: self.algorithm,
            derivation_algorithm: self.derivation_algorithm,
            length: self.key_size,
            hash: self.hash,
            iterations: self.iterations,
            salt_size: self.salt_size,
        }
    }
}

/// One stored credential. Title, username, url and notes are plaintext so a
/// list view needs no key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub id: SecretId,
    pub title: String,
    pub username: String,
    /// Base64 ciphertext of the password.
    pub cipher_password: String,
    /// Base64 nonce for `cipher_password`.
    pub iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Encrypted payload submitted on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSecretRecord {
    pub title: String,
    pub username: String,
    pub cipher_password: String,
    pub iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Caller input for creating or updating a secret.
#[derive(Debug)]
pub struct SecretFields {
    pub title: String,
    pub username: String,
    pub password: SecretString,
    pub url: Option<String>,
    pub notes: Option<String>,
}

impl SecretFields {
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            url: None,
            notes: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A stored record together with its decrypted password.
///
/// `record` is exactly what the store returned; its ciphertext is untouched.
#[derive(Debug)]
pub struct DecryptedSecret {
    pub record: SecretRecord,
    pub password: SecretString,
}

/// List-view metadata. Carries no ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSummary {
    pub id: SecretId,
    pub title: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&SecretRecord> for SecretSummary {
    fn from(record: &SecretRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            username: record.username.clone(),
            url: record.url.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Which page of the list to return. Results are sorted by title, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: usize,
    pub size: usize,
    /// Case-insensitive substring match on title or username.
    pub search: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: 20,
            search: None,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.total_elements.div_ceil(self.size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_record_wire_names() {
        let record = SecretKeyRecord {
            wrapped_key: "d2s=".into(),
            wrap_iv: "aXY=".into(),
            salt: "c2FsdA==".into(),
            salt_size: 16,
            iterations: 100_000,
            algorithm: CipherAlgorithm::AesGcm,
            hash: HashAlgorithm::Sha256,
            derivation_algorithm: DerivationAlgorithm::Pbkdf2,
            key_size: 256,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["wrapIV"], "aXY=");
        assert_eq!(json["wrappedKey"], "d2s=");
        assert_eq!(json["algorithm"], "AES-GCM");
        assert_eq!(json["hash"], "SHA-256");
        assert_eq!(json["derivationAlgorithm"], "PBKDF2");
        assert_eq!(json["keySize"], 256);

        let back: SecretKeyRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.crypto_config().length, 256);
        assert_eq!(back.crypto_config().salt_size, 16);
    }

    #[test]
    fn test_total_pages() {
        let page: Page<SecretSummary> = Page {
            content: Vec::new(),
            page: 0,
            size: 10,
            total_elements: 21,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
