//! Persistence collaborators.
//!
//! The engine never talks to a network or disk itself. It hands opaque
//! records to these traits. The in-memory implementations back tests and
//! demos; a real deployment implements the traits over its HTTP API.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::record::{
    NewSecretRecord, Page, PageRequest, SecretId, SecretKeyRecord, SecretRecord, SecretSummary,
};

/// Key-value storage for the vault's single secret-key record.
#[async_trait]
pub trait KeyRecordStore: Send + Sync {
    /// Fetch the record, `None` when the vault has no key yet.
    async fn get(&self) -> Result<Option<SecretKeyRecord>>;

    /// Store a new record. Returns [`VaultError::Conflict`] if one exists.
    async fn create(&self, record: SecretKeyRecord) -> Result<()>;
}

/// CRUD storage for secret records.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn create(&self, record: NewSecretRecord) -> Result<SecretId>;

    async fn get_by_id(&self, id: &str) -> Result<Option<SecretRecord>>;

    /// Replace the stored fields. [`VaultError::NotFound`] if absent.
    async fn update(&self, id: &str, record: NewSecretRecord) -> Result<SecretRecord>;

    /// Soft delete.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn list(&self, request: &PageRequest) -> Result<Page<SecretSummary>>;
}

#[async_trait]
impl<T: KeyRecordStore + ?Sized> KeyRecordStore for Arc<T> {
    async fn get(&self) -> Result<Option<SecretKeyRecord>> {
        (**self).get().await
    }

    async fn create(&self, record: SecretKeyRecord) -> Result<()> {
        (**self).create(record).await
    }
}

#[async_trait]
impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    async fn create(&self, record: NewSecretRecord) -> Result<SecretId> {
        (**self).create(record).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SecretRecord>> {
        (**self).get_by_id(id).await
    }

    async fn update(&self, id: &str, record: NewSecretRecord) -> Result<SecretRecord> {
        (**self).update(id, record).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        (**self).delete(id).await
    }

    async fn list(&self, request: &PageRequest) -> Result<Page<SecretSummary>> {
        (**self).list(request).await
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Key record store held in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    record: Mutex<Option<SecretKeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing record, as if fetched from a server.
    pub fn with_record(record: SecretKeyRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

#[async_trait]
impl KeyRecordStore for MemoryKeyStore {
    async fn get(&self) -> Result<Option<SecretKeyRecord>> {
        Ok(self.record.lock().clone())
    }

    async fn create(&self, record: SecretKeyRecord) -> Result<()> {
        let mut slot = self.record.lock();
        if slot.is_some() {
            return Err(VaultError::Conflict);
        }
        *slot = Some(record);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredSecret {
    record: SecretRecord,
    active: bool,
}

/// Secret store held in memory. Ids are random UUIDs.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<SecretId, StoredSecret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, including soft-deleted ones.
    pub fn len(&self) -> usize {
        self.secrets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.lock().is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn create(&self, record: NewSecretRecord) -> Result<SecretId> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let stored = SecretRecord {
            id: id.clone(),
            title: record.title,
            username: record.username,
            cipher_password: record.cipher_password,
            iv: record.iv,
            url: record.url,
            notes: record.notes,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.secrets.lock().insert(
            id.clone(),
            StoredSecret {
                record: stored,
                active: true,
            },
        );
        Ok(id)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SecretRecord>> {
        Ok(self
            .secrets
            .lock()
            .get(id)
            .filter(|s| s.active)
            .map(|s| s.record.clone()))
    }

    async fn update(&self, id: &str, record: NewSecretRecord) -> Result<SecretRecord> {
        let mut secrets = self.secrets.lock();
        let stored = secrets
            .get_mut(id)
            .filter(|s| s.active)
            .ok_or_else(|| VaultError::NotFound(format!("secret {id}")))?;
        let current = &mut stored.record;
        current.title = record.title;
        current.username = record.username;
        current.cipher_password = record.cipher_password;
        current.iv = record.iv;
        current.url = record.url;
        current.notes = record.notes;
        current.updated_at = Some(Utc::now());
        Ok(current.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut secrets = self.secrets.lock();
        let stored = secrets
            .get_mut(id)
            .filter(|s| s.active)
            .ok_or_else(|| VaultError::NotFound(format!("secret {id}")))?;
        stored.active = false;
        Ok(())
    }

    async fn list(&self, request: &PageRequest) -> Result<Page<SecretSummary>> {
        let needle = request.search.as_ref().map(|s| s.to_lowercase());
        let mut matching: Vec<SecretSummary> = self
            .secrets
            .lock()
            .values()
            .filter(|s| s.active)
            .filter(|s| match &needle {
                Some(n) => {
                    s.record.title.to_lowercase().contains(n)
                        || s.record.username.to_lowercase().contains(n)
                }
                None => true,
            })
            .map(|s| SecretSummary::from(&s.record))
            .collect();
        matching.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });

        let total_elements = matching.len();
        let content = matching
            .into_iter()
            .skip(request.page.saturating_mul(request.size))
            .take(request.size)
            .collect();
        Ok(Page {
            content,
            page: request.page,
            size: request.size,
            total_elements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CipherAlgorithm, DerivationAlgorithm, HashAlgorithm};

    fn new_secret(title: &str, username: &str) -> NewSecretRecord {
        NewSecretRecord {
            title: title.to_string(),
            username: username.to_string(),
            cipher_password: "Y2lwaGVy".to_string(),
            iv: "aXY=".to_string(),
            url: None,
            notes: None,
        }
    }

    fn key_record() -> SecretKeyRecord {
        SecretKeyRecord {
            wrapped_key: String::new(),
            wrap_iv: String::new(),
            salt: String::new(),
            salt_size: 16,
            iterations: 100_000,
            algorithm: CipherAlgorithm::AesGcm,
            hash: HashAlgorithm::Sha256,
            derivation_algorithm: DerivationAlgorithm::Pbkdf2,
            key_size: 256,
        }
    }

    #[tokio::test]
    async fn test_key_store_conflict() {
        let store = MemoryKeyStore::new();
        assert!(store.get().await.unwrap().is_none());
        store.create(key_record()).await.unwrap();
        assert!(matches!(store.create(key_record()).await, Err(VaultError::Conflict)));
        assert!(store.get().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_secret_store_crud() {
        let store = MemorySecretStore::new();
        let id = store.create(new_secret("Bank", "alice")).await.unwrap();

        let fetched = store.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Bank");
        assert!(fetched.created_at.is_some());

        let updated = store.update(&id, new_secret("Bank 2", "alice")).await.unwrap();
        assert_eq!(updated.title, "Bank 2");
        assert_eq!(updated.created_at, fetched.created_at);

        store.delete(&id).await.unwrap();
        assert!(store.get_by_id(&id).await.unwrap().is_none());
        assert!(matches!(
            store.update(&id, new_secret("x", "y")).await,
            Err(VaultError::NotFound(_))
        ));
        // Soft delete keeps the row.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_sorts_filters_and_pages() {
        let store = MemorySecretStore::new();
        let rows = [
            ("mail", "bob"),
            ("Bank", "alice"),
            ("cloud", "alice"),
            ("Zoo", "carol"),
        ];
        for (title, user) in rows {
            store.create(new_secret(title, user)).await.unwrap();
        }

        let all = store.list(&PageRequest::default()).await.unwrap();
        let titles: Vec<_> = all.content.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Bank", "cloud", "mail", "Zoo"]);

        let second = store
            .list(&PageRequest {
                page: 1,
                size: 3,
                search: None,
            })
            .await
            .unwrap();
        assert_eq!(second.content.len(), 1);
        assert_eq!(second.total_elements, 4);
        assert_eq!(second.total_pages(), 2);

        let alice = store
            .list(&PageRequest {
                search: Some("ALICE".into()),
                ..PageRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(alice.total_elements, 2);
    }
}
