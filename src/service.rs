//! Create, read, update, list and delete secrets.
//!
//! Only the password is encrypted. Title, username, url and notes stay
//! plaintext so the list view works without the DEK.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::audit::{AuditRecord, VaultEvent};
use crate::config::CryptoConfig;
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::keys::Dek;
use crate::prompt::PassphrasePrompt;
use crate::record::{
    DecryptedSecret, NewSecretRecord, Page, PageRequest, SecretFields, SecretId, SecretRecord,
    SecretSummary,
};
use crate::session::{SecretKeyManager, SharedAuditLog};
use crate::store::{KeyRecordStore, SecretStore};

/// Encrypts secrets on the way to the store and decrypts them on the way back.
pub struct VaultService<K, S> {
    keys: SecretKeyManager<K>,
    secrets: S,
}

impl<K, S> std::fmt::Debug for VaultService<K, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService").field("keys", &self.keys).finish()
    }
}

impl<K: KeyRecordStore, S: SecretStore> VaultService<K, S> {
    pub fn new(keys: SecretKeyManager<K>, secrets: S) -> Self {
        Self { keys, secrets }
    }

    /// The session's key manager, for vault setup and unlock.
    pub fn keys(&self) -> &SecretKeyManager<K> {
        &self.keys
    }

    pub fn audit_log(&self) -> SharedAuditLog {
        self.keys.audit_log()
    }

    /// Encrypt the password and store a new secret.
    pub async fn create(
        &self,
        fields: SecretFields,
        passphrase: &SecretString,
    ) -> Result<SecretId> {
        let dek = self.keys.get_dek(passphrase).await?;
        let config = self.keys.crypto_config().await?;
        let payload = seal_fields(fields, &dek, &config)?;

        let id = self.secrets.create(payload).await?;
        self.audit(VaultEvent::SecretCreated, &id);
        info!(secret_id = %id, "secret created");
        Ok(id)
    }

    /// Fetch a secret and decrypt its password.
    ///
    /// [`VaultError::NotFound`] for an unknown id, and
    /// [`VaultError::IncorrectPassphrase`] when the passphrase is wrong.
    pub async fn get_by_id(&self, id: &str, passphrase: &SecretString) -> Result<DecryptedSecret> {
        let record = self.fetch(id).await?;
        let dek = self.keys.get_dek(passphrase).await?;
        self.open_record(record, &dek).await
    }

    /// Like [`get_by_id`](Self::get_by_id), asking `prompt` only when no
    /// passphrase is cached. A cancelled prompt yields `Ok(None)`.
    pub async fn get_by_id_with_prompt(
        &self,
        id: &str,
        prompt: &dyn PassphrasePrompt,
    ) -> Result<Option<DecryptedSecret>> {
        let record = self.fetch(id).await?;
        match self.keys.unlock_with_prompt(prompt, "view the password").await? {
            Some(dek) => self.open_record(record, &dek).await.map(Some),
            None => Ok(None),
        }
    }

    /// Replace a secret's fields.
    ///
    /// The password is re-encrypted under a fresh nonce on every update, even
    /// when it has not changed.
    pub async fn update(
        &self,
        id: &str,
        fields: SecretFields,
        passphrase: &SecretString,
    ) -> Result<SecretRecord> {
        let dek = self.keys.get_dek(passphrase).await?;
        let config = self.keys.crypto_config().await?;
        let payload = seal_fields(fields, &dek, &config)?;

        let updated = self.secrets.update(id, payload).await?;
        self.audit(VaultEvent::SecretUpdated, id);
        info!(secret_id = %id, "secret updated");
        Ok(updated)
    }

    /// List metadata. Needs no passphrase.
    pub async fn list(&self, request: &PageRequest) -> Result<Page<SecretSummary>> {
        self.secrets.list(request).await
    }

    /// Soft-delete a secret.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.secrets.delete(id).await?;
        self.audit(VaultEvent::SecretDeleted, id);
        info!(secret_id = %id, "secret deleted");
        Ok(())
    }

    /// Forget the session's DEK and passphrase.
    pub fn logout(&self) {
        self.keys.invalidate_cache();
    }

    async fn fetch(&self, id: &str) -> Result<SecretRecord> {
        self.secrets
            .get_by_id(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("secret {id}")))
    }

    async fn open_record(&self, record: SecretRecord, dek: &Arc<Dek>) -> Result<DecryptedSecret> {
        let config = self.keys.crypto_config().await?;
        let password = crypto::decrypt(&record.cipher_password, dek, &record.iv, config.algorithm)?;
        self.audit(VaultEvent::SecretViewed, &record.id);
        debug!(secret_id = %record.id, "secret decrypted");
        Ok(DecryptedSecret {
            record,
            password: SecretString::from(password),
        })
    }

    fn audit(&self, event: VaultEvent, id: &str) {
        self.keys
            .audit_log()
            .lock()
            .append(AuditRecord::now(event, Some(id)));
    }
}

fn seal_fields(fields: SecretFields, dek: &Dek, config: &CryptoConfig) -> Result<NewSecretRecord> {
    let sealed = crypto::encrypt(
        fields.password.expose_secret(),
        dek,
        config.algorithm,
        config.iv_size(),
    )?;
    Ok(NewSecretRecord {
        title: fields.title,
        username: fields.username,
        cipher_password: sealed.cipher_text,
        iv: sealed.iv,
        url: fields.url,
        notes: fields.notes,
    })
}
