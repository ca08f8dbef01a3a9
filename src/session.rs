//! Secret-key record lifecycle and the session DEK cache.
//!
//! ```text
//! NoKey --create--> Creating --stored--> HasKey { cached: true }
//!                                          |  ^
//!                         invalidate_cache |  | get_dek
//!                                          v  |
//!                                  HasKey { cached: false }
//! ```
//!
//! The cache holds at most one unwrapped DEK and the passphrase that
//! unlocked it. It lives in this owned manager, never in global state.
//! The lock is only held for field access, never across an `.await`:
//! two concurrent `get_dek` calls may both run the KDF. Derivation is
//! deterministic, so that costs time but never correctness.
//!
//! Every `invalidate_cache` bumps a session epoch. An unlock or creation
//! that started before the bump still returns its result to the caller but
//! never writes it back into the cache, so logout cannot be undone by work
//! that was already in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditRecord, VaultEvent};
use crate::codec;
use crate::config::{CryptoConfig, EngineConfig, EngineLimits};
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::keys::{self, Dek};
use crate::prompt::PassphrasePrompt;
use crate::record::SecretKeyRecord;
use crate::store::KeyRecordStore;

/// Audit log shared between the manager and the record service.
pub type SharedAuditLog = Arc<Mutex<AuditLog>>;

/// Where the vault key is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// No secret-key record exists yet.
    NoKey,
    /// A record is being built by `create_secret_key_record`.
    Creating,
    /// A record exists. `cached` tells whether the DEK is unlocked.
    HasKey { cached: bool },
}

struct CachedDek {
    dek: Arc<Dek>,
    passphrase: SecretString,
}

/// Creates the vault's secret-key record and unlocks its DEK.
pub struct SecretKeyManager<K> {
    store: K,
    default_config: CryptoConfig,
    limits: EngineLimits,
    record: Mutex<Option<SecretKeyRecord>>,
    cache: Mutex<Option<CachedDek>>,
    creating: AtomicBool,
    epoch: AtomicU64,
    kdf_runs: AtomicU64,
    audit: SharedAuditLog,
}

impl<K> std::fmt::Debug for SecretKeyManager<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKeyManager")
            .field("default_config", &self.default_config)
            .field("limits", &self.limits)
            .field("cached", &self.cache.lock().is_some())
            .finish()
    }
}

/// Clears the `creating` flag however creation ends.
struct CreatingGuard<'a>(&'a AtomicBool);

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<K: KeyRecordStore> SecretKeyManager<K> {
    /// Manager with the built-in default config and limits.
    pub fn new(store: K) -> Self {
        Self::with_config(store, &EngineConfig::default())
    }

    /// Manager using the defaults and limits of an [`EngineConfig`].
    pub fn with_config(store: K, config: &EngineConfig) -> Self {
        Self {
            store,
            default_config: config.crypto_config(),
            limits: config.limits.clone(),
            record: Mutex::new(None),
            cache: Mutex::new(None),
            creating: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            kdf_runs: AtomicU64::new(0),
            audit: Arc::new(Mutex::new(AuditLog::new())),
        }
    }

    /// Record events into an existing log instead of a private one.
    pub fn with_audit_log(mut self, audit: SharedAuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit_log(&self) -> SharedAuditLog {
        Arc::clone(&self.audit)
    }

    pub fn default_config(&self) -> &CryptoConfig {
        &self.default_config
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    /// How many key derivations this manager has run.
    pub fn kdf_runs(&self) -> u64 {
        self.kdf_runs.load(Ordering::SeqCst)
    }

    /// Current lifecycle state. Asks the store unless the answer is local.
    pub async fn state(&self) -> Result<KeyState> {
        if self.creating.load(Ordering::SeqCst) {
            return Ok(KeyState::Creating);
        }
        if self.cache.lock().is_some() {
            return Ok(KeyState::HasKey { cached: true });
        }
        let has_record = self.record.lock().is_some();
        if has_record || self.store.get().await?.is_some() {
            return Ok(KeyState::HasKey { cached: false });
        }
        Ok(KeyState::NoKey)
    }

    /// Build and persist a new secret-key record.
    ///
    /// `config` overrides the manager's default for this vault. An existing
    /// record is reported as [`VaultError::Conflict`] and never retried.
    pub async fn create_secret_key_record(
        &self,
        passphrase: &SecretString,
        config: Option<CryptoConfig>,
    ) -> Result<SecretKeyRecord> {
        let config = config.unwrap_or_else(|| self.default_config.clone());
        config.validate(&self.limits)?;

        if self.creating.swap(true, Ordering::SeqCst) {
            return Err(VaultError::Conflict);
        }
        let _guard = CreatingGuard(&self.creating);
        let epoch = self.epoch.load(Ordering::SeqCst);

        if self.store.get().await?.is_some() {
            return Err(VaultError::Conflict);
        }

        let salt = keys::generate_salt(&config)?;
        let kek = keys::derive_key(passphrase, &salt, &config, &self.limits).await?;
        self.kdf_runs.fetch_add(1, Ordering::SeqCst);

        let dek = keys::generate_dek(config.algorithm, config.length)?;
        let wrapped = crypto::wrap(&dek, &kek, config.algorithm, config.iv_size())?;

        let record = SecretKeyRecord {
            wrapped_key: wrapped.cipher_text,
            wrap_iv: wrapped.iv,
            salt: codec::to_base64(&salt),
            salt_size: config.salt_size,
            iterations: config.iterations,
            algorithm: config.algorithm,
            hash: config.hash,
            derivation_algorithm: config.derivation_algorithm,
            key_size: config.length,
        };
        self.store.create(record.clone()).await?;

        self.remember_record(epoch, &record);
        self.remember_dek(epoch, Arc::new(dek), passphrase);
        self.audit.lock().append(AuditRecord::now(VaultEvent::KeyCreated, None));
        info!(
            key_size = config.length,
            iterations = config.iterations,
            hash = %config.hash,
            "secret key record created"
        );
        Ok(record)
    }

    /// Return the DEK for `passphrase`, unwrapping it on a cache miss.
    ///
    /// The cache only answers for the passphrase that filled it. Any other
    /// passphrase goes through the full KDF and unwrap, so a wrong one always
    /// fails with [`VaultError::IncorrectPassphrase`]. That failure also
    /// clears the cache.
    pub async fn get_dek(&self, passphrase: &SecretString) -> Result<Arc<Dek>> {
        if let Some(dek) = self.cached_dek_for(passphrase) {
            debug!("session DEK cache hit");
            return Ok(dek);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let record = self.load_record(epoch).await?;
        let config = record.crypto_config();
        let salt = codec::from_base64(&record.salt)?;
        let kek = keys::derive_key(passphrase, &salt, &config, &self.limits).await?;
        self.kdf_runs.fetch_add(1, Ordering::SeqCst);

        let unwrapped = crypto::unwrap(
            &record.wrapped_key,
            &kek,
            &record.wrap_iv,
            config.algorithm,
            config.length,
        );
        match unwrapped {
            Ok(dek) => {
                let dek = Arc::new(dek);
                self.remember_dek(epoch, Arc::clone(&dek), passphrase);
                self.audit.lock().append(AuditRecord::now(VaultEvent::VaultUnlocked, None));
                debug!("vault DEK unwrapped and cached");
                Ok(dek)
            }
            Err(VaultError::IncorrectPassphrase) => {
                self.cache.lock().take();
                self.audit.lock().append(AuditRecord::now(VaultEvent::UnlockFailed, None));
                warn!("DEK unwrap failed: incorrect passphrase");
                Err(VaultError::IncorrectPassphrase)
            }
            Err(e) => Err(e),
        }
    }

    /// Use the cached DEK if present, otherwise ask `prompt`.
    ///
    /// A cancelled prompt yields `Ok(None)`: no DEK, but not an error.
    pub async fn unlock_with_prompt(
        &self,
        prompt: &dyn PassphrasePrompt,
        purpose: &str,
    ) -> Result<Option<Arc<Dek>>> {
        let cached = self.cache.lock().as_ref().map(|c| Arc::clone(&c.dek));
        if cached.is_some() {
            return Ok(cached);
        }
        match prompt.request(purpose).await? {
            Some(passphrase) => self.get_dek(&passphrase).await.map(Some),
            None => {
                debug!(purpose, "passphrase prompt cancelled");
                Ok(None)
            }
        }
    }

    /// Whether a passphrase is cached for this session.
    pub fn cached_passphrase_available(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// Drop the cached DEK, passphrase and record. Call on logout.
    ///
    /// Unlocks still running when this is called will not refill the cache.
    pub fn invalidate_cache(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let had_dek = self.cache.lock().take().is_some();
        self.record.lock().take();
        if had_dek {
            self.audit.lock().append(AuditRecord::now(VaultEvent::SessionCleared, None));
            debug!("session DEK cache cleared");
        }
    }

    /// Config of the vault's existing record.
    pub async fn crypto_config(&self) -> Result<CryptoConfig> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        Ok(self.load_record(epoch).await?.crypto_config())
    }

    fn cached_dek_for(&self, passphrase: &SecretString) -> Option<Arc<Dek>> {
        let cache = self.cache.lock();
        let cached = cache.as_ref()?;
        let hit = constant_time_eq(
            cached.passphrase.expose_secret().as_bytes(),
            passphrase.expose_secret().as_bytes(),
        );
        hit.then(|| Arc::clone(&cached.dek))
    }

    /// Cache `dek` unless the session was invalidated since `epoch`.
    ///
    /// The epoch is compared under the cache lock. `invalidate_cache` bumps
    /// the epoch before taking that lock, so either the write is skipped or
    /// the invalidation clears it afterwards.
    fn remember_dek(&self, epoch: u64, dek: Arc<Dek>, passphrase: &SecretString) {
        let mut cache = self.cache.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("session invalidated during unlock, DEK not cached");
            return;
        }
        *cache = Some(CachedDek {
            dek,
            passphrase: copy_secret(passphrase),
        });
    }

    fn remember_record(&self, epoch: u64, record: &SecretKeyRecord) {
        let mut slot = self.record.lock();
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *slot = Some(record.clone());
        }
    }

    async fn load_record(&self, epoch: u64) -> Result<SecretKeyRecord> {
        let cached = self.record.lock().clone();
        if let Some(record) = cached {
            return Ok(record);
        }
        let record = self
            .store
            .get()
            .await?
            .ok_or_else(|| VaultError::NotFound("secret key record".to_string()))?;
        self.remember_record(epoch, &record);
        Ok(record)
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CryptoConfigOverrides, EngineLimits};
    use crate::prompt::FixedPassphrasePrompt;
    use crate::store::MemoryKeyStore;

    fn fast_engine() -> EngineConfig {
        EngineConfig {
            limits: EngineLimits {
                min_iterations: 1_000,
                min_salt_size: 16,
            },
            crypto: CryptoConfigOverrides::from(CryptoConfig {
                iterations: 1_000,
                ..CryptoConfig::default()
            }),
        }
    }

    fn pass(p: &str) -> SecretString {
        SecretString::from(p.to_string())
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let manager = SecretKeyManager::with_config(MemoryKeyStore::new(), &fast_engine());
        assert_eq!(manager.state().await.unwrap(), KeyState::NoKey);

        manager.create_secret_key_record(&pass("pw"), None).await.unwrap();
        assert_eq!(manager.state().await.unwrap(), KeyState::HasKey { cached: true });

        manager.invalidate_cache();
        assert_eq!(manager.state().await.unwrap(), KeyState::HasKey { cached: false });
    }

    #[tokio::test]
    async fn test_get_dek_without_record_is_not_found() {
        let manager = SecretKeyManager::with_config(MemoryKeyStore::new(), &fast_engine());
        assert!(matches!(
            manager.get_dek(&pass("pw")).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_kdf() {
        let manager = SecretKeyManager::with_config(MemoryKeyStore::new(), &fast_engine());
        manager.create_secret_key_record(&pass("pw"), None).await.unwrap();
        manager.invalidate_cache();

        let first = manager.get_dek(&pass("pw")).await.unwrap();
        assert_eq!(manager.kdf_runs(), 2);
        let second = manager.get_dek(&pass("pw")).await.unwrap();
        assert_eq!(manager.kdf_runs(), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_wrong_passphrase_clears_cache() {
        let manager = SecretKeyManager::with_config(MemoryKeyStore::new(), &fast_engine());
        manager.create_secret_key_record(&pass("pw"), None).await.unwrap();
        assert!(manager.cached_passphrase_available());

        assert!(matches!(
            manager.get_dek(&pass("nope")).await,
            Err(VaultError::IncorrectPassphrase)
        ));
        assert!(!manager.cached_passphrase_available());
        assert_eq!(manager.audit_log().lock().events(VaultEvent::UnlockFailed).count(), 1);

        manager.get_dek(&pass("pw")).await.unwrap();
        assert!(manager.cached_passphrase_available());
    }

    #[tokio::test]
    async fn test_prompt_cancellation_is_not_an_error() {
        let manager = SecretKeyManager::with_config(MemoryKeyStore::new(), &fast_engine());
        manager.create_secret_key_record(&pass("pw"), None).await.unwrap();
        manager.invalidate_cache();

        let none = manager
            .unlock_with_prompt(&FixedPassphrasePrompt::cancelling(), "view")
            .await
            .unwrap();
        assert!(none.is_none());

        let some = manager
            .unlock_with_prompt(&FixedPassphrasePrompt::answering("pw"), "view")
            .await
            .unwrap();
        assert!(some.is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_derivation() {
        let manager = SecretKeyManager::with_config(MemoryKeyStore::new(), &fast_engine());
        let weak = CryptoConfig {
            iterations: 10,
            ..CryptoConfig::default()
        };
        assert!(matches!(
            manager.create_secret_key_record(&pass("pw"), Some(weak)).await,
            Err(VaultError::Kdf(_))
        ));
        assert_eq!(manager.kdf_runs(), 0);
        assert_eq!(manager.state().await.unwrap(), KeyState::NoKey);
    }

    #[tokio::test]
    async fn test_stale_epoch_does_not_refill_cache() {
        let manager = SecretKeyManager::with_config(MemoryKeyStore::new(), &fast_engine());
        manager.create_secret_key_record(&pass("pw"), None).await.unwrap();
        let dek = manager.get_dek(&pass("pw")).await.unwrap();

        let epoch = manager.epoch.load(Ordering::SeqCst);
        manager.invalidate_cache();
        manager.remember_dek(epoch, dek, &pass("pw"));
        assert!(!manager.cached_passphrase_available());
        assert_eq!(manager.state().await.unwrap(), KeyState::HasKey { cached: false });
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
