//! # zkvault
//!
//! Client-side zero-knowledge envelope encryption for secret vaults.
//!
//! A key-encryption key (KEK) is derived from the user's passphrase and used
//! only to wrap a random data-encryption key (DEK). The DEK encrypts the
//! individual secrets. The server stores the wrapped DEK and the ciphertexts
//! and never sees a passphrase, a key or a plaintext.
//!
//! A wrong passphrase is detected by the AEAD tag check when the DEK is
//! unwrapped. No other verifier is stored.
//!
//! ## Public API
//!
//! - [`SecretKeyManager`]: creates the vault key record and caches the
//!   unlocked DEK for the session.
//! - [`VaultService`]: creates, reads, updates, lists and deletes secrets.
//! - [`store`] and [`prompt`]: the collaborator traits the caller implements.
//! - [`keys`] and [`crypto`]: the primitives, for callers composing their
//!   own flow.
//! - [`generator`]: random passwords for new credentials.

pub mod audit;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod generator;
pub mod keys;
pub mod prompt;
pub mod record;
pub mod service;
pub mod session;
pub mod store;

pub use config::{CryptoConfig, EngineConfig, EngineLimits};
pub use error::{ErrorKind, Result, VaultError};
pub use keys::{Dek, Kek};
pub use record::{DecryptedSecret, SecretFields, SecretKeyRecord, SecretRecord};
pub use service::VaultService;
pub use session::{KeyState, SecretKeyManager};

use store::{MemoryKeyStore, MemorySecretStore};

/// A service over in-memory stores, configured by `config`.
///
/// Convenient for tests and demos. Real deployments build a
/// [`VaultService`] over their own [`store`] implementations.
pub fn in_memory_vault(config: &EngineConfig) -> VaultService<MemoryKeyStore, MemorySecretStore> {
    VaultService::new(
        SecretKeyManager::with_config(MemoryKeyStore::new(), config),
        MemorySecretStore::new(),
    )
}
