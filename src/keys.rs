//! Key derivation and ownership.
//!
//! This module owns two responsibilities:
//! 1. Deriving the key-encryption-key (KEK) from a passphrase using PBKDF2.
//! 2. Holding key material in types that are opaque, non-cloneable, and
//!    zeroised on drop.
//!
//! The two key types are deliberately distinct. A [`Kek`] is only accepted by
//! `crypto::wrap`/`crypto::unwrap`; a [`Dek`] is only accepted by
//! `crypto::encrypt`/`crypto::decrypt` and leaves the crate only by being
//! wrapped. Neither exposes its bytes outside the crate.
//!
//! ## Derivation structure
//!
//! ```text
//! PBKDF2-HMAC-{hash}(
//!     password   = passphrase (UTF-8),
//!     salt       = record salt (salt_size bytes),
//!     iterations = record iterations,
//!     dkLen      = length / 8
//! )
//! ```

use std::num::NonZeroU32;

use ring::pbkdf2;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::codec;
use crate::config::{CipherAlgorithm, CryptoConfig, DerivationAlgorithm, EngineLimits};
use crate::error::{Result, VaultError};

// ---------------------------------------------------------------------------
// Key-encryption key
// ---------------------------------------------------------------------------

/// A key derived from the user's passphrase.
///
/// - Not `Clone`.
/// - Zeroised on drop.
/// - Usable only for wrapping and unwrapping a [`Dek`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Kek {
    bytes: Vec<u8>,
}

impl Kek {
    /// `pub(crate)`: raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bits.
    pub fn length(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek")
            .field("length", &self.length())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Data-encryption key
// ---------------------------------------------------------------------------

/// The per-vault key that encrypts secret payloads.
///
/// - Not `Clone`. The session cache shares it behind an `Arc`.
/// - Zeroised on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Dek {
    bytes: Vec<u8>,
}

impl Dek {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// `pub(crate)`: only `crypto::wrap` and the payload cipher read these.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bits.
    pub fn length(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dek")
            .field("length", &self.length())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random DEK for `algorithm` with `length` bits.
pub fn generate_dek(algorithm: CipherAlgorithm, length: u32) -> Result<Dek> {
    let aead = algorithm.aead(length)?;
    let bytes = codec::random_bytes(aead.key_len())?;
    Ok(Dek { bytes })
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// Generate a random salt of `config.salt_size` bytes.
pub fn generate_salt(config: &CryptoConfig) -> Result<Vec<u8>> {
    codec::random_bytes(config.salt_size)
}

/// Derive the KEK synchronously.
///
/// Takes on the order of hundreds of milliseconds with production iteration
/// counts. Async callers should use [`derive_key`].
pub fn derive_key_blocking(
    passphrase: &str,
    salt: &[u8],
    config: &CryptoConfig,
    limits: &EngineLimits,
) -> Result<Kek> {
    if passphrase.is_empty() {
        return Err(VaultError::Kdf("empty passphrase".to_string()));
    }
    config.validate(limits)?;
    if salt.len() != config.salt_size {
        return Err(VaultError::Kdf(format!(
            "salt is {} bytes, expected {}",
            salt.len(),
            config.salt_size
        )));
    }
    let iterations = NonZeroU32::new(config.iterations)
        .ok_or_else(|| VaultError::Kdf("iterations must be non-zero".to_string()))?;

    let mut bytes = vec![0u8; config.key_len()];
    match config.derivation_algorithm {
        DerivationAlgorithm::Pbkdf2 => pbkdf2::derive(
            config.hash.pbkdf2(),
            iterations,
            salt,
            passphrase.as_bytes(),
            &mut bytes,
        ),
    }

    Ok(Kek { bytes })
}

/// Derive the KEK on the blocking thread pool.
///
/// Same passphrase, salt and parameters always yield the same key.
pub async fn derive_key(
    passphrase: &SecretString,
    salt: &[u8],
    config: &CryptoConfig,
    limits: &EngineLimits,
) -> Result<Kek> {
    let passphrase = Zeroizing::new(passphrase.expose_secret().to_owned());
    let salt = salt.to_vec();
    let config = config.clone();
    let limits = limits.clone();

    debug!(
        derivation = %config.derivation_algorithm,
        hash = %config.hash,
        iterations = config.iterations,
        "deriving key-encryption key"
    );
    tokio::task::spawn_blocking(move || derive_key_blocking(&passphrase, &salt, &config, &limits))
        .await
        .map_err(|e| VaultError::PlatformCrypto(format!("key derivation task failed: {e}")))?
}
