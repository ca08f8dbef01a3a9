//! Error types for zkvault.
//!
//! Every variant is a distinct failure mode the caller is expected to route
//! on. Messages are intentionally minimal: they say *what* failed without
//! carrying key material, passphrases or plaintext.

use thiserror::Error;

/// The single error type for all zkvault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Key derivation parameters are invalid or outside the supported range.
    #[error("key derivation failed: {0}")]
    Kdf(String),

    /// AEAD tag verification failed while unwrapping the DEK or decrypting a
    /// payload. With no stored verifier, this is how a wrong passphrase shows.
    #[error("incorrect passphrase")]
    IncorrectPassphrase,

    /// No secret-key record exists yet, or no secret has the requested id.
    #[error("not found: {0}")]
    NotFound(String),

    /// A secret-key record already exists for this vault.
    #[error("secret key record already exists")]
    Conflict,

    /// The platform RNG or a cipher primitive failed or is unsupported.
    #[error("platform crypto failure: {0}")]
    PlatformCrypto(String),

    /// Malformed base64 text or a plaintext that is not valid UTF-8.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Engine configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A persistence collaborator failed (network, storage).
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Coarse classification of a [`VaultError`] for routing in a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Prompt the user for the passphrase again.
    Passphrase,
    /// Nothing to decrypt yet; route to the setup flow or report a missing id.
    Missing,
    /// A key record already exists.
    Conflict,
    /// The operation may succeed if retried later (collaborator failure).
    Transient,
    /// Bad parameters, bad data or a broken platform. Do not retry.
    Fatal,
}

impl VaultError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IncorrectPassphrase => ErrorKind::Passphrase,
            Self::NotFound(_) => ErrorKind::Missing,
            Self::Conflict => ErrorKind::Conflict,
            Self::Persistence(_) => ErrorKind::Transient,
            Self::Kdf(_) | Self::PlatformCrypto(_) | Self::Encoding(_) | Self::Config(_) => {
                ErrorKind::Fatal
            }
        }
    }

    /// True when asking the user for a different passphrase may fix this.
    pub fn is_retryable_with_new_passphrase(&self) -> bool {
        self.kind() == ErrorKind::Passphrase
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;
