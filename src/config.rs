//! Algorithm parameters and engine configuration.
//!
//! A [`CryptoConfig`] is fixed per secret-key record once the record exists.
//! The process-wide default only applies when a new record is created.
//!
//! Configuration overrides are all-or-nothing: either all six crypto fields
//! are supplied, or the default is used as a whole. Mixing fields from two
//! sources could produce a combination nobody chose.

use std::fmt;
use std::path::Path;

use ring::{aead, pbkdf2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, VaultError};

/// Smallest accepted PBKDF2 iteration count.
pub const DEFAULT_MIN_ITERATIONS: u32 = 100_000;

/// Smallest accepted salt length in bytes.
pub const DEFAULT_MIN_SALT_SIZE: usize = 16;

/// Authenticated cipher used for both key wrapping and payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    /// AES in Galois/Counter Mode: 96-bit nonce, 128-bit tag.
    #[serde(rename = "AES-GCM")]
    AesGcm,
}

impl CipherAlgorithm {
    /// Nonce length in bytes.
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::AesGcm => aead::NONCE_LEN,
        }
    }

    /// The `ring` AEAD for a key of `length` bits.
    pub(crate) fn aead(&self, length: u32) -> Result<&'static aead::Algorithm> {
        match (self, length) {
            (Self::AesGcm, 128) => Ok(&aead::AES_128_GCM),
            (Self::AesGcm, 256) => Ok(&aead::AES_256_GCM),
            (Self::AesGcm, other) => Err(unsupported_length(other)),
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AesGcm => write!(f, "AES-GCM"),
        }
    }
}

/// Password-based key stretching function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationAlgorithm {
    /// PBKDF2 with an HMAC over [`HashAlgorithm`].
    #[serde(rename = "PBKDF2")]
    Pbkdf2,
}

impl fmt::Display for DerivationAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pbkdf2 => write!(f, "PBKDF2"),
        }
    }
}

/// Hash used inside the KDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-384")]
    Sha384,
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl HashAlgorithm {
    pub(crate) fn pbkdf2(&self) -> pbkdf2::Algorithm {
        match self {
            Self::Sha256 => pbkdf2::PBKDF2_HMAC_SHA256,
            Self::Sha384 => pbkdf2::PBKDF2_HMAC_SHA384,
            Self::Sha512 => pbkdf2::PBKDF2_HMAC_SHA512,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Sha384 => write!(f, "SHA-384"),
            Self::Sha512 => write!(f, "SHA-512"),
        }
    }
}

/// Algorithm parameters for one secret-key record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CryptoConfig {
    pub algorithm: CipherAlgorithm,
    pub derivation_algorithm: DerivationAlgorithm,
    /// Key length in bits.
    pub length: u32,
    pub hash: HashAlgorithm,
    pub iterations: u32,
    /// Salt length in bytes.
    pub salt_size: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            algorithm: CipherAlgorithm::AesGcm,
            derivation_algorithm: DerivationAlgorithm::Pbkdf2,
            length: 256,
            hash: HashAlgorithm::Sha256,
            iterations: 1_000_000,
            salt_size: 16,
        }
    }
}

impl CryptoConfig {
    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        (self.length / 8) as usize
    }

    /// Nonce length for wrap and payload operations.
    pub fn iv_size(&self) -> usize {
        self.algorithm.nonce_len()
    }

    /// Check the parameters against `limits` and what the platform supports.
    pub fn validate(&self, limits: &EngineLimits) -> Result<()> {
        if self.iterations == 0 || self.iterations < limits.min_iterations {
            return Err(VaultError::Kdf(format!(
                "iterations {} below minimum {}",
                self.iterations, limits.min_iterations
            )));
        }
        if self.salt_size == 0 || self.salt_size < limits.min_salt_size {
            return Err(VaultError::Kdf(format!(
                "salt size {} below minimum {}",
                self.salt_size, limits.min_salt_size
            )));
        }
        self.algorithm
            .aead(self.length)
            .map_err(|_| unsupported_length(self.length))?;
        Ok(())
    }

    /// Resolve overrides against `default`.
    ///
    /// The overrides win only when every field is present.
    pub fn from_overrides(overrides: &CryptoConfigOverrides, default: &CryptoConfig) -> Self {
        match overrides.complete() {
            Some(config) => config,
            None => {
                if !overrides.is_empty() {
                    warn!("partial crypto config override ignored, using defaults");
                }
                default.clone()
            }
        }
    }
}

fn unsupported_length(length: u32) -> VaultError {
    match length {
        192 => VaultError::Kdf(
            "unsupported key length 192: platform offers AES-128/256-GCM".to_string(),
        ),
        other => VaultError::Kdf(format!("invalid key length {other}")),
    }
}

/// Optional override for each [`CryptoConfig`] field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CryptoConfigOverrides {
    pub algorithm: Option<CipherAlgorithm>,
    pub derivation_algorithm: Option<DerivationAlgorithm>,
    pub length: Option<u32>,
    pub hash: Option<HashAlgorithm>,
    pub iterations: Option<u32>,
    pub salt_size: Option<usize>,
}

impl CryptoConfigOverrides {
    fn complete(&self) -> Option<CryptoConfig> {
        Some(CryptoConfig {
            algorithm: self.algorithm?,
            derivation_algorithm: self.derivation_algorithm?,
            length: self.length?,
            hash: self.hash?,
            iterations: self.iterations?,
            salt_size: self.salt_size?,
        })
    }

    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<CryptoConfig> for CryptoConfigOverrides {
    fn from(config: CryptoConfig) -> Self {
        Self {
            algorithm: Some(config.algorithm),
            derivation_algorithm: Some(config.derivation_algorithm),
            length: Some(config.length),
            hash: Some(config.hash),
            iterations: Some(config.iterations),
            salt_size: Some(config.salt_size),
        }
    }
}

/// Lower bounds applied to every derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineLimits {
    pub min_iterations: u32,
    pub min_salt_size: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            min_iterations: DEFAULT_MIN_ITERATIONS,
            min_salt_size: DEFAULT_MIN_SALT_SIZE,
        }
    }
}

/// Engine configuration as read from TOML.
///
/// ```toml
/// [limits]
/// min_iterations = 100000
/// min_salt_size = 16
///
/// [crypto]
/// algorithm = "AES-GCM"
/// derivation_algorithm = "PBKDF2"
/// length = 256
/// hash = "SHA-256"
/// iterations = 600000
/// salt_size = 16
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub limits: EngineLimits,
    pub crypto: CryptoConfigOverrides,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| VaultError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// The config used for newly created records.
    pub fn crypto_config(&self) -> CryptoConfig {
        CryptoConfig::from_overrides(&self.crypto, &CryptoConfig::default())
    }
}
