//! AEAD operations: DEK wrapping and payload encryption.
//!
//! This module and `keys` are the only places in the crate that import
//! `ring` AEAD/KDF primitives directly. All other modules encrypt and decrypt
//! exclusively through the functions exposed here.
//!
//! Every seal generates a fresh random nonce via `SystemRandom`. There is no
//! nonce caching or counter-based generation.
//!
//! Any failure to open a sealed value (tag mismatch, malformed base64, wrong
//! nonce length) is reported as [`VaultError::IncorrectPassphrase`]. Without
//! a stored verifier, a wrong passphrase produces a wrong KEK, and the only
//! observable symptom is a failed tag check.

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};

use crate::codec;
use crate::config::CipherAlgorithm;
use crate::error::{Result, VaultError};
use crate::keys::{Dek, Kek};

/// Base64 ciphertext (tag appended) and the base64 nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub cipher_text: String,
    pub iv: String,
}

/// Wrap the raw DEK under the KEK.
pub fn wrap(dek: &Dek, kek: &Kek, algorithm: CipherAlgorithm, iv_size: usize) -> Result<Sealed> {
    seal(kek.as_bytes(), dek.as_bytes(), algorithm, iv_size)
}

/// Unwrap a DEK sealed by [`wrap`].
///
/// A KEK derived from the wrong passphrase fails here with
/// [`VaultError::IncorrectPassphrase`]; a wrong key is never returned.
pub fn unwrap(
    wrapped_key: &str,
    kek: &Kek,
    iv: &str,
    algorithm: CipherAlgorithm,
    length: u32,
) -> Result<Dek> {
    let raw = open(kek.as_bytes(), wrapped_key, iv, algorithm)?;
    let expected = algorithm.aead(length)?.key_len();
    if raw.len() != expected {
        return Err(VaultError::IncorrectPassphrase);
    }
    Ok(Dek::from_bytes(raw))
}

/// Encrypt a UTF-8 payload under the DEK.
pub fn encrypt(
    plaintext: &str,
    dek: &Dek,
    algorithm: CipherAlgorithm,
    iv_size: usize,
) -> Result<Sealed> {
    seal(dek.as_bytes(), plaintext.as_bytes(), algorithm, iv_size)
}

/// Decrypt a payload sealed by [`encrypt`].
pub fn decrypt(
    cipher_text: &str,
    dek: &Dek,
    iv: &str,
    algorithm: CipherAlgorithm,
) -> Result<String> {
    let raw = open(dek.as_bytes(), cipher_text, iv, algorithm)?;
    String::from_utf8(raw)
        .map_err(|_| VaultError::Encoding("plaintext is not valid UTF-8".to_string()))
}

fn key_for(key_bytes: &[u8], algorithm: CipherAlgorithm) -> Result<LessSafeKey> {
    let aead = algorithm.aead((key_bytes.len() * 8) as u32)?;
    let unbound = UnboundKey::new(aead, key_bytes)
        .map_err(|_| VaultError::PlatformCrypto("cipher rejected key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Seal `plaintext` under `key_bytes` with a fresh nonce.
///
/// # Layout of the decoded ciphertext
/// ```text
/// [ ciphertext ][ GCM tag (16 bytes) ]
/// ```
/// The nonce travels separately.
fn seal(
    key_bytes: &[u8],
    plaintext: &[u8],
    algorithm: CipherAlgorithm,
    iv_size: usize,
) -> Result<Sealed> {
    if iv_size != algorithm.nonce_len() {
        return Err(VaultError::PlatformCrypto(format!(
            "{algorithm} requires a {}-byte nonce, got {iv_size}",
            algorithm.nonce_len()
        )));
    }
    let key = key_for(key_bytes, algorithm)?;

    let mut nonce_bytes = [0u8; aead::NONCE_LEN];
    codec::fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::PlatformCrypto("encryption failed".to_string()))?;

    Ok(Sealed {
        cipher_text: codec::to_base64(&in_out),
        iv: codec::to_base64(&nonce_bytes),
    })
}

fn open(
    key_bytes: &[u8],
    cipher_text: &str,
    iv: &str,
    algorithm: CipherAlgorithm,
) -> Result<Vec<u8>> {
    let key = key_for(key_bytes, algorithm)?;

    let mut in_out = codec::from_base64(cipher_text).map_err(|_| VaultError::IncorrectPassphrase)?;
    let nonce_bytes: [u8; aead::NONCE_LEN] = codec::from_base64(iv)
        .map_err(|_| VaultError::IncorrectPassphrase)?
        .try_into()
        .map_err(|_| VaultError::IncorrectPassphrase)?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    // No partial plaintext is returned on failure.
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| VaultError::IncorrectPassphrase)?;
    Ok(plaintext.to_vec())
}
