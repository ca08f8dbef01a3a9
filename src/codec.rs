//! Random bytes and the base64 text codec.
//!
//! `ring::rand::SystemRandom` is the only source of randomness in the crate.
//! There is no fallback to a non-cryptographic generator.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Return `n` cryptographically secure random bytes.
pub fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Fill `buf` from the system CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| VaultError::PlatformCrypto("system random source unavailable".to_string()))
}

/// Encode bytes as standard, padded base64.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard, padded base64.
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| VaultError::Encoding(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let samples: [&[u8]; 4] = [b"", b"a", &[0u8, 255, 128, 7], b"correct-horse battery"];
        for bytes in samples {
            assert_eq!(from_base64(&to_base64(bytes)).unwrap(), bytes);
        }
        let random = random_bytes(257).unwrap();
        assert_eq!(from_base64(&to_base64(&random)).unwrap(), random);
    }

    #[test]
    fn test_empty_encodes_to_empty() {
        assert_eq!(to_base64(&[]), "");
        assert!(from_base64("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_base64_is_encoding_error() {
        assert!(matches!(from_base64("not base64!"), Err(VaultError::Encoding(_))));
    }

    #[test]
    fn test_random_bytes_length_and_variation() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(random_bytes(0).unwrap().is_empty());
    }
}
