//! Random passwords for new credentials.
//!
//! Characters are drawn from the system CSPRNG with rejection sampling, so
//! every character of the charset is equally likely.

use secrecy::SecretString;

use crate::codec;
use crate::error::{Result, VaultError};

/// Lowercase, uppercase, digits and common symbols.
pub const DEFAULT_CHARSET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()_+-=[]{}|;:,.<>?";

pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// A password of [`DEFAULT_PASSWORD_LENGTH`] characters from [`DEFAULT_CHARSET`].
pub fn generate_default_password() -> Result<SecretString> {
    generate_password(DEFAULT_PASSWORD_LENGTH, DEFAULT_CHARSET)
}

/// A password of `length` characters drawn uniformly from `charset`.
///
/// `charset` must hold between 1 and 256 characters.
pub fn generate_password(length: usize, charset: &str) -> Result<SecretString> {
    let alphabet: Vec<char> = charset.chars().collect();
    if alphabet.is_empty() || alphabet.len() > 256 {
        return Err(VaultError::Config(format!(
            "password charset must hold 1 to 256 characters, got {}",
            alphabet.len()
        )));
    }
    if length == 0 {
        return Err(VaultError::Config("password length must be positive".to_string()));
    }

    // Bytes at or above `limit` would favour the first characters.
    let n = alphabet.len();
    let limit = 256 - (256 % n);
    let mut password = String::with_capacity(length);
    let mut produced = 0;
    let mut buf = [0u8; 64];
    while produced < length {
        codec::fill_random(&mut buf)?;
        for &byte in buf.iter().filter(|&&b| usize::from(b) < limit) {
            if produced == length {
                break;
            }
            password.push(alphabet[usize::from(byte) % n]);
            produced += 1;
        }
    }
    Ok(SecretString::from(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_default_password_shape() {
        let password = generate_default_password().unwrap();
        let text = password.expose_secret();
        assert_eq!(text.chars().count(), DEFAULT_PASSWORD_LENGTH);
        assert!(text.chars().all(|c| DEFAULT_CHARSET.contains(c)));
    }

    #[test]
    fn test_respects_length_and_charset() {
        let password = generate_password(200, "ab").unwrap();
        let text = password.expose_secret();
        assert_eq!(text.len(), 200);
        assert!(text.chars().all(|c| c == 'a' || c == 'b'));
        // 200 draws from two symbols hit both.
        assert!(text.contains('a') && text.contains('b'));
    }

    #[test]
    fn test_multibyte_charset() {
        let password = generate_password(32, "äöü€").unwrap();
        let text = password.expose_secret();
        assert_eq!(text.chars().count(), 32);
        assert!(text.chars().all(|c| "äöü€".contains(c)));
    }

    #[test]
    fn test_passwords_vary() {
        let a = generate_default_password().unwrap();
        let b = generate_default_password().unwrap();
        assert_ne!(a.expose_secret(), b.expose_secret());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(generate_password(16, ""), Err(VaultError::Config(_))));
        assert!(matches!(generate_password(0, "abc"), Err(VaultError::Config(_))));
        let huge: String = ('\u{100}'..'\u{300}').collect();
        assert!(matches!(generate_password(8, &huge), Err(VaultError::Config(_))));
    }
}
