//! Passphrase acquisition.
//!
//! The user-facing prompt is an external collaborator. A cancelled prompt is
//! not an error: it means no DEK is available for this operation.

use std::env::{self, VarError};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::{Result, VaultError};

/// Default environment variable read by [`EnvPassphrasePrompt`].
pub const PASSPHRASE_ENV_VAR: &str = "ZKVAULT_PASSPHRASE";

/// A request/response channel that yields a passphrase or a cancellation.
#[async_trait]
pub trait PassphrasePrompt: Send + Sync {
    /// Ask for the passphrase. `purpose` describes the action, for example
    /// "view the password". `Ok(None)` means the user cancelled.
    async fn request(&self, purpose: &str) -> Result<Option<SecretString>>;
}

/// Reads the passphrase from an environment variable, for headless use.
/// Unset or empty counts as a cancellation. A value that is not valid UTF-8
/// is an [`VaultError::Encoding`] error.
#[derive(Debug, Clone)]
pub struct EnvPassphrasePrompt {
    var: String,
}

impl EnvPassphrasePrompt {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvPassphrasePrompt {
    fn default() -> Self {
        Self::new(PASSPHRASE_ENV_VAR)
    }
}

#[async_trait]
impl PassphrasePrompt for EnvPassphrasePrompt {
    async fn request(&self, _purpose: &str) -> Result<Option<SecretString>> {
        match env::var(&self.var) {
            Ok(value) if !value.is_empty() => Ok(Some(SecretString::from(value))),
            Ok(_) | Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(VaultError::Encoding(format!(
                "{} is not valid UTF-8",
                self.var
            ))),
        }
    }
}

/// Answers every request the same way. `None` always cancels.
#[derive(Debug, Clone)]
pub struct FixedPassphrasePrompt {
    answer: Option<String>,
}

impl FixedPassphrasePrompt {
    pub fn answering(passphrase: impl Into<String>) -> Self {
        Self {
            answer: Some(passphrase.into()),
        }
    }

    pub fn cancelling() -> Self {
        Self { answer: None }
    }
}

#[async_trait]
impl PassphrasePrompt for FixedPassphrasePrompt {
    async fn request(&self, _purpose: &str) -> Result<Option<SecretString>> {
        Ok(self.answer.clone().map(SecretString::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_env_prompt() {
        // Unique name so parallel tests never share it.
        let var = "ZKVAULT_TEST_PROMPT_ENV";
        let prompt = EnvPassphrasePrompt::new(var);

        std::env::remove_var(var);
        assert!(prompt.request("unlock").await.unwrap().is_none());

        std::env::set_var(var, "");
        assert!(prompt.request("unlock").await.unwrap().is_none());

        std::env::set_var(var, "correct-horse");
        let answer = prompt.request("unlock").await.unwrap().unwrap();
        std::env::remove_var(var);
        assert_eq!(answer.expose_secret(), "correct-horse");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_prompt_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let var = "ZKVAULT_TEST_PROMPT_NON_UTF8";
        std::env::set_var(var, OsStr::from_bytes(&[0x66, 0x6f, 0xff]));
        let result = EnvPassphrasePrompt::new(var).request("unlock").await;
        std::env::remove_var(var);
        assert!(matches!(result, Err(VaultError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_fixed_prompt() {
        assert!(FixedPassphrasePrompt::cancelling()
            .request("x")
            .await
            .unwrap()
            .is_none());
        let answer = FixedPassphrasePrompt::answering("p").request("x").await.unwrap();
        assert_eq!(answer.unwrap().expose_secret(), "p");
    }
}
