//! Minimal example: a vault session from setup to logout.
//!
//! Demonstrates key setup, storing and reading a secret, a wrong passphrase,
//! and the audit trail persisted to a file.
//! Run with: `cargo run --example vault_demo`
//!
//! Set `ZKVAULT_PASSPHRASE` to unlock through the environment prompt after
//! logout; when it is unset the prompt counts as cancelled.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use tracing_subscriber::EnvFilter;
use zkvault::audit::FileAuditSink;
use zkvault::generator::generate_default_password;
use zkvault::prompt::EnvPassphrasePrompt;
use zkvault::{in_memory_vault, EngineConfig, SecretFields, VaultError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Setup
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let vault = in_memory_vault(&config);

    let audit_path = PathBuf::from(std::env::temp_dir()).join("zkvault_audit.jsonl");
    vault
        .audit_log()
        .lock()
        .add_forward_sink(Box::new(FileAuditSink::new(&audit_path)?));

    // 2. Create the vault key
    let passphrase = SecretString::from("correct-horse".to_string());
    let record = vault.keys().create_secret_key_record(&passphrase, None).await?;
    println!("Key record: {}", serde_json::to_string_pretty(&record)?);

    // 3. Store a secret
    let id = vault
        .create(
            SecretFields::new("Bank", "alice", "s3cr3t!").with_url("https://bank.example"),
            &passphrase,
        )
        .await?;
    println!("Stored secret {id}");

    let generated = generate_default_password()?;
    let mail_id = vault
        .create(
            SecretFields::new("Mail", "alice", generated.expose_secret()),
            &passphrase,
        )
        .await?;
    println!("Stored secret {mail_id} with a generated password");

    // 4. New session: wrong passphrase, then the right one
    vault.logout();
    let wrong = SecretString::from("wrong-horse".to_string());
    match vault.get_by_id(&id, &wrong).await {
        Err(VaultError::IncorrectPassphrase) => println!("Wrong passphrase rejected"),
        other => println!("Unexpected: {other:?}"),
    }
    let secret = vault.get_by_id(&id, &passphrase).await?;
    println!(
        "{} / {} -> {}",
        secret.record.title,
        secret.record.username,
        secret.password.expose_secret()
    );

    // 5. Prompt-driven unlock after logout
    vault.logout();
    match vault.get_by_id_with_prompt(&id, &EnvPassphrasePrompt::default()).await {
        Ok(Some(_)) => println!("Unlocked via ZKVAULT_PASSPHRASE"),
        Ok(None) => println!("Prompt cancelled; nothing decrypted"),
        Err(e) => println!("Prompt unlock failed: {e}"),
    }

    // 6. Audit log
    let log = vault.audit_log();
    let log = log.lock();
    println!("Audit log: {} record(s)", log.len());
    for record in log.iter() {
        println!("  {:?} {:?} @ {}", record.event, record.secret_id, record.timestamp);
    }
    println!("Full audit also written to: {}", audit_path.display());

    Ok(())
}
