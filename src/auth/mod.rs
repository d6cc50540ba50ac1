//! Stored session identity (encrypted file)
//!
//! The signed-in [`Identity`] is kept AES-256-GCM encrypted in
//! ~/.config/feedline/credentials.enc. The key is derived from
//! machine-specific identifiers, so the file is useless when copied elsewhere.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Context, Result, anyhow};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::paths;
use crate::session::Identity;

const NONCE_SIZE: usize = 12;

/// Get machine ID for key derivation
fn machine_id() -> String {
    #[cfg(target_os = "linux")]
    {
        for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(id) = fs::read_to_string(candidate) {
                return id.trim().to_string();
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(output) = std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
        {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Some(uuid) = stdout
                .lines()
                .find(|line| line.contains("IOPlatformUUID"))
                .and_then(|line| line.split('"').nth(3))
            {
                return uuid.to_string();
            }
        }
    }

    dirs::home_dir().map_or_else(
        || "feedline-fallback-key".to_string(),
        |p| p.to_string_lossy().to_string(),
    )
}

/// Derive the encryption key from machine-specific data
fn derive_key() -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(machine_id().as_bytes());
    if let Some(home) = dirs::home_dir() {
        hasher.update(home.to_string_lossy().as_bytes());
    }
    hasher.update(b"feedline-session-v1");
    hasher.finalize().into()
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| anyhow!("Invalid key length"))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| anyhow!("Failed to encrypt credentials"))?;

    let mut output = nonce_bytes.to_vec();
    output.extend(ciphertext);
    Ok(output)
}

fn decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(anyhow!("Credentials file is truncated"));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| anyhow!("Invalid key length"))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| anyhow!("Failed to decrypt credentials"))
}

fn store_at_with_key(path: &Path, key: &[u8; 32], identity: &Identity) -> Result<()> {
    let json = serde_json::to_vec(identity).context("Failed to encode identity")?;
    let output = encrypt(key, &json)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create credentials directory")?;
    }
    fs::write(path, output).context("Failed to write credentials file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

fn load_at_with_key(path: &Path, key: &[u8; 32]) -> Result<Option<Identity>> {
    if !path.exists() {
        return Ok(None);
    }

    let encrypted = fs::read(path).context("Failed to read credentials file")?;
    let plaintext = decrypt(key, &encrypted)?;
    let identity = serde_json::from_slice(&plaintext).context("Invalid credentials payload")?;
    Ok(Some(identity))
}

/// Store the identity at a specific path
pub fn store_identity_at(path: &Path, identity: &Identity) -> Result<()> {
    store_at_with_key(path, &derive_key(), identity)
}

/// Load the identity from a specific path. `None` if nothing is stored.
pub fn load_identity_at(path: &Path) -> Result<Option<Identity>> {
    load_at_with_key(path, &derive_key())
}

/// Remove the stored identity at a specific path
pub fn clear_identity_at(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).context("Failed to remove credentials file")?;
    }
    Ok(())
}

/// Store the signed-in identity
pub fn store_identity(identity: &Identity) -> Result<()> {
    store_identity_at(&paths::credentials_path()?, identity)
}

/// Load the signed-in identity, if any
pub fn load_identity() -> Result<Option<Identity>> {
    load_identity_at(&paths::credentials_path()?)
}

/// Forget the signed-in identity
pub fn clear_identity() -> Result<()> {
    clear_identity_at(&paths::credentials_path()?)
}
