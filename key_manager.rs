//! Key file loading and generation.
//!
//! This module provides [`KeyManager`] for loading an AES key (16, 24 or 32
//! bytes) from disk, or generating and persisting one when none exists.
//!
//! ## Security Features
//!
//! - Key bytes live in [`Key`], which is zeroized on drop
//! - Unix file permissions set to 0600 (owner read/write only)
//! - Cryptographically secure random generation via `OsRng`

use crate::crypto::{self, Key};
use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

/// Handles key loading and persistence.
/// In production: prefer a hardware key store or OS keyring.
pub struct KeyManager {
    key: Key,
}

impl KeyManager {
    /// Load the key at `cfg.key_path`, or generate a `generate_len`-byte key there if absent.
    pub async fn new(cfg: &crate::config::Config, generate_len: usize) -> Result<Self> {
        let path = Path::new(&cfg.key_path);

        let key = if fs::try_exists(path)
            .await
            .with_context(|| format!("checking existence of {}", path.display()))?
        {
            info!(path = %path.display(), "loading existing encryption key");
            let data = fs::read(path)
                .await
                .with_context(|| format!("reading key from {}", path.display()))?;
            let len = data.len();
            Key::new(data).map_err(|e| {
                warn!(path = %path.display(), found_bytes = len, "invalid key size");
                anyhow::anyhow!("key at {}: {}", path.display(), e)
            })?
        } else {
            info!(path = %path.display(), len = generate_len, "generating new encryption key");
            if !crypto::VALID_KEY_LENGTHS.contains(&generate_len) {
                bail!("key length must be 16, 24 or 32 bytes, got {}", generate_len);
            }
            let bytes = crypto::random_key(generate_len)?;

            // Write with restrictive permissions using spawn_blocking for Unix
            #[cfg(unix)]
            {
                let path_buf = path.to_path_buf();
                let key_clone = bytes.clone();
                tokio::task::spawn_blocking(move || {
                    use std::fs::OpenOptions;
                    use std::io::Write;
                    use std::os::unix::fs::OpenOptionsExt;

                    let mut f = OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(&path_buf)?;
                    f.write_all(&key_clone)?;
                    Ok::<(), anyhow::Error>(())
                })
                .await??;
            }
            #[cfg(not(unix))]
            {
                fs::write(path, bytes.as_slice()).await?;
            }

            Key::new(bytes.as_slice())?
        };

        Ok(Self { key })
    }

    /// Load an existing key file, failing if it is missing.
    pub async fn load(cfg: &crate::config::Config) -> Result<Self> {
        let path = Path::new(&cfg.key_path);
        if !fs::try_exists(path).await.unwrap_or(false) {
            bail!("key file {} not found", path.display());
        }
        Self::new(cfg, 32).await
    }

    pub fn key(&self) -> &Key {
        &self.key
    }
}
