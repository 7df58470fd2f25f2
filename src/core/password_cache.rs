//! Persisted SSID to password store

use std::{collections::HashMap, io::ErrorKind, path::PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::error::CacheError;

/// Passwords of successfully provisioned networks
///
/// Backed by a JSON object `{ "<ssid>": "<password>" }`; every change is
/// written through to disk. SSIDs that are not UTF-8 are keyed as `hex:`
/// followed by their bytes in hex.
#[derive(Debug)]
pub struct PasswordCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl PasswordCache {
    /// Load the cache file, starting empty if it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), "Opened password cache");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub async fn get(&self, ssid: &[u8]) -> Option<String> {
        self.entries.read().await.get(&cache_key(ssid)).cloned()
    }

    pub async fn store(&self, ssid: &[u8], password: &str) -> Result<(), CacheError> {
        let key = cache_key(ssid);
        let mut entries = self.entries.write().await;
        debug!(ssid = %key, "Stored password");
        entries.insert(key, password.to_owned());
        self.persist(&entries).await
    }

    pub async fn remove(&self, ssid: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        if entries.remove(&cache_key(ssid)).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(entries)?).await?;
        Ok(())
    }
}

fn cache_key(ssid: &[u8]) -> String {
    match std::str::from_utf8(ssid) {
        Ok(name) => name.to_owned(),
        Err(_) => format!("hex:{}", hex::encode(ssid)),
    }
}
