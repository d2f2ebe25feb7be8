//! Content-addressed photo storage on the local filesystem.
//!
//! Objects are keyed `{user_id}/{sha256}.{ext}` and handed out only through
//! URLs signed with HMAC-SHA256 that stop working after the configured TTL.

use async_trait::async_trait;
use chrono::Utc;
use live_match::{
    events::{CollaboratorError, CollaboratorResult, PhotoStorage},
    profile::UserId,
};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

use crate::config::PhotoStorageConfig;

type HmacSha256 = Hmac<Sha256>;

/// The URL secret could not key the HMAC
#[derive(Debug, Error)]
#[error("Photo URL secret is not a usable HMAC key")]
pub struct InvalidSecret;

/// Why a photo URL was refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhotoAccessError {
    #[error("Malformed photo key")]
    InvalidKey,

    #[error("Photo link expired")]
    Expired,

    #[error("Invalid photo signature")]
    BadSignature,
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Content type for a well-formed key, `None` for anything else
///
/// Only `{digits}/{64 hex}.{jpg|png|webp}` is accepted, which also keeps
/// lookups inside the storage directory.
pub fn content_type_for_key(key: &str) -> Option<&'static str> {
    let (owner, file) = key.split_once('/')?;
    if owner.is_empty() || !owner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (digest, ext) = file.split_once('.')?;
    if digest.len() != 64 || !digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    match ext {
        "jpg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Photo storage rooted at a local directory
pub struct LocalPhotoStorage {
    root: PathBuf,
    base_url: String,
    mac: HmacSha256,
    url_ttl: Duration,
}

impl LocalPhotoStorage {
    pub fn new(config: &PhotoStorageConfig) -> Result<Self, InvalidSecret> {
        let mac = HmacSha256::new_from_slice(config.url_secret.as_bytes())
            .map_err(|_| InvalidSecret)?;
        Ok(Self {
            root: config.dir.clone(),
            base_url: config.public_base_url.trim_end_matches('/').to_string(),
            mac,
            url_ttl: config.url_ttl,
        })
    }

    /// Create the storage directory if needed
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    fn mac_for(&self, key: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Hex HMAC over a key and its expiry timestamp
    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac_for(key, expires).finalize().into_bytes())
    }

    /// Signed URL valid until `expires` (unix seconds)
    pub fn signed_url(&self, key: &str, expires: i64) -> String {
        format!(
            "{}/photos/{}?expires={}&sig={}",
            self.base_url,
            key,
            expires,
            self.sign(key, expires)
        )
    }

    /// Check a presented URL
    ///
    /// # Errors
    ///
    /// * `PhotoAccessError::InvalidKey` - Key is not one this storage issues
    /// * `PhotoAccessError::Expired` - Past its expiry
    /// * `PhotoAccessError::BadSignature` - Signature does not match
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<&'static str, PhotoAccessError> {
        let content_type = content_type_for_key(key).ok_or(PhotoAccessError::InvalidKey)?;
        if expires <= now {
            return Err(PhotoAccessError::Expired);
        }
        let signature = hex::decode(signature).map_err(|_| PhotoAccessError::BadSignature)?;
        self.mac_for(key, expires)
            .verify_slice(&signature)
            .map_err(|_| PhotoAccessError::BadSignature)?;
        Ok(content_type)
    }

    /// Bytes for a key, `None` when absent
    pub async fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        if content_type_for_key(key).is_none() {
            return Ok(None);
        }
        match tokio::fs::read(self.root.join(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PhotoStorage for LocalPhotoStorage {
    async fn store(
        &self,
        user_id: UserId,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> CollaboratorResult<String> {
        let ext = extension_for(content_type).ok_or_else(|| CollaboratorError::InvalidData {
            service: "photo storage",
            reason: format!("unsupported content type {content_type}"),
        })?;
        let key = format!("{user_id}/{}.{ext}", hex::encode(Sha256::digest(&bytes)));

        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Same content, same key: rewriting is harmless
        tokio::fs::write(&path, &bytes).await?;

        tracing::debug!(%key, size = bytes.len(), "Stored photo");
        Ok(key)
    }

    async fn url_for(&self, key: &str) -> CollaboratorResult<String> {
        if content_type_for_key(key).is_none() {
            return Err(CollaboratorError::InvalidData {
                service: "photo storage",
                reason: format!("unknown key {key}"),
            });
        }
        let expires = Utc::now().timestamp() + self.url_ttl.as_secs() as i64;
        Ok(self.signed_url(key, expires))
    }
}
