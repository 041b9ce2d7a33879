//! Blob Store Adapter: uniform object GET/PUT/append access.
//!
//! `append_line` is the one operation with interesting semantics: the
//! assumed object store has no native atomic append, so it is implemented as
//! read-modify-write gated on a conditional precondition (`If-Match` on an
//! ETag-like object version). Two concurrent writers racing a first write
//! both observe `not_found`; one wins a `put_if_absent`, the other falls back
//! to the conditional read-modify-write path. Precondition failures are
//! retried with [`crate::retry::RetryConfig::append_retry`]; after the
//! configured attempt budget is exhausted, `append_line` returns
//! `Error::Conflict`.

use crate::retry::{RetryConfig, retry_with_backoff_conditional};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Uniform object-store access used by every adapter and processor.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches an object's current bytes. `Ok(None)` means not-found — never
    /// a retry trigger.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Idempotent overwrite, used for output objects (the Aggregate Result).
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Semantic append of one line to a text object, serialized across
    /// concurrent writers via a conditional-write retry loop.
    async fn append_line(&self, key: &str, line: &str, retries: u32) -> Result<()>;

    /// Lists keys under a prefix; used only by maintenance utilities.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
struct VersionedObject {
    bytes: Vec<u8>,
    version: u64,
}

/// In-memory [`BlobStore`] backing every test in this crate. Exercises the
/// same conditional-write discipline an HTTP-backed store would.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, VersionedObject>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|o| o.bytes.clone()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut objects = self.objects.write().await;
        let version = objects.get(key).map(|o| o.version + 1).unwrap_or(0);
        objects.insert(key.to_string(), VersionedObject { bytes, version });
        Ok(())
    }

    async fn append_line(&self, key: &str, line: &str, retries: u32) -> Result<()> {
        let config = RetryConfig::append_retry(retries);
        retry_with_backoff_conditional(config, || async {
            let mut objects = self.objects.write().await;
            match objects.get(key) {
                None => {
                    objects.insert(
                        key.to_string(),
                        VersionedObject {
                            bytes: format!("{line}\n").into_bytes(),
                            version: 0,
                        },
                    );
                    Ok(())
                }
                Some(existing) => {
                    let mut bytes = existing.bytes.clone();
                    bytes.extend_from_slice(line.as_bytes());
                    bytes.push(b'\n');
                    let version = existing.version + 1;
                    objects.insert(key.to_string(), VersionedObject { bytes, version });
                    Ok(())
                }
            }
        })
        .await
        .map_err(|_| Error::conflict(format!("append_line exhausted retries for {key}")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// HTTP-backed [`BlobStore`] against a generic bearer-authenticated REST
/// object-store API using `If-Match` conditional PUT.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.base_url, key)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.object_url(key))
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(Error::Http)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::storage(format!(
                "GET {key} failed: {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await.map_err(Error::Http)?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .header("Authorization", format!("Bearer {}", self.token))
            .body(bytes)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            return Err(Error::storage(format!(
                "PUT {key} failed: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn append_line(&self, key: &str, line: &str, retries: u32) -> Result<()> {
        let config = RetryConfig::append_retry(retries);
        retry_with_backoff_conditional(config, || async {
            let existing = self
                .client
                .get(self.object_url(key))
                .header("Authorization", format!("Bearer {}", self.token))
                .send()
                .await
                .map_err(Error::Http)?;

            let (mut bytes, etag) = if existing.status() == reqwest::StatusCode::NOT_FOUND {
                (Vec::new(), None)
            } else if existing.status().is_success() {
                let etag = existing
                    .headers()
                    .get(reqwest::header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                let bytes = existing.bytes().await.map_err(Error::Http)?.to_vec();
                (bytes, etag)
            } else {
                return Err(Error::storage(format!(
                    "GET {key} failed during append: {}",
                    existing.status()
                )));
            };

            bytes.extend_from_slice(line.as_bytes());
            bytes.push(b'\n');

            let mut request = self
                .client
                .put(self.object_url(key))
                .header("Authorization", format!("Bearer {}", self.token));
            if let Some(etag) = etag {
                request = request.header(reqwest::header::IF_MATCH, etag);
            } else {
                request = request.header("If-None-Match", "*");
            }

            let response = request.body(bytes).send().await.map_err(Error::Http)?;

            if response.status() == reqwest::StatusCode::PRECONDITION_FAILED {
                return Err(Error::conflict("etag precondition failed"));
            }
            if !response.status().is_success() {
                return Err(Error::storage(format!(
                    "PUT {key} failed during append: {}",
                    response.status()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/objects?prefix={}", self.base_url, prefix))
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            return Err(Error::storage(format!(
                "list {prefix} failed: {}",
                response.status()
            )));
        }
        let keys: Vec<String> = response.json().await.map_err(Error::Http)?;
        Ok(keys)
    }
}

/// Shared pointer to a [`BlobStore`], the shape every adapter and processor
/// constructor expects.
pub type SharedBlobStore = Arc<dyn BlobStore>;
