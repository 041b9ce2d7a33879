//! Secret Adapter: fetches named credentials, cached in-process with a TTL.
//!
//! `CachedSecretStore` wraps any inner [`SecretStore`] with a 15-minute
//! cache using `tokio::sync::RwLock`'s reader-preferring discipline (§5's
//! shared-resource policy — this cache is the only shared mutable
//! in-process state in the crate). `invalidate` lets a caller that observed
//! an auth failure force the next fetch to bypass the cache.

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Fetches a named credential from wherever secrets live.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// Reads `${NAME}` (uppercased) from the process environment. The concrete
/// implementation shipped for local/dev use.
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        env::var(name.to_uppercase())
            .map_err(|_| Error::config(format!("secret not found in environment: {name}")))
    }
}

/// TTL-caching wrapper around any [`SecretStore`].
///
/// A missing required secret is not an adapter-construction-time failure: a
/// `RouterConfig` naming `secret.token_name` can be built before the
/// Repository Processor's first invocation actually asks for it, matching
/// §4.2's "required at first invocation, not at startup."
pub struct CachedSecretStore<S: SecretStore> {
    inner: S,
    cache: RwLock<HashMap<String, (String, Instant)>>,
}

impl<S: SecretStore> CachedSecretStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Evicts a cached value early, used when a caller reports an
    /// authentication failure using this secret.
    pub async fn invalidate(&self, name: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(name);
    }
}

#[async_trait]
impl<S: SecretStore + Send + Sync> SecretStore for CachedSecretStore<S> {
    async fn get_secret(&self, name: &str) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some((value, fetched_at)) = cache.get(name) {
                if fetched_at.elapsed() < CACHE_TTL {
                    return Ok(value.clone());
                }
            }
        }

        let value = self.inner.get_secret(name).await?;
        let mut cache = self.cache.write().await;
        cache.insert(name.to_string(), (value.clone(), Instant::now()));
        Ok(value)
    }
}
