//! The outbound call gateway.
//!
//! `GET` requests issued with a non-zero TTL are cached by method, URL and
//! body. While such a request is in flight, at most
//! [`CallConfig::max_in_flight`] identical requests may run in parallel;
//! further callers wait for the cache to be populated and give up after
//! [`CallConfig::duplicate_retries`] polls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{MemoryCache, ResponseCache};
use crate::config::CallConfig;
use crate::error::{strip_scheme, CallError, Result};

type InFlight = Arc<Mutex<HashMap<String, usize>>>;

/// HTTP client with response caching and duplicate-request throttling.
#[derive(Clone)]
pub struct CallGateway {
    client: reqwest::Client,
    cache: Arc<dyn ResponseCache>,
    in_flight: InFlight,
    config: Arc<CallConfig>,
}

impl std::fmt::Debug for CallGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CallGateway {
    /// Create a gateway with the default in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: CallConfig) -> Result<Self> {
        Self::with_cache(config, Arc::new(MemoryCache::new()))
    }

    /// Create a gateway backed by the given cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_cache(config: CallConfig, cache: Arc<dyn ResponseCache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| CallError::Client(e.to_string()))?;

        Ok(Self {
            client,
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        })
    }

    /// The gateway configuration.
    #[must_use]
    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Issue a `GET`, cached for `ttl` when it is non-zero.
    ///
    /// # Errors
    ///
    /// See [`CallGateway::execute`].
    pub async fn get<T: DeserializeOwned>(&self, url: &str, ttl: Duration) -> Result<T> {
        self.execute(Method::GET, url, None, ttl).await
    }

    /// Issue a `POST` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`CallGateway::execute`].
    pub async fn post<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| CallError::payload(url, &e))?;
        self.execute(Method::POST, url, Some(body), Duration::ZERO)
            .await
    }

    /// Issue a `DELETE`.
    ///
    /// # Errors
    ///
    /// See [`CallGateway::execute`].
    pub async fn delete<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.execute(Method::DELETE, url, None, Duration::ZERO)
            .await
    }

    /// Execute a request and decode the JSON response.
    ///
    /// Only `GET` requests with a non-zero `ttl` use the cache and the
    /// in-flight ceiling. An empty response body decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Http`] for non-2xx responses,
    /// [`CallError::Transport`] when no response arrives,
    /// [`CallError::Payload`] when the body cannot be decoded, and
    /// [`CallError::TooManyDuplicates`] when identical requests saturate the
    /// in-flight ceiling for longer than the retry budget.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        ttl: Duration,
    ) -> Result<T> {
        if method != Method::GET || ttl.is_zero() {
            let bytes = self.send(method, url, body.as_ref()).await?;
            return decode(url, &bytes);
        }

        let key = cache_key(&method, url, body.as_ref());
        if let Some(bytes) = self.cache.get(&key) {
            tracing::trace!(url = %strip_scheme(url), "Cache hit");
            return decode(url, &bytes);
        }

        let Some(_guard) = self.acquire(&key) else {
            return self.wait_for_cached(&key, url).await;
        };

        let bytes = self.send(method, url, body.as_ref()).await?;
        let value = decode(url, &bytes)?;
        // Populate before the guard drops so waiters find the entry.
        self.cache.set(&key, bytes, ttl);
        Ok(value)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>> {
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method = %method, url = %strip_scheme(url), error = %e, "Gateway request failed");
            CallError::transport(url, &e)
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CallError::transport(url, &e))?;

        if status.is_success() {
            tracing::debug!(method = %method, url = %strip_scheme(url), status = status.as_u16(), "Gateway call succeeded");
            Ok(bytes.to_vec())
        } else {
            let error = CallError::http(status.as_u16(), url, &String::from_utf8_lossy(&bytes));
            tracing::debug!(method = %method, status = status.as_u16(), error = %error, "Gateway returned error status");
            Err(error)
        }
    }

    /// Reserve an in-flight slot for `key`, or `None` if the ceiling is reached.
    fn acquire(&self, key: &str) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock();
        let count = in_flight.entry(key.to_string()).or_insert(0);
        if *count >= self.config.max_in_flight {
            return None;
        }
        *count += 1;
        Some(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        })
    }

    async fn wait_for_cached<T: DeserializeOwned>(&self, key: &str, url: &str) -> Result<T> {
        for _ in 0..self.config.duplicate_retries {
            tokio::time::sleep(self.config.duplicate_backoff()).await;
            if let Some(bytes) = self.cache.get(key) {
                return decode(url, &bytes);
            }
        }

        tracing::warn!(url = %strip_scheme(url), "Too many duplicate requests");
        Err(CallError::TooManyDuplicates {
            url: strip_scheme(url).to_string(),
        })
    }
}

/// Releases an in-flight slot on drop, on every exit path.
struct InFlightGuard {
    in_flight: InFlight,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if let Some(count) = in_flight.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_flight.remove(&self.key);
            }
        }
    }
}

fn cache_key(method: &Method, url: &str, body: Option<&serde_json::Value>) -> String {
    match body {
        Some(body) => format!("{method} {url} {body}"),
        None => format!("{method} {url}"),
    }
}

fn decode<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T> {
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { bytes };
    serde_json::from_slice(bytes).map_err(|e| CallError::payload(url, &e))
}
