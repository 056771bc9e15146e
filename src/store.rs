//! Parameter store access — fetching certificate material per request.
//!
//! The [`ParameterStore`] trait abstracts over the external key/value
//! configuration service that holds the two dual-PEM records. Two
//! implementations exist: [`HttpParameterStore`] for the real JSON service
//! and [`MemoryParameterStore`] for tests and local development.
//!
//! # Design
//!
//! [`CertificateSource`] fetches **both** records on every invocation with no
//! caching, so a rotated key is visible on the very next request. The two
//! point queries are independent and issued concurrently. There are no
//! retries: a failed or missing record surfaces immediately as
//! [`StoreError`], which the gate maps to its infrastructure-failure class.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::material::GateMaterials;

/// Errors raised while fetching certificate material.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Network or protocol failure talking to the store.
    #[error("parameter store request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The store answered with an unexpected HTTP status.
    #[error("parameter store returned HTTP {0}")]
    Status(u16),

    /// A named record is absent or empty.
    #[error("parameter '{0}' is missing or empty")]
    MissingParameter(String),
}

/// A single named record in the parameter store.
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    /// Fully qualified parameter name.
    pub name: String,
    /// Decrypted parameter value.
    pub value: String,
}

/// Trait abstracting the external parameter store.
///
/// Implementations must be `Send + Sync`; the store client is shared across
/// concurrently handled requests.
#[async_trait::async_trait]
pub trait ParameterStore: Send + Sync + 'static {
    /// Fetch a single parameter by exact name.
    ///
    /// Returns `Ok(None)` when the record does not exist.
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Fetch all parameters whose names start with `prefix`.
    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Parameter>, StoreError>;
}

/// HTTP client for a JSON parameter service.
///
/// Protocol: `GET {base}/parameters/{name}` returns a [`Parameter`] or 404;
/// `GET {base}/parameters?prefix={p}` returns `{"parameters": [...]}`.
/// Decryption-at-rest is applied transparently by the service.
pub struct HttpParameterStore {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ParameterList {
    parameters: Vec<Parameter>,
}

impl HttpParameterStore {
    /// Create a store client with the given base URL and request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build store client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ParameterStore for HttpParameterStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let url = format!("{}/parameters/{}", self.base_url, name.trim_start_matches('/'));
        debug!(parameter = %name, "Fetching parameter");

        let response = self.http.get(&url).send().await?;
        match response.status().as_u16() {
            200 => {
                let parameter: Parameter = response.json().await?;
                Ok(Some(parameter.value))
            }
            404 => Ok(None),
            status => Err(StoreError::Status(status)),
        }
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Parameter>, StoreError> {
        let url = format!("{}/parameters", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("prefix", prefix)])
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(StoreError::Status(response.status().as_u16()));
        }

        let list: ParameterList = response.json().await?;
        Ok(list.parameters)
    }
}

/// In-memory parameter store for tests and local development.
///
/// Counts accesses so tests can assert the gate's no-credential
/// short-circuit never touches the store.
#[derive(Default)]
pub struct MemoryParameterStore {
    parameters: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MemoryParameterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter (builder style).
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.insert(name.to_string(), value.to_string());
        self
    }

    /// Number of store accesses made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.parameters.get(name).cloned())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Parameter>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .parameters
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, value)| Parameter {
                name: name.clone(),
                value: value.clone(),
            })
            .collect())
    }
}

/// Per-request fetcher for the two certificate material records.
pub struct CertificateSource {
    store: Arc<dyn ParameterStore>,
    encryption_name: String,
    signing_name: String,
}

impl CertificateSource {
    /// Create a source reading the two named records from `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn ParameterStore>,
        encryption_name: &str,
        signing_name: &str,
    ) -> Self {
        Self {
            store,
            encryption_name: encryption_name.to_string(),
            signing_name: signing_name.to_string(),
        }
    }

    /// Fetch both dual-PEM blobs, concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if either record is missing, empty, or the
    /// store call fails. No partial result is ever returned.
    pub async fn fetch(&self) -> Result<GateMaterials, StoreError> {
        let (encryption, signing) = tokio::join!(
            self.store.get(&self.encryption_name),
            self.store.get(&self.signing_name),
        );

        let encryption = encryption?
            .filter(|value| !value.is_empty())
            .ok_or_else(|| StoreError::MissingParameter(self.encryption_name.clone()))?;
        let signing = signing?
            .filter(|value| !value.is_empty())
            .ok_or_else(|| StoreError::MissingParameter(self.signing_name.clone()))?;

        Ok(GateMaterials { encryption, signing })
    }
}
