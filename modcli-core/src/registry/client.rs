use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{PluginError, Result};

/// Registry document for one package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: Option<String>,

    /// Published versions keyed by version string
    pub versions: BTreeMap<String, VersionMetadata>,
}

/// Metadata for a single published version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionMetadata {
    #[serde(default)]
    pub dist: Option<Dist>,
}

/// Download information for a published version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dist {
    /// Tarball URL
    pub tarball: String,

    /// Optional content digest (`sha256:<hex>`)
    #[serde(default)]
    pub digest: Option<String>,
}

impl PackageMetadata {
    pub fn from_json(name: &str, content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| PluginError::registry(name, format!("malformed metadata: {e}")))
    }

    pub fn version_strings(&self) -> Vec<String> {
        self.versions.keys().cloned().collect()
    }

    pub fn dist_for(&self, version: &str) -> Option<&Dist> {
        self.versions.get(version).and_then(|v| v.dist.as_ref())
    }
}

/// Source of package metadata
#[async_trait]
pub trait Registry: Send + Sync {
    async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata>;

    /// All published version strings for `name`
    async fn fetch_versions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.fetch_metadata(name).await?.version_strings())
    }
}

/// Metadata URL for a package. Scoped names keep their `@` but encode the `/`.
pub fn registry_url_for(base_url: &str, name: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        name.replace('/', "%2F")
    )
}

/// Bound on establishing any registry connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on a whole metadata request. Tarball downloads have no total limit.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP registry client. Stateless apart from the connection pool; no retries.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    metadata_timeout: Duration,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .user_agent(concat!("modcli/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PluginError::registry(&base_url, format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            metadata_timeout: METADATA_TIMEOUT,
        })
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Shared client, reused for tarball downloads
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn fetch_metadata(&self, name: &str) -> Result<PackageMetadata> {
        let url = registry_url_for(&self.base_url, name);
        tracing::debug!("Fetching registry metadata from {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.metadata_timeout)
            .send()
            .await
            .map_err(|e| PluginError::registry(name, format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PluginError::registry(
                name,
                format!("HTTP {} from {url}", response.status()),
            ));
        }

        let content = response
            .text()
            .await
            .map_err(|e| PluginError::registry(name, format!("failed to read response body: {e}")))?;

        PackageMetadata::from_json(name, &content)
    }
}
