//! Marketplace feed access: fetch, per-descriptor validation, and
//! client-side search over the last successful fetch.

use crate::error::{CatalogError, CatalogResult, NetworkFailureKind};
use lumen_core::compare_versions;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;

pub const MARKETPLACE_USER_AGENT: &str = "lumen-catalog/marketplace-client";
pub const MARKETPLACE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
/// Public struct `MarketplaceConfig` used across Lumen components.
pub struct MarketplaceConfig {
    pub feed_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl MarketplaceConfig {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            timeout_ms: MARKETPLACE_TIMEOUT_MS,
            user_agent: MARKETPLACE_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
/// One downloadable build of a package, as published in the feed.
pub struct VersionEntry {
    pub version: String,
    #[serde(default)]
    pub published_date: Option<String>,
    pub artifact_url: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Public struct `MarketplaceDescriptor` used across Lumen components.
pub struct MarketplaceDescriptor {
    #[serde(rename = "id")]
    pub base_id: String,
    pub name: String,
    pub publisher: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionEntry>,
}

impl MarketplaceDescriptor {
    pub fn version_entry(&self, version: &str) -> Option<&VersionEntry> {
        self.versions.get(version)
    }

    /// Highest published version by the catalog's version ordering.
    pub fn latest_version(&self) -> Option<&VersionEntry> {
        self.versions
            .values()
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }

    fn validate(&self) -> Result<(), String> {
        if self.base_id.trim().is_empty() {
            return Err("descriptor id must be non-empty".to_string());
        }
        for (key, entry) in &self.versions {
            if key != &entry.version {
                return Err(format!(
                    "descriptor '{}' version key '{}' does not match entry version '{}'",
                    self.base_id, key, entry.version
                ));
            }
        }
        Ok(())
    }

    fn matches_query(&self, needle: &str) -> bool {
        self.base_id.to_lowercase().contains(needle)
            || self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self
                .keywords
                .iter()
                .any(|keyword| keyword.to_lowercase().contains(needle))
    }
}

/// Read-only marketplace data source.
///
/// Retains nothing beyond the last successful fetch; installation state
/// lives in the package store, so this client is safe to reconstruct at
/// any time.
#[derive(Debug)]
pub struct MarketplaceClient {
    config: MarketplaceConfig,
    client: reqwest::Client,
    catalog: RwLock<Vec<MarketplaceDescriptor>>,
}

impl MarketplaceClient {
    pub fn new(config: MarketplaceConfig) -> CatalogResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(classify_request_error)?;
        Ok(Self {
            config,
            client,
            catalog: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    /// Fetch and validate the feed, replacing the cached catalog.
    ///
    /// A structurally invalid feed rejects the whole fetch; individually
    /// malformed descriptors are logged and skipped.
    pub async fn fetch_catalog(&self) -> CatalogResult<Vec<MarketplaceDescriptor>> {
        let response = self
            .client
            .get(&self.config.feed_url)
            .send()
            .await
            .map_err(classify_request_error)?
            .error_for_status()
            .map_err(classify_request_error)?;
        let raw: Vec<serde_json::Value> =
            response.json().await.map_err(classify_request_error)?;

        let mut descriptors = Vec::new();
        for value in raw {
            match parse_descriptor(value) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(reason) => {
                    tracing::warn!(%reason, "skipping malformed marketplace descriptor");
                }
            }
        }

        *self.write_catalog() = descriptors.clone();
        Ok(descriptors)
    }

    /// Case-insensitive filter over the last fetched catalog; never
    /// re-fetches. An empty query returns the whole catalog.
    pub fn search(&self, query: &str) -> Vec<MarketplaceDescriptor> {
        let needle = query.trim().to_lowercase();
        let catalog = self.read_catalog();
        if needle.is_empty() {
            return catalog.clone();
        }
        catalog
            .iter()
            .filter(|descriptor| descriptor.matches_query(&needle))
            .cloned()
            .collect()
    }

    pub fn cached_catalog(&self) -> Vec<MarketplaceDescriptor> {
        self.read_catalog().clone()
    }

    /// Download raw artifact bytes from `url`.
    pub async fn download_artifact(&self, url: &str) -> CatalogResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_request_error)?
            .error_for_status()
            .map_err(classify_request_error)?;
        let bytes = response.bytes().await.map_err(classify_request_error)?;
        Ok(bytes.to_vec())
    }

    fn read_catalog(&self) -> std::sync::RwLockReadGuard<'_, Vec<MarketplaceDescriptor>> {
        match self.catalog.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_catalog(&self) -> std::sync::RwLockWriteGuard<'_, Vec<MarketplaceDescriptor>> {
        match self.catalog.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn parse_descriptor(value: serde_json::Value) -> Result<MarketplaceDescriptor, String> {
    let descriptor: MarketplaceDescriptor =
        serde_json::from_value(value).map_err(|error| error.to_string())?;
    descriptor.validate()?;
    Ok(descriptor)
}

/// Map a transport error onto the network failure taxonomy, keeping the
/// classification available programmatically.
fn classify_request_error(error: reqwest::Error) -> CatalogError {
    let kind = if error.is_timeout() {
        NetworkFailureKind::Timeout
    } else if error.is_connect() {
        NetworkFailureKind::Connectivity
    } else if error.is_redirect() {
        NetworkFailureKind::Redirect
    } else if error.is_decode() {
        NetworkFailureKind::InvalidPayload
    } else if let Some(status) = error.status() {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            NetworkFailureKind::Denied
        } else {
            NetworkFailureKind::HttpStatus
        }
    } else {
        NetworkFailureKind::Request
    };
    CatalogError::Network {
        kind,
        message: error.to_string(),
    }
}
