//! Catalog orchestration: resolve, download, verify, and persist packages.

use crate::error::{CatalogError, CatalogResult};
use crate::marketplace::{MarketplaceClient, MarketplaceDescriptor};
use crate::status::{OperationState, OperationTracker};
use chrono::Utc;
use lumen_core::{compare_versions, decode_versioned_id, encode_versioned_id};
use lumen_package_store::{
    MarketplaceOrigin, Namespace, PackageMetadata, PackageRecord, PackageStore, StoreError,
    StoredPackage, UnknownNamespace,
};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of an install request.
pub enum InstallOutcome {
    Installed(PackageRecord),
    /// The versioned id was already present; nothing was downloaded or
    /// written.
    AlreadyInstalled(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An installed package for which the feed publishes a newer version.
pub struct UpdateCandidate {
    pub versioned_id: String,
    pub base_id: String,
    pub installed_version: String,
    pub available_version: String,
}

/// Orchestrates the marketplace data source, the operation tracker, and
/// the package store behind the caller-facing catalog operations.
///
/// The store is injected and owns all persistent state; the manager caches
/// nothing beyond a single call.
pub struct CatalogManager {
    store: Arc<dyn PackageStore>,
    marketplace: MarketplaceClient,
    tracker: OperationTracker,
}

impl CatalogManager {
    pub fn new(store: Arc<dyn PackageStore>, marketplace: MarketplaceClient) -> Self {
        Self {
            store,
            marketplace,
            tracker: OperationTracker::default(),
        }
    }

    pub async fn fetch_catalog(&self) -> CatalogResult<Vec<MarketplaceDescriptor>> {
        self.marketplace.fetch_catalog().await
    }

    pub fn search(&self, query: &str) -> Vec<MarketplaceDescriptor> {
        self.marketplace.search(query)
    }

    pub fn operation_state(&self, versioned_id: &str) -> OperationState {
        self.tracker.state(versioned_id)
    }

    /// Install `version` of the package described by `descriptor`.
    ///
    /// Rejects a second request for the same versioned id with
    /// `OperationInProgress` while one is in flight; an id already in the
    /// store reports `AlreadyInstalled` without touching the network.
    pub async fn install(
        &self,
        descriptor: &MarketplaceDescriptor,
        version: &str,
    ) -> CatalogResult<InstallOutcome> {
        let versioned_id = encode_versioned_id(&descriptor.base_id, version);
        if self.store.get_record(&versioned_id).await?.is_some() {
            tracing::debug!(%versioned_id, "package already installed");
            return Ok(InstallOutcome::AlreadyInstalled(versioned_id));
        }
        let _guard = self
            .tracker
            .begin(&versioned_id, OperationState::Installing)?;

        let entry = descriptor
            .version_entry(version)
            .filter(|entry| !entry.artifact_url.trim().is_empty())
            .ok_or_else(|| CatalogError::ArtifactUnresolved {
                base_id: descriptor.base_id.clone(),
                version: version.to_string(),
            })?;

        tracing::debug!(%versioned_id, url = %entry.artifact_url, "downloading artifact");
        let content = self.marketplace.download_artifact(&entry.artifact_url).await?;
        if let Some(checksum) = entry.checksum.as_deref() {
            verify_artifact_checksum(&versioned_id, checksum, &content)?;
        }

        let record = PackageRecord {
            versioned_id: versioned_id.clone(),
            base_id: descriptor.base_id.clone(),
            version: version.to_string(),
            namespace: Namespace::Marketplace,
            metadata: PackageMetadata {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                publisher: descriptor.publisher.clone(),
                homepage: descriptor.homepage.clone(),
                license: descriptor.license.clone(),
                readme: None,
                changelog: None,
            },
        };
        let origin = MarketplaceOrigin {
            versioned_id: versioned_id.clone(),
            marketplace_id: descriptor.base_id.clone(),
            version: version.to_string(),
            installed_at: Utc::now(),
            source_url: entry.artifact_url.clone(),
        };
        self.store
            .put_with_origin(
                &StoredPackage {
                    record: record.clone(),
                    content,
                },
                &origin,
            )
            .await?;
        tracing::debug!(%versioned_id, "package installed");
        Ok(InstallOutcome::Installed(record))
    }

    /// Remove an installed package and its origin.
    pub async fn uninstall(&self, versioned_id: &str) -> CatalogResult<()> {
        decode_versioned_id(versioned_id)?;
        let record = match self.store.get_record(versioned_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(StoreError::PackageNotFound(versioned_id.to_string()).into());
            }
            Err(StoreError::Namespace(UnknownNamespace(tag))) => {
                return Err(CatalogError::UnsupportedNamespace(tag));
            }
            Err(error) => return Err(error.into()),
        };
        if !record.namespace.supports_uninstall() {
            return Err(CatalogError::UnsupportedNamespace(
                record.namespace.to_string(),
            ));
        }

        let _guard = self
            .tracker
            .begin(versioned_id, OperationState::Uninstalling)?;
        self.store.delete_with_origin(versioned_id).await?;
        tracing::debug!(%versioned_id, "package uninstalled");
        Ok(())
    }

    /// All installed records, or every installed version of one logical
    /// package when `base_id` is given.
    pub async fn list_installed(&self, base_id: Option<&str>) -> CatalogResult<Vec<PackageRecord>> {
        let records = match base_id {
            Some(base_id) => self.store.list_versions(base_id).await?,
            None => self.store.list().await?,
        };
        Ok(records)
    }

    pub async fn is_installed(&self, versioned_id: &str) -> CatalogResult<bool> {
        Ok(self.store.get_record(versioned_id).await?.is_some())
    }

    /// Installed packages whose origin points at a feed entry that now
    /// publishes a newer version. Joins against the cached catalog; call
    /// `fetch_catalog` first for fresh results.
    pub async fn available_updates(&self) -> CatalogResult<Vec<UpdateCandidate>> {
        let origins = self.store.list_origins().await?;
        let catalog = self.marketplace.cached_catalog();
        let mut candidates = Vec::new();
        for origin in origins {
            let Some(descriptor) = catalog
                .iter()
                .find(|descriptor| descriptor.base_id == origin.marketplace_id)
            else {
                continue;
            };
            let Some(latest) = descriptor.latest_version() else {
                continue;
            };
            if compare_versions(&latest.version, &origin.version) == Ordering::Greater {
                candidates.push(UpdateCandidate {
                    versioned_id: origin.versioned_id,
                    base_id: origin.marketplace_id,
                    installed_version: origin.version,
                    available_version: latest.version.clone(),
                });
            }
        }
        Ok(candidates)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Compare the artifact against its published checksum, case-insensitively;
/// an optional `sha256:` prefix on the expected value is tolerated.
fn verify_artifact_checksum(
    versioned_id: &str,
    raw_checksum: &str,
    bytes: &[u8],
) -> CatalogResult<()> {
    let trimmed = raw_checksum.trim();
    let expected = trimmed
        .strip_prefix("sha256:")
        .unwrap_or(trimmed)
        .to_ascii_lowercase();
    let actual = sha256_hex(bytes);
    if expected != actual {
        return Err(CatalogError::IntegrityViolation {
            versioned_id: versioned_id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
