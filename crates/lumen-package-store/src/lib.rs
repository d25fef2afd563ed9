//! Installed-package persistence for the Lumen catalog.
//!
//! Defines the package record model, the async store contract, and a SQLite
//! implementation whose open sequence runs the legacy-to-versioned key
//! migration before any reader is admitted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod migration;
mod sqlite;

pub use migration::MigrationReport;
pub use sqlite::SqlitePackageStore;

/// Result type for package store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("package '{0}' not found")]
    PackageNotFound(String),
    #[error(transparent)]
    Namespace(#[from] UnknownNamespace),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Error returned when a persisted namespace tag is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown namespace tag '{0}'")]
pub struct UnknownNamespace(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Enumerates supported `Namespace` values.
pub enum Namespace {
    Local,
    Marketplace,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Local => "local",
            Namespace::Marketplace => "marketplace",
        }
    }

    /// Every namespace this crate writes supports uninstall; foreign tags
    /// fail earlier, at parse time.
    pub fn supports_uninstall(self) -> bool {
        matches!(self, Namespace::Local | Namespace::Marketplace)
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Self::Local),
            "marketplace" => Ok(Self::Marketplace),
            other => Err(UnknownNamespace(other.to_string())),
        }
    }
}

/// Descriptive fields persisted alongside every installed package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub description: String,
    pub publisher: String,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `PackageRecord` used across Lumen components.
///
/// The lightweight half of an installed package: everything needed for
/// listing and identity checks, without the artifact payload.
pub struct PackageRecord {
    pub versioned_id: String,
    pub base_id: String,
    pub version: String,
    pub namespace: Namespace,
    pub metadata: PackageMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One installed package together with its artifact payload.
pub struct StoredPackage {
    pub record: PackageRecord,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Provenance of a marketplace install, kept for update checks.
pub struct MarketplaceOrigin {
    pub versioned_id: String,
    pub marketplace_id: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub source_url: String,
}

/// Async store contract consumed by the catalog manager.
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Upsert by versioned id; last write wins.
    async fn put(&self, package: &StoredPackage) -> StoreResult<()>;
    /// Fetch one package including its payload.
    async fn get(&self, versioned_id: &str) -> StoreResult<Option<StoredPackage>>;
    /// Fetch one package without its payload.
    async fn get_record(&self, versioned_id: &str) -> StoreResult<Option<PackageRecord>>;
    /// Compatibility lookup: versioned ids resolve directly, bare ids fall
    /// back to the first record sharing that base id.
    async fn get_by_legacy_or_versioned(&self, id: &str) -> StoreResult<Option<PackageRecord>>;
    async fn list(&self) -> StoreResult<Vec<PackageRecord>>;
    /// Every installed version sharing `base_id`.
    async fn list_versions(&self, base_id: &str) -> StoreResult<Vec<PackageRecord>>;
    /// Delete by versioned id; `PackageNotFound` when absent.
    async fn delete(&self, versioned_id: &str) -> StoreResult<()>;
    /// Write a package and its origin in one transaction.
    async fn put_with_origin(
        &self,
        package: &StoredPackage,
        origin: &MarketplaceOrigin,
    ) -> StoreResult<()>;
    /// Delete a package and its origin in one transaction;
    /// `PackageNotFound` when absent.
    async fn delete_with_origin(&self, versioned_id: &str) -> StoreResult<()>;
    async fn get_origin(&self, versioned_id: &str) -> StoreResult<Option<MarketplaceOrigin>>;
    async fn list_origins(&self) -> StoreResult<Vec<MarketplaceOrigin>>;
}
