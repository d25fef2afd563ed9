//! Versioned package catalog for the Lumen marketplace.
//!
//! Discovers installable packages from the remote feed, downloads and
//! verifies artifact payloads, and drives the install/uninstall lifecycle
//! over the local package store. Several versions of one logical package
//! may be installed side by side; the `baseId@version` identifier scheme
//! from `lumen-core` keeps them apart.

mod error;
mod manager;
mod marketplace;
mod status;

pub use error::{CatalogError, CatalogResult, NetworkFailureKind};
pub use manager::{CatalogManager, InstallOutcome, UpdateCandidate};
pub use marketplace::{
    MarketplaceClient, MarketplaceConfig, MarketplaceDescriptor, VersionEntry,
    MARKETPLACE_TIMEOUT_MS, MARKETPLACE_USER_AGENT,
};
pub use status::OperationState;

pub use lumen_core::{
    compare_versions, decode_versioned_id, encode_versioned_id, is_versioned, MalformedIdentifier,
    PackageId,
};
pub use lumen_package_store::{
    MarketplaceOrigin, MigrationReport, Namespace, PackageMetadata, PackageRecord, PackageStore,
    SqlitePackageStore, StoreError, StoredPackage, UnknownNamespace,
};
