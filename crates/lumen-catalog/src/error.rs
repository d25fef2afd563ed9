//! Typed failure taxonomy for catalog operations.

use lumen_core::MalformedIdentifier;
use lumen_package_store::StoreError;
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors surfaced by the catalog manager and marketplace client.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    MalformedIdentifier(#[from] MalformedIdentifier),
    #[error("no installable artifact for version '{version}' of '{base_id}'")]
    ArtifactUnresolved { base_id: String, version: String },
    #[error("checksum mismatch for '{versioned_id}': expected {expected}, got {actual}")]
    IntegrityViolation {
        versioned_id: String,
        expected: String,
        actual: String,
    },
    #[error("another operation is already in progress for '{0}'")]
    OperationInProgress(String),
    #[error("namespace '{0}' does not support uninstall")]
    UnsupportedNamespace(String),
    #[error("{message} ({})", .kind.suggestion())]
    Network {
        kind: NetworkFailureKind,
        message: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CatalogError {
    /// Network classification, when this error is a network failure.
    pub fn network_kind(&self) -> Option<NetworkFailureKind> {
        match self {
            CatalogError::Network { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `NetworkFailureKind` values.
pub enum NetworkFailureKind {
    Connectivity,
    Timeout,
    Redirect,
    Denied,
    HttpStatus,
    InvalidPayload,
    Request,
}

impl NetworkFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkFailureKind::Connectivity => "connectivity",
            NetworkFailureKind::Timeout => "timeout",
            NetworkFailureKind::Redirect => "redirect",
            NetworkFailureKind::Denied => "denied",
            NetworkFailureKind::HttpStatus => "http_status",
            NetworkFailureKind::InvalidPayload => "invalid_payload",
            NetworkFailureKind::Request => "request",
        }
    }

    /// Human-actionable hint appended to the error message.
    pub fn suggestion(self) -> &'static str {
        match self {
            NetworkFailureKind::Connectivity => {
                "check that the marketplace is reachable from this machine"
            }
            NetworkFailureKind::Timeout => {
                "the marketplace did not respond in time; retry or raise the timeout"
            }
            NetworkFailureKind::Redirect => {
                "the request redirected too many times; verify the published URL"
            }
            NetworkFailureKind::Denied => {
                "the server refused the request; the feed may require credentials"
            }
            NetworkFailureKind::HttpStatus => {
                "the server returned an unexpected status; verify the feed and artifact URLs"
            }
            NetworkFailureKind::InvalidPayload => {
                "the response could not be parsed; the feed must serve a JSON array of descriptors"
            }
            NetworkFailureKind::Request => {
                "the request could not be built; verify the configured marketplace URL"
            }
        }
    }
}

impl std::fmt::Display for NetworkFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
