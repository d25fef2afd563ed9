//! Foundational identifier utilities shared across Lumen crates.
//!
//! Defines the versioned identifier scheme `<publisher>.<name>@<version>`
//! that distinguishes a logical package from one installed version of it,
//! plus the version ordering used for update checks.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Separator between the logical package id and the version suffix.
pub const VERSION_SEPARATOR: char = '@';

/// Error returned when a versioned identifier cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed versioned identifier '{0}'")]
pub struct MalformedIdentifier(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `PackageId` used across Lumen components.
pub struct PackageId {
    pub base_id: String,
    pub version: String,
}

impl PackageId {
    /// Canonical `<base_id>@<version>` form of this id.
    pub fn versioned_id(&self) -> String {
        encode_versioned_id(&self.base_id, &self.version)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base_id, VERSION_SEPARATOR, self.version)
    }
}

impl FromStr for PackageId {
    type Err = MalformedIdentifier;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        decode_versioned_id(value)
    }
}

/// Build a versioned identifier from a base id and a version.
///
/// A version suffix already present on `base_id` is stripped first, so
/// re-encoding an already-versioned id is idempotent.
pub fn encode_versioned_id(base_id: &str, version: &str) -> String {
    let base = match base_id.find(VERSION_SEPARATOR) {
        Some(at) => &base_id[..at],
        None => base_id,
    };
    format!("{base}{VERSION_SEPARATOR}{version}")
}

/// Split a versioned identifier into its base id and version halves.
///
/// Rejects ids with zero or more than one separator, and ids where either
/// half is empty.
pub fn decode_versioned_id(id: &str) -> Result<PackageId, MalformedIdentifier> {
    if id.matches(VERSION_SEPARATOR).count() != 1 {
        return Err(MalformedIdentifier(id.to_string()));
    }
    let (base_id, version) = id
        .split_once(VERSION_SEPARATOR)
        .ok_or_else(|| MalformedIdentifier(id.to_string()))?;
    if base_id.is_empty() || version.is_empty() {
        return Err(MalformedIdentifier(id.to_string()));
    }
    Ok(PackageId {
        base_id: base_id.to_string(),
        version: version.to_string(),
    })
}

/// True iff `id` carries exactly one separator with non-empty halves.
pub fn is_versioned(id: &str) -> bool {
    decode_versioned_id(id).is_ok()
}

/// Order two semantic-version-like strings.
///
/// Segments are compared numerically when both sides parse as integers and
/// lexicographically otherwise; a missing segment sorts before any present
/// one, so `1.2` < `1.2.0`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let mut left_parts = left.split('.');
    let mut right_parts = right.split('.');
    loop {
        match (left_parts.next(), right_parts.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) => {
                let ordering = match (a.parse::<u64>(), b.parse::<u64>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    _ => a.cmp(b),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}
