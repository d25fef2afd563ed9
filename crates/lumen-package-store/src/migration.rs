//! One-shot migration from legacy single-version keys to versioned keys.
//!
//! Legacy rows are keyed by bare base id and carry no `base_id` column;
//! the presence of the version separator in the key is the only schema
//! discriminator. The whole pass runs in one exclusive transaction so
//! readers never observe a mixed schema.

use crate::StoreResult;
use lumen_core::{encode_versioned_id, is_versioned};
use rusqlite::{params, Connection, TransactionBehavior};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Outcome counts for one migration pass.
pub struct MigrationReport {
    /// Legacy rows rewritten under their versioned key.
    pub migrated: usize,
    /// Rows already carrying a versioned key, left untouched.
    pub skipped: usize,
    /// Corrupt legacy rows logged and left in place.
    pub failed: usize,
}

pub(crate) fn run(connection: &mut Connection) -> StoreResult<MigrationReport> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Exclusive)?;
    let mut report = MigrationReport::default();

    let rows: Vec<(String, String)> = {
        let mut statement = tx.prepare("SELECT versioned_id, version FROM package_metadata")?;
        let mapped = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        mapped.collect::<Result<_, _>>()?
    };

    for (key, version) in rows {
        if is_versioned(&key) {
            report.skipped += 1;
            continue;
        }
        if version.trim().is_empty() {
            tracing::warn!(%key, "legacy package record has no version; skipping");
            report.failed += 1;
            continue;
        }
        let versioned_id = encode_versioned_id(&key, &version);
        let occupied: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM package_metadata WHERE versioned_id = ?1)",
            [&versioned_id],
            |row| row.get(0),
        )?;
        if occupied {
            tracing::warn!(
                %key,
                %versioned_id,
                "versioned key already present; skipping legacy record"
            );
            report.failed += 1;
            continue;
        }
        tx.execute(
            "UPDATE package_metadata SET versioned_id = ?1, base_id = ?2 WHERE versioned_id = ?3",
            params![versioned_id, key, key],
        )?;
        tx.execute(
            "UPDATE package_content SET versioned_id = ?1 WHERE versioned_id = ?2",
            params![versioned_id, key],
        )?;
        report.migrated += 1;
    }

    // Content rows re-key alongside their metadata row above; anything
    // still legacy-keyed here has no metadata row to take a version from.
    let orphans: Vec<String> = {
        let mut statement =
            tx.prepare("SELECT versioned_id FROM package_content WHERE versioned_id NOT LIKE '%@%'")?;
        let mapped = statement.query_map([], |row| row.get(0))?;
        mapped.collect::<Result<_, _>>()?
    };
    for key in orphans {
        tracing::warn!(%key, "legacy content row has no metadata row; skipping");
        report.failed += 1;
    }

    tx.commit()?;
    Ok(report)
}
