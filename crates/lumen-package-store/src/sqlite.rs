//! SQLite-backed `PackageStore` implementation with durable persistence.

use crate::{
    migration, MarketplaceOrigin, MigrationReport, Namespace, PackageMetadata, PackageRecord,
    PackageStore, StoreError, StoreResult, StoredPackage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lumen_core::{decode_versioned_id, is_versioned};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const RECORD_COLUMNS: &str = "versioned_id, base_id, version, namespace, metadata_json";

/// Persistent SQLite store holding installed packages and their origins.
///
/// `open` bootstraps the schema and runs the legacy key migration before
/// returning, so every constructed store presents the versioned schema.
#[derive(Debug, Clone)]
pub struct SqlitePackageStore {
    db_path: PathBuf,
}

impl SqlitePackageStore {
    /// Creates a store at `path`, creating schema and migrating legacy
    /// records if needed.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { db_path };
        let mut connection = store.connection()?;
        bootstrap_schema(&connection)?;
        let report = migration::run(&mut connection)?;
        if report.migrated > 0 || report.failed > 0 {
            tracing::info!(
                migrated = report.migrated,
                skipped = report.skipped,
                failed = report.failed,
                "migrated legacy package records"
            );
        }
        Ok(store)
    }

    /// Re-run the legacy key migration; a no-op on an already-migrated
    /// store.
    pub fn migrate(&self) -> StoreResult<MigrationReport> {
        let mut connection = self.connection()?;
        migration::run(&mut connection)
    }

    fn connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }
}

pub(crate) fn bootstrap_schema(connection: &Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS package_metadata (
            versioned_id TEXT PRIMARY KEY,
            base_id TEXT NULL,
            version TEXT NOT NULL,
            namespace TEXT NOT NULL,
            metadata_json TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_package_metadata_base
            ON package_metadata (base_id);

        CREATE TABLE IF NOT EXISTS package_content (
            versioned_id TEXT PRIMARY KEY,
            content BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS marketplace_origins (
            versioned_id TEXT PRIMARY KEY,
            marketplace_id TEXT NOT NULL,
            version TEXT NOT NULL,
            installed_at TEXT NOT NULL,
            source_url TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

type RecordRow = (String, Option<String>, String, String, String);

fn record_from_row(row: RecordRow) -> StoreResult<PackageRecord> {
    let (versioned_id, base_id, version, namespace, metadata_json) = row;
    let namespace = Namespace::from_str(&namespace)?;
    let metadata: PackageMetadata = serde_json::from_str(&metadata_json)?;
    // Legacy rows carry no base id; derive it from the key shape.
    let base_id = match base_id {
        Some(value) => value,
        None => match decode_versioned_id(&versioned_id) {
            Ok(id) => id.base_id,
            Err(_) => versioned_id.clone(),
        },
    };
    Ok(PackageRecord {
        versioned_id,
        base_id,
        version,
        namespace,
        metadata,
    })
}

fn query_record(connection: &Connection, versioned_id: &str) -> StoreResult<Option<PackageRecord>> {
    let row = connection
        .query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM package_metadata WHERE versioned_id = ?1"),
            [versioned_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?;
    row.map(record_from_row).transpose()
}

fn collect_records(connection: &Connection, sql: &str, args: &[&str]) -> StoreResult<Vec<PackageRecord>> {
    let mut statement = connection.prepare(sql)?;
    let rows = statement.query_map(rusqlite::params_from_iter(args), |row| {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        match record_from_row(row?) {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable package record");
            }
        }
    }
    Ok(records)
}

fn write_package(tx: &Transaction<'_>, package: &StoredPackage) -> StoreResult<()> {
    let record = &package.record;
    let metadata_json = serde_json::to_string(&record.metadata)?;
    tx.execute(
        "INSERT OR REPLACE INTO package_metadata \
         (versioned_id, base_id, version, namespace, metadata_json) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.versioned_id,
            record.base_id,
            record.version,
            record.namespace.as_str(),
            metadata_json
        ],
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO package_content (versioned_id, content) VALUES (?1, ?2)",
        params![record.versioned_id, package.content],
    )?;
    Ok(())
}

fn write_origin(tx: &Transaction<'_>, origin: &MarketplaceOrigin) -> StoreResult<()> {
    tx.execute(
        "INSERT OR REPLACE INTO marketplace_origins \
         (versioned_id, marketplace_id, version, installed_at, source_url) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            origin.versioned_id,
            origin.marketplace_id,
            origin.version,
            origin.installed_at.to_rfc3339(),
            origin.source_url
        ],
    )?;
    Ok(())
}

fn delete_package_rows(tx: &Transaction<'_>, versioned_id: &str) -> StoreResult<()> {
    let deleted = tx.execute(
        "DELETE FROM package_metadata WHERE versioned_id = ?1",
        [versioned_id],
    )?;
    if deleted == 0 {
        return Err(StoreError::PackageNotFound(versioned_id.to_string()));
    }
    tx.execute(
        "DELETE FROM package_content WHERE versioned_id = ?1",
        [versioned_id],
    )?;
    Ok(())
}

fn origin_from_row(row: (String, String, String, String, String)) -> StoreResult<MarketplaceOrigin> {
    let (versioned_id, marketplace_id, version, installed_at, source_url) = row;
    let installed_at = DateTime::parse_from_rfc3339(&installed_at)?.with_timezone(&Utc);
    Ok(MarketplaceOrigin {
        versioned_id,
        marketplace_id,
        version,
        installed_at,
        source_url,
    })
}

#[async_trait]
impl PackageStore for SqlitePackageStore {
    async fn put(&self, package: &StoredPackage) -> StoreResult<()> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        write_package(&tx, package)?;
        tx.commit()?;
        Ok(())
    }

    async fn get(&self, versioned_id: &str) -> StoreResult<Option<StoredPackage>> {
        let connection = self.connection()?;
        let row = connection
            .query_row(
                "SELECT m.versioned_id, m.base_id, m.version, m.namespace, m.metadata_json, \
                 c.content \
                 FROM package_metadata m \
                 JOIN package_content c ON c.versioned_id = m.versioned_id \
                 WHERE m.versioned_id = ?1",
                [versioned_id],
                |row| {
                    Ok((
                        (
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ),
                        row.get::<_, Vec<u8>>(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((record, content)) => Ok(Some(StoredPackage {
                record: record_from_row(record)?,
                content,
            })),
            None => Ok(None),
        }
    }

    async fn get_record(&self, versioned_id: &str) -> StoreResult<Option<PackageRecord>> {
        let connection = self.connection()?;
        query_record(&connection, versioned_id)
    }

    async fn get_by_legacy_or_versioned(&self, id: &str) -> StoreResult<Option<PackageRecord>> {
        let connection = self.connection()?;
        if is_versioned(id) {
            return query_record(&connection, id);
        }
        let row = connection
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM package_metadata \
                     WHERE base_id = ?1 ORDER BY versioned_id LIMIT 1"
                ),
                [id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(record_from_row).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<PackageRecord>> {
        let connection = self.connection()?;
        collect_records(
            &connection,
            &format!("SELECT {RECORD_COLUMNS} FROM package_metadata ORDER BY versioned_id"),
            &[],
        )
    }

    async fn list_versions(&self, base_id: &str) -> StoreResult<Vec<PackageRecord>> {
        let connection = self.connection()?;
        collect_records(
            &connection,
            &format!(
                "SELECT {RECORD_COLUMNS} FROM package_metadata \
                 WHERE base_id = ?1 ORDER BY versioned_id"
            ),
            &[base_id],
        )
    }

    async fn delete(&self, versioned_id: &str) -> StoreResult<()> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        delete_package_rows(&tx, versioned_id)?;
        tx.commit()?;
        Ok(())
    }

    async fn put_with_origin(
        &self,
        package: &StoredPackage,
        origin: &MarketplaceOrigin,
    ) -> StoreResult<()> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        write_package(&tx, package)?;
        write_origin(&tx, origin)?;
        tx.commit()?;
        Ok(())
    }

    async fn delete_with_origin(&self, versioned_id: &str) -> StoreResult<()> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        delete_package_rows(&tx, versioned_id)?;
        tx.execute(
            "DELETE FROM marketplace_origins WHERE versioned_id = ?1",
            [versioned_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn get_origin(&self, versioned_id: &str) -> StoreResult<Option<MarketplaceOrigin>> {
        let connection = self.connection()?;
        let row = connection
            .query_row(
                "SELECT versioned_id, marketplace_id, version, installed_at, source_url \
                 FROM marketplace_origins WHERE versioned_id = ?1",
                [versioned_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;
        row.map(origin_from_row).transpose()
    }

    async fn list_origins(&self) -> StoreResult<Vec<MarketplaceOrigin>> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(
            "SELECT versioned_id, marketplace_id, version, installed_at, source_url \
             FROM marketplace_origins ORDER BY versioned_id",
        )?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?;
        let mut origins = Vec::new();
        for row in rows {
            origins.push(origin_from_row(row?)?);
        }
        Ok(origins)
    }
}
