//! SQLite-backed bundle store implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Bundle, BundleError, BundleFile, BundleStore, NewBundle, NewFile, Period};
use crate::provider::Provider;

/// SQLite-backed bundle store with one table pair per provider.
pub struct SqliteBundleStore {
    conn: Mutex<Connection>,
    held: Mutex<HashSet<(Provider, i64)>>,
}

impl SqliteBundleStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, BundleError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            held: Mutex::new(HashSet::new()),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, BundleError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            held: Mutex::new(HashSet::new()),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), BundleError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        for provider in Provider::ALL {
            let p = provider.table_prefix();
            let (cycle_column, unique_key) = if provider.has_cycle() {
                (
                    "cycle TEXT NOT NULL DEFAULT '',",
                    "period_year, period_month, cycle",
                )
            } else {
                ("", "period_year, period_month")
            };

            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {p}_bundles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    period_month INTEGER NOT NULL,
                    period_year INTEGER NOT NULL,
                    {cycle_column}
                    is_ready_for_build INTEGER NOT NULL DEFAULT 0,
                    is_build_complete INTEGER NOT NULL DEFAULT 0,
                    UNIQUE({unique_key})
                );

                CREATE TABLE IF NOT EXISTS {p}_files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    bundle_id INTEGER NOT NULL REFERENCES {p}_bundles(id) ON DELETE CASCADE,
                    file_name TEXT NOT NULL,
                    size TEXT NOT NULL,
                    period_month INTEGER NOT NULL,
                    period_year INTEGER NOT NULL,
                    on_disk INTEGER NOT NULL DEFAULT 0,
                    date_downloaded TEXT,
                    UNIQUE(bundle_id, file_name)
                );

                CREATE INDEX IF NOT EXISTS idx_{p}_files_bundle ON {p}_files(bundle_id);
                "#
            ))?;
        }

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BundleError> {
        self.conn
            .lock()
            .map_err(|_| BundleError::StoreUnavailable("connection lock poisoned".to_string()))
    }

    fn held(&self) -> Result<MutexGuard<'_, HashSet<(Provider, i64)>>, BundleError> {
        self.held
            .lock()
            .map_err(|_| BundleError::StoreUnavailable("hold set lock poisoned".to_string()))
    }

    fn cycle_select(provider: Provider) -> &'static str {
        if provider.has_cycle() {
            "cycle"
        } else {
            "''"
        }
    }

    fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
        value
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Load files for a bundle, in insertion order.
    fn load_files(
        conn: &Connection,
        provider: Provider,
        bundle_id: i64,
    ) -> Result<Vec<BundleFile>, BundleError> {
        let p = provider.table_prefix();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, bundle_id, file_name, size, period_month, period_year, on_disk, date_downloaded
             FROM {p}_files WHERE bundle_id = ? ORDER BY id ASC"
        ))?;

        let rows = stmt.query_map(params![bundle_id], |row| {
            Ok(BundleFile {
                id: row.get(0)?,
                bundle_id: row.get(1)?,
                file_name: row.get(2)?,
                size: row.get(3)?,
                month: row.get(4)?,
                year: row.get(5)?,
                on_disk: row.get(6)?,
                date_downloaded: Self::parse_timestamp(row.get(7)?),
            })
        })?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Query bundles (without files) matching a WHERE clause.
    fn query_bundles(
        conn: &Connection,
        provider: Provider,
        where_clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Bundle>, BundleError> {
        let p = provider.table_prefix();
        let cycle = Self::cycle_select(provider);
        let mut stmt = conn.prepare(&format!(
            "SELECT id, period_month, period_year, {cycle}, is_ready_for_build, is_build_complete
             FROM {p}_bundles WHERE {where_clause}
             ORDER BY period_year ASC, period_month ASC, {cycle} ASC, id ASC"
        ))?;

        let rows = stmt.query_map(args, |row| {
            let cycle: String = row.get(3)?;
            Ok(Bundle {
                id: row.get(0)?,
                provider,
                period: Period {
                    month: row.get(1)?,
                    year: row.get(2)?,
                    cycle: if cycle.is_empty() { None } else { Some(cycle) },
                },
                is_ready_for_build: row.get(4)?,
                is_build_complete: row.get(5)?,
                files: Vec::new(),
            })
        })?;

        let mut bundles = Vec::new();
        for row in rows {
            let mut bundle = row?;
            bundle.files = Self::load_files(conn, provider, bundle.id)?;
            bundles.push(bundle);
        }
        Ok(bundles)
    }

    fn fetch_bundle(conn: &Connection, provider: Provider, id: i64) -> Result<Bundle, BundleError> {
        Self::query_bundles(conn, provider, "id = ?", &[&id])?
            .pop()
            .ok_or(BundleError::NotFound { provider, id })
    }

    fn write_file(
        conn: &Connection,
        provider: Provider,
        bundle_id: i64,
        file: &NewFile,
    ) -> Result<(), BundleError> {
        let p = provider.table_prefix();
        conn.execute(
            &format!(
                "INSERT INTO {p}_files (bundle_id, file_name, size, period_month, period_year, on_disk, date_downloaded)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(bundle_id, file_name) DO UPDATE SET
                    size = excluded.size,
                    period_month = excluded.period_month,
                    period_year = excluded.period_year,
                    on_disk = excluded.on_disk,
                    date_downloaded = COALESCE(date_downloaded, excluded.date_downloaded)"
            ),
            params![
                bundle_id,
                &file.file_name,
                &file.size,
                file.month,
                file.year,
                file.on_disk,
                file.date_downloaded.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }
}

impl BundleStore for SqliteBundleStore {
    fn list_ready_bundles(&self, provider: Provider) -> Result<Vec<Bundle>, BundleError> {
        let conn = self.conn()?;
        Self::query_bundles(
            &conn,
            provider,
            "is_ready_for_build = 1 AND is_build_complete = 0",
            &[],
        )
    }

    fn list_bundles(&self, provider: Provider) -> Result<Vec<Bundle>, BundleError> {
        let conn = self.conn()?;
        Self::query_bundles(&conn, provider, "1 = 1", &[])
    }

    fn get_bundle(&self, provider: Provider, id: i64) -> Result<Bundle, BundleError> {
        let conn = self.conn()?;
        Self::fetch_bundle(&conn, provider, id)
    }

    fn insert_bundle(&self, bundle: NewBundle) -> Result<Bundle, BundleError> {
        let provider = bundle.provider;
        let mut period = bundle.period;
        if !period.is_valid() {
            return Err(BundleError::InvalidPeriod(format!(
                "month {} out of range",
                period.month
            )));
        }
        if !provider.has_cycle() {
            period.cycle = None;
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let p = provider.table_prefix();

        let inserted = if provider.has_cycle() {
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {p}_bundles (period_month, period_year, cycle) VALUES (?, ?, ?)"
                ),
                params![period.month, period.year, period.cycle.clone().unwrap_or_default()],
            )?
        } else {
            tx.execute(
                &format!("INSERT OR IGNORE INTO {p}_bundles (period_month, period_year) VALUES (?, ?)"),
                params![period.month, period.year],
            )?
        };

        if inserted == 0 {
            return Err(BundleError::Duplicate { provider, period });
        }

        let id = tx.last_insert_rowid();
        for file in &bundle.files {
            Self::write_file(&tx, provider, id, file)?;
        }
        tx.commit()?;

        Self::fetch_bundle(&conn, provider, id)
    }

    fn upsert_file(
        &self,
        provider: Provider,
        bundle_id: i64,
        file: NewFile,
    ) -> Result<BundleFile, BundleError> {
        let conn = self.conn()?;
        let p = provider.table_prefix();

        let exists = conn
            .query_row(
                &format!("SELECT 1 FROM {p}_bundles WHERE id = ?"),
                params![bundle_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(BundleError::NotFound {
                provider,
                id: bundle_id,
            });
        }

        Self::write_file(&conn, provider, bundle_id, &file)?;

        Self::load_files(&conn, provider, bundle_id)?
            .into_iter()
            .find(|f| f.file_name == file.file_name)
            .ok_or_else(|| {
                BundleError::StoreUnavailable(format!("file {} vanished after upsert", file.file_name))
            })
    }

    fn set_ready_for_build(&self, provider: Provider, id: i64, ready: bool) -> Result<(), BundleError> {
        let held = self.held()?;
        if !ready && held.contains(&(provider, id)) {
            return Err(BundleError::Held { provider, id });
        }

        let conn = self.conn()?;
        let p = provider.table_prefix();
        let updated = conn.execute(
            &format!("UPDATE {p}_bundles SET is_ready_for_build = ? WHERE id = ?"),
            params![ready, id],
        )?;
        if updated == 0 {
            return Err(BundleError::NotFound { provider, id });
        }
        Ok(())
    }

    fn hold(&self, provider: Provider, id: i64) -> Result<(), BundleError> {
        let mut held = self.held()?;
        if held.contains(&(provider, id)) {
            return Err(BundleError::Held { provider, id });
        }

        let conn = self.conn()?;
        let bundle = Self::fetch_bundle(&conn, provider, id)?;
        if bundle.is_build_complete {
            return Err(BundleError::AlreadyComplete { provider, id });
        }

        held.insert((provider, id));
        Ok(())
    }

    fn release(&self, provider: Provider, id: i64) {
        match self.held() {
            Ok(mut held) => {
                held.remove(&(provider, id));
            }
            Err(e) => tracing::warn!("Failed to release {} bundle {}: {}", provider, id, e),
        }
    }

    fn mark_build_complete(&self, provider: Provider, id: i64) -> Result<(), BundleError> {
        let conn = self.conn()?;
        let p = provider.table_prefix();
        let updated = conn.execute(
            &format!("UPDATE {p}_bundles SET is_build_complete = 1 WHERE id = ? AND is_build_complete = 0"),
            params![id],
        )?;

        if updated == 0 {
            // Distinguish a second completion from an unknown id
            Self::fetch_bundle(&conn, provider, id)?;
            return Err(BundleError::AlreadyComplete { provider, id });
        }
        Ok(())
    }
}
