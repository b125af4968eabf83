//! DuckDB-backed storage for raw, tool and domain tables
//!
//! A single connection behind a mutex. The lock is held for one statement at
//! a time and never across an await point. Transactions are explicit:
//! callers `begin`, `commit` and `rollback`; everything else autocommits.
//!
//! Clones share the connection and its transaction. Subtask runs take the
//! handle's run lock for their whole duration, so runs sharing a handle are
//! serialised and never see each other's open transaction.

use crate::error::{Error, Result};
use crate::model::{natural_key, DomainRow, RawOrigin, RawRecord, ToolRow};
use crate::types::JsonValue;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

static IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// Check that `name` is safe to splice into SQL as a table name
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.as_ref().is_some_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Current time as stored in timestamp columns (fixed width, so it sorts)
pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp column
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::storage(format!("invalid timestamp '{value}': {e}")))
}

struct Inner {
    conn: Connection,
    known_tables: HashSet<String>,
    in_transaction: bool,
}

/// Handle to the ETL database; cheap to clone
#[derive(Clone)]
pub struct Storage {
    inner: Arc<Mutex<Inner>>,
    run_lock: Arc<AsyncMutex<()>>,
}

impl Storage {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }
        let conn = Connection::open(path).map_err(|e| {
            Error::storage(format!("Failed to open database {}: {e}", path.display()))
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("Failed to create DuckDB connection: {e}")))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                known_tables: HashSet::new(),
                in_transaction: false,
            })),
            run_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Exclusive use of the handle's transaction until the guard drops
    pub async fn lock_run(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.run_lock).lock_owned().await
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::storage("storage lock poisoned"))
    }

    /// Run a closure against the raw connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let inner = self.lock()?;
        f(&inner.conn)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction
    pub fn begin(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.in_transaction {
            return Err(Error::storage("transaction already open"));
        }
        inner.conn.execute_batch("BEGIN TRANSACTION")?;
        inner.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.in_transaction {
            return Err(Error::storage("no transaction to commit"));
        }
        inner.in_transaction = false;
        inner.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Roll back the open transaction; a no-op when none is open
    pub fn rollback(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.in_transaction {
            return Ok(());
        }
        inner.in_transaction = false;
        // Tables created inside the transaction are gone now.
        inner.known_tables.clear();
        inner.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.lock().map(|inner| inner.in_transaction).unwrap_or(false)
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Run `ddl` once per handle for `table`
    pub(crate) fn ensure(&self, table: &str, ddl: impl FnOnce() -> String) -> Result<()> {
        validate_identifier(table)?;
        let mut inner = self.lock()?;
        if inner.known_tables.contains(table) {
            return Ok(());
        }
        inner.conn.execute_batch(&ddl())?;
        inner.known_tables.insert(table.to_string());
        debug!(table, "Ensured table");
        Ok(())
    }

    /// Create a raw table and its id sequence if missing
    pub fn ensure_raw_table(&self, table: &str) -> Result<()> {
        self.ensure(table, || {
            format!(
                "CREATE SEQUENCE IF NOT EXISTS {table}_id_seq;
                 CREATE TABLE IF NOT EXISTS {table} (
                     id BIGINT PRIMARY KEY DEFAULT nextval('{table}_id_seq'),
                     params VARCHAR NOT NULL,
                     data BLOB NOT NULL,
                     url VARCHAR,
                     input VARCHAR,
                     created_at VARCHAR NOT NULL
                 );"
            )
        })
    }

    /// Create a tool table if missing
    pub fn ensure_tool_table(&self, table: &str) -> Result<()> {
        self.ensure(table, || {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     connection_id BIGINT NOT NULL,
                     natural_key VARCHAR NOT NULL,
                     data VARCHAR NOT NULL,
                     raw_data_params VARCHAR,
                     raw_data_table VARCHAR,
                     raw_data_id BIGINT,
                     created_at VARCHAR NOT NULL,
                     updated_at VARCHAR NOT NULL,
                     PRIMARY KEY (connection_id, natural_key)
                 );"
            )
        })
    }

    /// Create a domain table if missing
    pub fn ensure_domain_table(&self, table: &str) -> Result<()> {
        self.ensure(table, || {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     id VARCHAR PRIMARY KEY,
                     data VARCHAR NOT NULL,
                     raw_data_params VARCHAR,
                     raw_data_table VARCHAR,
                     raw_data_id BIGINT,
                     created_at VARCHAR NOT NULL,
                     updated_at VARCHAR NOT NULL
                 );"
            )
        })
    }

    /// Whether a table exists in the database
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                params![table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // ========================================================================
    // Raw layer
    // ========================================================================

    /// Append a raw payload and return its id
    pub fn insert_raw(
        &self,
        table: &str,
        params: &str,
        data: &[u8],
        url: Option<&str>,
        input: Option<&str>,
    ) -> Result<i64> {
        validate_identifier(table)?;
        let sql = format!(
            "INSERT INTO {table} (params, data, url, input, created_at)
             VALUES (?, ?, ?, ?, ?) RETURNING id"
        );
        self.with_conn(|conn| {
            let id = conn.query_row(
                &sql,
                params![params, data, url, input, now_string()],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Delete every raw row of a partition
    pub fn delete_raw(&self, table: &str, params: &str) -> Result<usize> {
        validate_identifier(table)?;
        let sql = format!("DELETE FROM {table} WHERE params = ?");
        self.with_conn(|conn| Ok(conn.execute(&sql, params![params])?))
    }

    /// Raw rows of a partition with `id > after_id`, in id order
    pub fn raw_page(
        &self,
        table: &str,
        params: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RawRecord>> {
        validate_identifier(table)?;
        let sql = format!(
            "SELECT id, params, data, url, input, created_at FROM {table}
             WHERE params = ? AND id > ? ORDER BY id LIMIT ?"
        );
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![params, after_id, limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, params, data, url, input, created_at)| {
                Ok(RawRecord {
                    id,
                    params,
                    data,
                    url,
                    input,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    /// Number of raw rows in a partition
    pub fn count_raw(&self, table: &str, params: &str) -> Result<u64> {
        self.count_where(table, "params", params)
    }

    // ========================================================================
    // Tool layer
    // ========================================================================

    /// Insert or update a tool row by `(connection_id, natural_key)`
    pub fn upsert_tool(&self, table: &str, row: &ToolRow) -> Result<()> {
        validate_identifier(table)?;
        let sql = format!(
            "INSERT INTO {table}
                 (connection_id, natural_key, data, raw_data_params, raw_data_table,
                  raw_data_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (connection_id, natural_key) DO UPDATE SET
                 data = excluded.data,
                 raw_data_params = excluded.raw_data_params,
                 raw_data_table = excluded.raw_data_table,
                 raw_data_id = excluded.raw_data_id,
                 updated_at = excluded.updated_at"
        );
        let data = serde_json::to_string(&row.data)?;
        let now = now_string();
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                params![
                    row.connection_id,
                    natural_key(&row.natural_key),
                    data,
                    row.origin.raw_data_params,
                    row.origin.raw_data_table,
                    row.origin.raw_data_id,
                    now,
                    now
                ],
            )?;
            Ok(())
        })
    }

    /// Tool rows of a partition with `natural_key > after_key`, in key order
    pub fn tool_page(
        &self,
        table: &str,
        params: &str,
        after_key: &str,
        limit: usize,
    ) -> Result<Vec<(String, ToolRow)>> {
        validate_identifier(table)?;
        let sql = format!(
            "SELECT connection_id, natural_key, data, raw_data_params, raw_data_table, raw_data_id
             FROM {table}
             WHERE raw_data_params = ? AND natural_key > ?
             ORDER BY natural_key LIMIT ?"
        );
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![params, after_key, limit as i64], read_tool_columns)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(decode_tool_row).collect()
    }

    /// Look up one tool row
    pub fn find_tool(
        &self,
        table: &str,
        connection_id: i64,
        key: &[String],
    ) -> Result<Option<ToolRow>> {
        validate_identifier(table)?;
        let sql = format!(
            "SELECT connection_id, natural_key, data, raw_data_params, raw_data_table, raw_data_id
             FROM {table} WHERE connection_id = ? AND natural_key = ?"
        );
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt
                .query_map(params![connection_id, natural_key(key)], read_tool_columns)?
                .next()
                .transpose()?;
            Ok(row)
        })?;
        row.map(|r| decode_tool_row(r).map(|(_, row)| row))
            .transpose()
    }

    /// Delete every tool row of a partition
    pub fn delete_tool(&self, table: &str, params: &str) -> Result<usize> {
        validate_identifier(table)?;
        let sql = format!("DELETE FROM {table} WHERE raw_data_params = ?");
        self.with_conn(|conn| Ok(conn.execute(&sql, params![params])?))
    }

    /// Number of tool rows in a partition
    pub fn count_tool(&self, table: &str, params: &str) -> Result<u64> {
        self.count_where(table, "raw_data_params", params)
    }

    // ========================================================================
    // Domain layer
    // ========================================================================

    /// Insert or update a domain row by id
    pub fn upsert_domain(&self, table: &str, row: &DomainRow) -> Result<()> {
        validate_identifier(table)?;
        let sql = format!(
            "INSERT INTO {table}
                 (id, data, raw_data_params, raw_data_table, raw_data_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 data = excluded.data,
                 raw_data_params = excluded.raw_data_params,
                 raw_data_table = excluded.raw_data_table,
                 raw_data_id = excluded.raw_data_id,
                 updated_at = excluded.updated_at"
        );
        let data = serde_json::to_string(&row.data)?;
        let now = now_string();
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                params![
                    row.id,
                    data,
                    row.origin.raw_data_params,
                    row.origin.raw_data_table,
                    row.origin.raw_data_id,
                    now,
                    now
                ],
            )?;
            Ok(())
        })
    }

    /// Look up one domain row
    pub fn get_domain(&self, table: &str, id: &str) -> Result<Option<DomainRow>> {
        validate_identifier(table)?;
        let sql = format!(
            "SELECT id, data, raw_data_params, raw_data_table, raw_data_id
             FROM {table} WHERE id = ?"
        );
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt
                .query_map(params![id], read_domain_columns)?
                .next()
                .transpose()?;
            Ok(row)
        })?;
        row.map(decode_domain_row).transpose()
    }

    /// Every row of a domain table, in id order
    pub fn domain_rows(&self, table: &str) -> Result<Vec<DomainRow>> {
        validate_identifier(table)?;
        let sql = format!(
            "SELECT id, data, raw_data_params, raw_data_table, raw_data_id
             FROM {table} ORDER BY id"
        );
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], read_domain_columns)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(decode_domain_row).collect()
    }

    /// Number of rows in a domain table
    pub fn count_domain(&self, table: &str) -> Result<u64> {
        validate_identifier(table)?;
        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn count_where(&self, table: &str, column: &str, value: &str) -> Result<u64> {
        validate_identifier(table)?;
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?");
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(&sql, params![value], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

type ToolColumns = (i64, String, String, Option<String>, Option<String>, Option<i64>);
type DomainColumns = (String, String, Option<String>, Option<String>, Option<i64>);

fn read_tool_columns(row: &duckdb::Row<'_>) -> duckdb::Result<ToolColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn read_domain_columns(row: &duckdb::Row<'_>) -> duckdb::Result<DomainColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_tool_row(columns: ToolColumns) -> Result<(String, ToolRow)> {
    let (connection_id, key, data, raw_data_params, raw_data_table, raw_data_id) = columns;
    let natural_key: Vec<String> = serde_json::from_str(&key)?;
    let data: JsonValue = serde_json::from_str(&data)?;
    Ok((
        key,
        ToolRow {
            connection_id,
            natural_key,
            data,
            origin: RawOrigin {
                raw_data_params,
                raw_data_table,
                raw_data_id,
            },
        },
    ))
}

fn decode_domain_row(columns: DomainColumns) -> Result<DomainRow> {
    let (id, data, raw_data_params, raw_data_table, raw_data_id) = columns;
    Ok(DomainRow {
        id,
        data: serde_json::from_str(&data)?,
        origin: RawOrigin {
            raw_data_params,
            raw_data_table,
            raw_data_id,
        },
    })
}
