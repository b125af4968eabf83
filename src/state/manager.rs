//! State manager implementation
//!
//! Persists subtask runs in the ETL database. Rows are never deleted; the
//! resume state of a subtask is looked up from its most recent eligible run.

use super::types::{State, SubtaskRun};
use crate::config::ResumeFrom;
use crate::error::{Error, Result};
use crate::storage::{now_string, parse_timestamp, Storage};
use duckdb::params;
use tracing::debug;

/// Table holding one row per subtask execution
pub const SUBTASK_RUNS_TABLE: &str = "_devlake_subtask_runs";

const COLUMNS: &str = "id, subtask_name, connection_id, started, completed, checkpointed_at, state";

type RunColumns = (i64, String, i64, String, Option<String>, Option<String>, String);

/// Bookkeeping for subtask runs
#[derive(Debug, Clone)]
pub struct StateManager {
    storage: Storage,
}

impl StateManager {
    /// Create a state manager, creating the run table if needed
    pub fn new(storage: Storage) -> Result<Self> {
        storage.ensure(SUBTASK_RUNS_TABLE, || {
            format!(
                "CREATE SEQUENCE IF NOT EXISTS {SUBTASK_RUNS_TABLE}_id_seq;
                 CREATE TABLE IF NOT EXISTS {SUBTASK_RUNS_TABLE} (
                     id BIGINT PRIMARY KEY DEFAULT nextval('{SUBTASK_RUNS_TABLE}_id_seq'),
                     subtask_name VARCHAR NOT NULL,
                     connection_id BIGINT NOT NULL,
                     started VARCHAR NOT NULL,
                     completed VARCHAR,
                     checkpointed_at VARCHAR,
                     state VARCHAR NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS {SUBTASK_RUNS_TABLE}_lookup
                     ON {SUBTASK_RUNS_TABLE} (subtask_name, connection_id);"
            )
        })?;
        Ok(Self { storage })
    }

    /// The storage this manager writes to
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Record the start of a run and return its id.
    ///
    /// Must be called outside a transaction so the row survives a rollback.
    pub fn start_run(&self, subtask_name: &str, connection_id: i64) -> Result<i64> {
        if self.storage.in_transaction() {
            return Err(Error::state("a run must be started outside a transaction"));
        }
        let sql = format!(
            "INSERT INTO {SUBTASK_RUNS_TABLE} (subtask_name, connection_id, started, state)
             VALUES (?, ?, ?, '{{}}') RETURNING id"
        );
        let id: i64 = self.storage.with_conn(|conn| {
            Ok(conn.query_row(
                &sql,
                params![subtask_name, connection_id, now_string()],
                |row| row.get(0),
            )?)
        })?;
        debug!(subtask = subtask_name, connection_id, run_id = id, "Started run");
        Ok(id)
    }

    /// State to resume from, or an empty state when no eligible run exists.
    ///
    /// `exclude_run` is the run currently executing.
    pub fn resume_state(
        &self,
        policy: ResumeFrom,
        subtask_name: &str,
        connection_id: i64,
        exclude_run: Option<i64>,
    ) -> Result<State> {
        let eligible = match policy {
            ResumeFrom::LastCompletedRun => "completed IS NOT NULL",
            ResumeFrom::LastCheckpoint => "(completed IS NOT NULL OR checkpointed_at IS NOT NULL)",
        };
        let sql = format!(
            "SELECT state FROM {SUBTASK_RUNS_TABLE}
             WHERE subtask_name = ? AND connection_id = ? AND id <> ? AND {eligible}
             ORDER BY started DESC, id DESC LIMIT 1"
        );
        let exclude = exclude_run.unwrap_or(-1);
        let state: Option<String> = self.storage.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let state = stmt
                .query_map(params![subtask_name, connection_id, exclude], |row| {
                    row.get::<_, String>(0)
                })?
                .next()
                .transpose()?;
            Ok(state)
        })?;
        match state {
            Some(json) => decode_state(&json),
            None => Ok(State::new()),
        }
    }

    /// Persist mid-run state
    pub fn checkpoint(&self, run_id: i64, state: &State) -> Result<()> {
        let sql = format!(
            "UPDATE {SUBTASK_RUNS_TABLE} SET state = ?, checkpointed_at = ? WHERE id = ?"
        );
        let updated = self.storage.with_conn(|conn| {
            Ok(conn.execute(&sql, params![state.to_json(), now_string(), run_id])?)
        })?;
        if updated == 0 {
            return Err(Error::checkpoint(format!("run {run_id} does not exist")));
        }
        Ok(())
    }

    /// Persist the final state and mark the run completed
    pub fn complete(&self, run_id: i64, state: &State) -> Result<()> {
        let sql = format!("UPDATE {SUBTASK_RUNS_TABLE} SET state = ?, completed = ? WHERE id = ?");
        let updated = self.storage.with_conn(|conn| {
            Ok(conn.execute(&sql, params![state.to_json(), now_string(), run_id])?)
        })?;
        if updated == 0 {
            return Err(Error::state(format!("run {run_id} does not exist")));
        }
        Ok(())
    }

    /// Look up one run
    pub fn get_run(&self, run_id: i64) -> Result<Option<SubtaskRun>> {
        let sql = format!("SELECT {COLUMNS} FROM {SUBTASK_RUNS_TABLE} WHERE id = ?");
        let row = self.storage.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt
                .query_map(params![run_id], read_run_columns)?
                .next()
                .transpose()?;
            Ok(row)
        })?;
        row.map(decode_run).transpose()
    }

    /// Runs of a subtask for a connection, newest first
    pub fn runs(&self, subtask_name: &str, connection_id: i64) -> Result<Vec<SubtaskRun>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {SUBTASK_RUNS_TABLE}
             WHERE subtask_name = ? AND connection_id = ?
             ORDER BY started DESC, id DESC"
        );
        let rows = self.storage.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![subtask_name, connection_id], read_run_columns)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(decode_run).collect()
    }
}

fn read_run_columns(row: &duckdb::Row<'_>) -> duckdb::Result<RunColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_state(json: &str) -> Result<State> {
    serde_json::from_str(json).map_err(|e| Error::state(format!("Failed to parse state: {e}")))
}

fn decode_run(columns: RunColumns) -> Result<SubtaskRun> {
    let (id, subtask_name, connection_id, started, completed, checkpointed_at, state) = columns;
    Ok(SubtaskRun {
        id,
        subtask_name,
        connection_id,
        started: parse_timestamp(&started)?,
        completed: completed.as_deref().map(parse_timestamp).transpose()?,
        checkpointed_at: checkpointed_at.as_deref().map(parse_timestamp).transpose()?,
        state: decode_state(&state)?,
    })
}
