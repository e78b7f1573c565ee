//! StateStore: redb-backed persistence for deployment state and reports.
//!
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::DeploymentState;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(REPORTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Deployment state ───────────────────────────────────────────

    /// Current state of a target, or a fresh one if it was never written.
    pub fn deployment(&self, target: &str) -> StateResult<DeploymentState> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(target).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Ok(DeploymentState::new(target)),
        }
    }

    /// Commit `next` if the stored revision is still `expected_revision`.
    ///
    /// The compare and the write happen inside one write transaction, so
    /// a slot write plus pointer flip is all-or-nothing.
    pub fn commit_deployment(
        &self,
        expected_revision: u64,
        next: &DeploymentState,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(next).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let found = match table.get(next.target.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let current: DeploymentState =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    current.revision
                }
                None => 0,
            };
            if found != expected_revision {
                return Err(StateError::Conflict {
                    target: next.target.clone(),
                    expected: expected_revision,
                    found,
                });
            }
            table
                .insert(next.target.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            target = %next.target,
            revision = next.revision,
            live = %next.live,
            "deployment state committed"
        );
        Ok(())
    }

    /// List the state of every target ever written.
    pub fn list_deployments(&self) -> StateResult<Vec<DeploymentState>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Insert or replace a rollout report.
    pub fn put_report<T: Serialize>(&self, pipeline_id: &str, report: &T) -> StateResult<()> {
        let value = serde_json::to_vec(report).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REPORTS).map_err(map_err!(Table))?;
            table
                .insert(pipeline_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pipeline_id, "rollout report stored");
        Ok(())
    }

    pub fn get_report<T: DeserializeOwned>(&self, pipeline_id: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REPORTS).map_err(map_err!(Table))?;
        match table.get(pipeline_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }

    /// All stored reports, ordered by pipeline id.
    pub fn list_reports<T: DeserializeOwned>(&self) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REPORTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }
}
