//! Persistent node state: announced protocol parameter changes, confirmed
//! milestones and the ledger index.
//!
//! Uses SQLite with WAL mode so status readers never wait on the writer for
//! long. The connection sits behind a mutex, making the store shareable
//! between the confirmation pipeline and the parameters manager.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use tangle_protocol::{Milestone, MilestoneIndex, ProtocolParameters, ProtocolParamsMilestoneOpt};
use tracing::debug;

use crate::params::{MilestoneSource, ParamsStore};

const CURRENT_SCHEMA_VERSION: i32 = 1;
const IN_MEMORY: &str = ":memory:";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode protocol parameters: {0}")]
    Encode(#[from] tangle_protocol::CodecError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub change_count: i64,
    pub milestone_count: i64,
    pub ledger_index: Option<MilestoneIndex>,
    pub last_confirmed_at: Option<i64>,
    pub size_bytes: u64,
}

impl StoreStats {
    pub fn size_formatted(&self) -> String {
        bytesize::ByteSize(self.size_bytes).to_string()
    }
}

pub struct NodeStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl NodeStore {
    /// Open or create the node database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=FULL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        Self::with_connection(conn, path.to_path_buf())
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, PathBuf::from(IN_MEMORY))
    }

    fn with_connection(mut conn: Connection, path: PathBuf) -> Result<Self> {
        initialize_schema(&mut conn)?;
        debug!(path = ?path, "Node store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size_bytes(&self) -> Result<u64> {
        if self.path.to_string_lossy() == IN_MEMORY {
            return Ok(0);
        }
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Writes `params` as the change effective from index 0 if no change has
    /// ever been stored. Returns whether anything was written.
    pub fn seed_genesis(&self, params: &ProtocolParameters) -> Result<bool> {
        let conn = self.conn();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM protocol_changes", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(false);
        }

        let genesis = ProtocolParamsMilestoneOpt::new(0, params)?;
        insert_change(&conn, &genesis)?;
        Ok(true)
    }

    /// Records a confirmed milestone. Re-recording the same index overwrites it.
    pub fn insert_milestone(&self, milestone: &Milestone) -> Result<()> {
        let opt = milestone.protocol_params();
        self.conn().execute(
            "INSERT OR REPLACE INTO milestones (idx, timestamp, pp_target, pp_version, pp_params)
             VALUES (?, ?, ?, ?, ?)",
            params![
                milestone.index,
                milestone.timestamp,
                opt.map(|o| o.target_milestone_index),
                opt.map(|o| o.protocol_version),
                opt.map(|o| o.params.as_slice()),
            ],
        )?;
        Ok(())
    }

    pub fn has_change(&self, change: &ProtocolParamsMilestoneOpt) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM protocol_changes
                 WHERE target_index = ? AND protocol_version = ? AND params = ?",
                params![
                    change.target_milestone_index,
                    change.protocol_version,
                    change.params.as_slice(),
                ],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn ledger_index(&self) -> Result<Option<MilestoneIndex>> {
        let index = self
            .conn()
            .query_row("SELECT ledger_index FROM ledger_state LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(index)
    }

    pub fn set_ledger_index(&self, index: MilestoneIndex, confirmed_at: i64) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM ledger_state", [])?;
        tx.execute(
            "INSERT INTO ledger_state (ledger_index, confirmed_at) VALUES (?, ?)",
            params![index, confirmed_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let (change_count, milestone_count, ledger) = {
            let conn = self.conn();
            let change_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM protocol_changes", [], |row| row.get(0))?;
            let milestone_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM milestones", [], |row| row.get(0))?;
            let ledger: Option<(MilestoneIndex, i64)> = conn
                .query_row(
                    "SELECT ledger_index, confirmed_at FROM ledger_state LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            (change_count, milestone_count, ledger)
        };

        Ok(StoreStats {
            change_count,
            milestone_count,
            ledger_index: ledger.map(|(index, _)| index),
            last_confirmed_at: ledger.map(|(_, at)| at),
            size_bytes: self.size_bytes()?,
        })
    }
}

impl ParamsStore for NodeStore {
    fn load_effective_parameters(&self, ledger_index: MilestoneIndex) -> Result<Option<Vec<u8>>> {
        let params = self
            .conn()
            .query_row(
                "SELECT params FROM protocol_changes
                 WHERE target_index <= ?
                 ORDER BY target_index DESC, id DESC
                 LIMIT 1",
                [ledger_index],
                |row| row.get(0),
            )
            .optional()?;
        Ok(params)
    }

    fn append_change(&self, change: &ProtocolParamsMilestoneOpt) -> Result<()> {
        insert_change(&self.conn(), change)
    }

    fn for_each_change(
        &self,
        visitor: &mut dyn FnMut(ProtocolParamsMilestoneOpt) -> ControlFlow<()>,
    ) -> Result<()> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT target_index, protocol_version, params
             FROM protocol_changes
             ORDER BY id ASC",
        )?;

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let change = ProtocolParamsMilestoneOpt {
                target_milestone_index: row.get(0)?,
                protocol_version: row.get(1)?,
                params: row.get(2)?,
            };
            if visitor(change).is_break() {
                break;
            }
        }
        Ok(())
    }
}

impl MilestoneSource for NodeStore {
    fn milestone_by_index(&self, index: MilestoneIndex) -> Result<Option<Milestone>> {
        let milestone = self
            .conn()
            .query_row(
                "SELECT idx, timestamp, pp_target, pp_version, pp_params
                 FROM milestones WHERE idx = ?",
                [index],
                |row| {
                    let target: Option<MilestoneIndex> = row.get(2)?;
                    let version: Option<u8> = row.get(3)?;
                    let params: Option<Vec<u8>> = row.get(4)?;
                    let protocol_params = match (target, version, params) {
                        (Some(target), Some(version), Some(params)) => {
                            Some(ProtocolParamsMilestoneOpt {
                                target_milestone_index: target,
                                protocol_version: version,
                                params,
                            })
                        }
                        _ => None,
                    };
                    Ok(Milestone {
                        index: row.get(0)?,
                        timestamp: row.get(1)?,
                        protocol_params,
                    })
                },
            )
            .optional()?;
        Ok(milestone)
    }
}

fn insert_change(conn: &Connection, change: &ProtocolParamsMilestoneOpt) -> Result<()> {
    // identical announcements collapse so replays stay idempotent on disk
    conn.execute(
        "INSERT OR IGNORE INTO protocol_changes (target_index, protocol_version, params)
         VALUES (?, ?, ?)",
        params![
            change.target_milestone_index,
            change.protocol_version,
            change.params,
        ],
    )?;
    Ok(())
}

fn initialize_schema(conn: &mut Connection) -> Result<()> {
    let version = schema_version(conn)?;

    if version == 0 {
        create_initial_schema(conn)?;
    } else if version < CURRENT_SCHEMA_VERSION {
        run_migrations(conn, version)?;
    }

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

fn create_initial_schema(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        r#"
        CREATE TABLE schema_version (
            version INTEGER NOT NULL
        );

        -- Announced parameter changes, in the order they were confirmed
        CREATE TABLE protocol_changes (
            id INTEGER PRIMARY KEY,
            target_index INTEGER NOT NULL,
            protocol_version INTEGER NOT NULL,
            params BLOB NOT NULL,
            UNIQUE(target_index, protocol_version, params)
        );

        CREATE TABLE milestones (
            idx INTEGER PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            pp_target INTEGER,
            pp_version INTEGER,
            pp_params BLOB
        );

        -- Single row
        CREATE TABLE ledger_state (
            ledger_index INTEGER NOT NULL,
            confirmed_at INTEGER NOT NULL
        );

        CREATE INDEX idx_protocol_changes_target ON protocol_changes(target_index);
        "#,
    )?;

    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    tx.commit()?;
    Ok(())
}

fn run_migrations(conn: &mut Connection, from_version: i32) -> Result<()> {
    debug!(from_version, to_version = CURRENT_SCHEMA_VERSION, "Migrating node store");
    let tx = conn.transaction()?;

    tx.execute(
        "UPDATE schema_version SET version = ?",
        [CURRENT_SCHEMA_VERSION],
    )?;

    tx.commit()?;
    Ok(())
}
