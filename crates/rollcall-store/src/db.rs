use crate::faces::FaceStore;
use crate::ledger::AttendanceLedger;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("identity {0} already has registered face embeddings")]
    AlreadyRegistered(String),
    #[error("embedding serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS faces (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    identity      TEXT NOT NULL,
    embedding     TEXT NOT NULL,
    model_version TEXT,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_faces_identity ON faces(identity);

CREATE TABLE IF NOT EXISTS attendance (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL,
    date     TEXT NOT NULL,
    time     TEXT NOT NULL,
    status   TEXT NOT NULL DEFAULT 'present',
    UNIQUE(identity, date)
);
CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date);
";

/// Shared handle to the SQLite database.
///
/// All store handles clone the same `Mutex<Connection>`; operations are fast
/// key-based lookups and writes, so one serialized connection is sufficient.
/// Writers racing from a second connection (or process) are still correct:
/// the attendance uniqueness lives in the schema, not in this lock.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            // Ignore failure here: open() below reports the real error.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!(path = %path.display(), "database opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn face_store(&self) -> FaceStore {
        FaceStore::new(self.conn.clone())
    }

    pub fn ledger(&self) -> AttendanceLedger {
        AttendanceLedger::new(self.conn.clone())
    }
}
