//! Enrolled-embedding store: one row per stored vector.

use crate::db::StoreError;
use chrono::Local;
use rollcall_core::{Embedding, GalleryEntry};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Store of enrolled face embeddings, keyed by identity.
///
/// Write path: enrollment only. Read path: the full-scan gallery used by the
/// matcher. Rows are returned in insertion order, which is what the
/// matcher's tie-break is defined over.
#[derive(Clone)]
pub struct FaceStore {
    conn: Arc<Mutex<Connection>>,
}

impl FaceStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Store all embeddings for an identity in one transaction.
    ///
    /// Fails with [`StoreError::AlreadyRegistered`] if the identity already
    /// has rows — one registration call per identity.
    pub fn put(&self, identity: &str, embeddings: &[Embedding]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM faces WHERE identity = ?1",
            params![identity],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(StoreError::AlreadyRegistered(identity.to_string()));
        }

        let created_at = Local::now().to_rfc3339();
        for embedding in embeddings {
            tx.execute(
                "INSERT INTO faces (identity, embedding, model_version, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    identity,
                    serde_json::to_string(&embedding.values)?,
                    embedding.model_version,
                    created_at,
                ],
            )?;
        }
        tx.commit()?;

        tracing::info!(identity, count = embeddings.len(), "embeddings stored");
        Ok(())
    }

    /// Every stored `(identity, embedding)` pair, one per vector, in
    /// insertion order.
    pub fn all(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT identity, embedding, model_version FROM faces ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut gallery = Vec::new();
        for row in rows {
            let (identity, values_json, model_version) = row?;
            let values: Vec<f32> = serde_json::from_str(&values_json)
                .map_err(|e| StoreError::CorruptRow(format!("{identity}: {e}")))?;
            gallery.push(GalleryEntry {
                identity,
                embedding: Embedding {
                    values,
                    model_version,
                },
            });
        }
        Ok(gallery)
    }

    /// Whether the identity has any stored embeddings.
    pub fn contains(&self, identity: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM faces WHERE identity = ?1 LIMIT 1",
                params![identity],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    /// Number of identities with at least one stored embedding.
    pub fn identity_count(&self) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row(
            "SELECT COUNT(DISTINCT identity) FROM faces",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total number of stored vectors.
    pub fn vector_count(&self) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding {
            values,
            model_version: Some("mbf_128".into()),
        }
    }

    #[test]
    fn test_put_and_all_roundtrip() {
        let db = Database::in_memory().unwrap();
        let store = db.face_store();

        store.put("S100", &[emb(vec![0.1, 0.2])]).unwrap();
        store
            .put("S200", &[emb(vec![0.3, 0.4]), emb(vec![0.5, 0.6])])
            .unwrap();

        let gallery = store.all().unwrap();
        assert_eq!(gallery.len(), 3);
        // Insertion order preserved, identity repeated per vector.
        assert_eq!(gallery[0].identity, "S100");
        assert_eq!(gallery[1].identity, "S200");
        assert_eq!(gallery[2].identity, "S200");
        assert_eq!(gallery[1].embedding.values, vec![0.3, 0.4]);
        assert_eq!(gallery[2].embedding.model_version.as_deref(), Some("mbf_128"));
    }

    #[test]
    fn test_put_rejects_second_registration() {
        let db = Database::in_memory().unwrap();
        let store = db.face_store();

        store.put("S100", &[emb(vec![0.1, 0.2])]).unwrap();
        let result = store.put("S100", &[emb(vec![0.9, 0.9])]);
        assert!(matches!(result, Err(StoreError::AlreadyRegistered(id)) if id == "S100"));

        // The rejected call must not have written anything.
        assert_eq!(store.vector_count().unwrap(), 1);
    }

    #[test]
    fn test_empty_store() {
        let db = Database::in_memory().unwrap();
        let store = db.face_store();
        assert!(store.all().unwrap().is_empty());
        assert!(!store.contains("S100").unwrap());
        assert_eq!(store.identity_count().unwrap(), 0);
    }

    #[test]
    fn test_contains_and_counts() {
        let db = Database::in_memory().unwrap();
        let store = db.face_store();

        store
            .put("S100", &[emb(vec![0.1]), emb(vec![0.2])])
            .unwrap();
        store.put("S200", &[emb(vec![0.3])]).unwrap();

        assert!(store.contains("S100").unwrap());
        assert!(!store.contains("S300").unwrap());
        assert_eq!(store.identity_count().unwrap(), 2);
        assert_eq!(store.vector_count().unwrap(), 3);
    }
}
