//! SQLite-backed profile store.
//!
//! Each `collection/key` pair is one row holding a JSON document. Paths
//! deeper than two segments are resolved inside that document; a
//! one-segment read assembles the whole collection.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::tree;
use super::{ProfileStore, StoreError};
use crate::db::{self, DatabaseError};

pub struct SqliteProfileStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProfileStore {
    /// Open (or create) the store database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = db::open_database(path)?;
        tracing::info!(path = %path.display(), "Profile store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(db::open_memory_database()?)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = path.to_string();
        self.with_conn(move |conn| read_path(conn, &path)).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = path.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(DatabaseError::from)?;
            write_path(&tx, &path, value)?;
            tx.commit().map_err(DatabaseError::from)?;
            Ok(())
        })
        .await
    }

    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> {
        let path = path.to_string();
        let Value::Object(children) = partial else {
            return Err(StoreError::NotAnObject(path));
        };
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(DatabaseError::from)?;
            let base = path.trim_matches('/');
            for (key, value) in children {
                let child = if base.is_empty() {
                    key
                } else {
                    format!("{base}/{key}")
                };
                write_path(&tx, &child, value)?;
            }
            tx.commit().map_err(DatabaseError::from)?;
            Ok(())
        })
        .await
    }
}

// ═══════════════════════════════════════════════════════════
// Row-level helpers
// ═══════════════════════════════════════════════════════════

fn read_path(conn: &Connection, path: &str) -> Result<Option<Value>, StoreError> {
    let segs = tree::segments(path)?;
    match segs.as_slice() {
        [] => {
            let mut root = Map::new();
            for collection in list_collections(conn)? {
                if let Some(docs) = read_collection(conn, &collection)? {
                    root.insert(collection, docs);
                }
            }
            Ok(if root.is_empty() { None } else { Some(Value::Object(root)) })
        }
        [collection] => read_collection(conn, collection),
        [collection, key, rest @ ..] => {
            let Some(doc) = load_document(conn, collection, key)? else {
                return Ok(None);
            };
            Ok(tree::get_at(&doc, rest).cloned())
        }
    }
}

fn write_path(conn: &Connection, path: &str, value: Value) -> Result<(), StoreError> {
    let segs = tree::segments(path)?;
    match segs.as_slice() {
        [] => {
            conn.execute("DELETE FROM documents", [])
                .map_err(DatabaseError::from)?;
            match value {
                Value::Null => Ok(()),
                Value::Object(collections) => {
                    for (collection, docs) in collections {
                        replace_collection(conn, &collection, docs, path)?;
                    }
                    Ok(())
                }
                _ => Err(StoreError::NotAnObject(path.to_string())),
            }
        }
        [collection] => {
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1",
                params![collection],
            )
            .map_err(DatabaseError::from)?;
            replace_collection(conn, collection, value, path)
        }
        [collection, key, rest @ ..] => {
            let mut doc = load_document(conn, collection, key)?.unwrap_or(Value::Null);
            tree::set_at(&mut doc, rest, value);
            store_document(conn, collection, key, &doc)
        }
    }
}

fn replace_collection(
    conn: &Connection,
    collection: &str,
    docs: Value,
    path: &str,
) -> Result<(), StoreError> {
    match docs {
        Value::Null => Ok(()),
        Value::Object(docs) => {
            for (key, doc) in docs {
                store_document(conn, collection, &key, &doc)?;
            }
            Ok(())
        }
        _ => Err(StoreError::NotAnObject(path.to_string())),
    }
}

fn list_collections(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")
        .map_err(DatabaseError::from)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(DatabaseError::from)?;
    let mut collections = Vec::new();
    for row in rows {
        collections.push(row.map_err(DatabaseError::from)?);
    }
    Ok(collections)
}

fn read_collection(conn: &Connection, collection: &str) -> Result<Option<Value>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT doc_key, body FROM documents WHERE collection = ?1 ORDER BY doc_key")
        .map_err(DatabaseError::from)?;
    let rows = stmt
        .query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(DatabaseError::from)?;

    let mut docs = Map::new();
    for row in rows {
        let (key, body) = row.map_err(DatabaseError::from)?;
        docs.insert(key, serde_json::from_str(&body).map_err(DatabaseError::from)?);
    }
    Ok(if docs.is_empty() { None } else { Some(Value::Object(docs)) })
}

fn load_document(
    conn: &Connection,
    collection: &str,
    key: &str,
) -> Result<Option<Value>, StoreError> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND doc_key = ?2",
            params![collection, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(DatabaseError::from)?;
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body).map_err(DatabaseError::from)?)),
        None => Ok(None),
    }
}

fn store_document(
    conn: &Connection,
    collection: &str,
    key: &str,
    doc: &Value,
) -> Result<(), StoreError> {
    if tree::is_absent(doc) {
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_key = ?2",
            params![collection, key],
        )
        .map_err(DatabaseError::from)?;
        return Ok(());
    }
    let body = serde_json::to_string(doc)?;
    conn.execute(
        "INSERT INTO documents (collection, doc_key, body, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(collection, doc_key) DO UPDATE SET
             body = excluded.body,
             updated_at = excluded.updated_at",
        params![collection, key, body],
    )
    .map_err(DatabaseError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn document_round_trip() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store
            .set("users/u1", json!({ "uid": "u1", "role": "doctor" }))
            .await
            .unwrap();
        let user = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(user["role"], "doctor");
        assert_eq!(store.get("users/u1/role").await.unwrap(), Some(json!("doctor")));
    }

    #[tokio::test]
    async fn nested_write_updates_document() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store
            .set("patients/P1", json!({ "name": "Marie", "reports": [] }))
            .await
            .unwrap();
        store
            .set("patients/P1/reports", json!([{ "title": "Blood Test" }]))
            .await
            .unwrap();
        let patient = store.get("patients/P1").await.unwrap().unwrap();
        assert_eq!(patient["name"], "Marie");
        assert_eq!(patient["reports"][0]["title"], "Blood Test");
    }

    #[tokio::test]
    async fn collection_read_assembles_rows() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store.set("patients/A", json!({ "name": "a" })).await.unwrap();
        store.set("patients/B", json!({ "name": "b" })).await.unwrap();
        let all = store.get("patients").await.unwrap().unwrap();
        assert_eq!(all["A"]["name"], "a");
        assert_eq!(all["B"]["name"], "b");
        assert_eq!(store.get("users").await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_touches_only_named_children() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store.set("users/u1", json!({ "uid": "u1", "role": "patient" })).await.unwrap();
        store.update("users/u1", json!({ "email": "e@x.org" })).await.unwrap();
        let user = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(user, json!({ "uid": "u1", "role": "patient", "email": "e@x.org" }));
    }

    #[tokio::test]
    async fn null_write_deletes_row() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        store.set("users/u1", json!({ "uid": "u1" })).await.unwrap();
        store.set("users/u1", Value::Null).await.unwrap();
        assert_eq!(store.get("users/u1").await.unwrap(), None);
        assert!(!store.exists("users").await.unwrap());
    }

    #[tokio::test]
    async fn scalar_collection_write_rejected() {
        let store = SqliteProfileStore::open_in_memory().unwrap();
        let err = store.set("users", json!(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject(_)));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.db");
        {
            let store = SqliteProfileStore::open(&path).unwrap();
            store.set("patients/P1", json!({ "name": "Marie" })).await.unwrap();
        }
        let store = SqliteProfileStore::open(&path).unwrap();
        assert!(store.exists("patients/P1").await.unwrap());
    }
}
