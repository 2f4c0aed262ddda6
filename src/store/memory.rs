use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::tree;
use super::{ProfileStore, StoreError};

/// Profile store held entirely in memory as one JSON tree.
///
/// Used by tests and by `PortalState::in_memory`. Counts writes so callers
/// can assert that a rejected operation touched nothing.
pub struct MemoryProfileStore {
    root: RwLock<Value>,
    writes: AtomicU64,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::with_root(Value::Null)
    }

    /// Start from an existing JSON tree (fixtures, imports).
    pub fn with_root(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of `set`/`update` calls applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of the whole tree.
    pub async fn snapshot(&self) -> Value {
        self.root.read().await.clone()
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segs = tree::segments(path)?;
        let root = self.root.read().await;
        Ok(tree::get_at(&root, &segs).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segs = tree::segments(path)?;
        let mut root = self.root.write().await;
        tree::set_at(&mut root, &segs, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError> {
        let segs = tree::segments(path)?;
        let Value::Object(map) = partial else {
            return Err(StoreError::NotAnObject(path.to_string()));
        };
        let mut root = self.root.write().await;
        tree::merge_at(&mut root, &segs, map);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryProfileStore::new();
        store.set("users/u1", json!({ "role": "doctor" })).await.unwrap();
        assert_eq!(
            store.get("users/u1").await.unwrap(),
            Some(json!({ "role": "doctor" }))
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn missing_path_is_none() {
        let store = MemoryProfileStore::new();
        assert_eq!(store.get("patients/NOPE").await.unwrap(), None);
        assert!(!store.exists("patients/NOPE").await.unwrap());
    }

    #[tokio::test]
    async fn collection_read_returns_children() {
        let store = MemoryProfileStore::new();
        store.set("patients/A", json!({ "name": "a" })).await.unwrap();
        store.set("patients/B", json!({ "name": "b" })).await.unwrap();
        let all = store.get("patients").await.unwrap().unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_merges_children() {
        let store = MemoryProfileStore::new();
        store.set("users/u1", json!({ "uid": "u1", "role": "patient" })).await.unwrap();
        store.update("users/u1", json!({ "email": "x@y.z" })).await.unwrap();
        let user = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(user["role"], "patient");
        assert_eq!(user["email"], "x@y.z");
    }

    #[tokio::test]
    async fn update_rejects_scalars() {
        let store = MemoryProfileStore::new();
        let err = store.update("users/u1", json!(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn set_null_deletes() {
        let store = MemoryProfileStore::new();
        store.set("users/u1", json!({ "role": "doctor" })).await.unwrap();
        store.set("users/u1", Value::Null).await.unwrap();
        assert_eq!(store.get("users/u1").await.unwrap(), None);
    }
}
