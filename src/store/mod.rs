//! Hierarchical key-value profile store.
//!
//! Paths are slash-separated (`users/{uid}`, `patients/{id}/reports`) and
//! values are JSON. Every read and every write is an independent operation:
//! there is no transaction spanning two calls, so concurrent writers to the
//! same path are last-write-wins.

pub mod local_cache;
pub mod memory;
pub mod sqlite_store;
pub mod tree;

pub use local_cache::LocalCache;
pub use memory::MemoryProfileStore;
pub use sqlite_store::SqliteProfileStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::PatientId;

pub const USERS: &str = "users";
pub const PATIENTS: &str = "patients";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unavailable(String),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Cannot store a non-object value at {0}")]
    NotAnObject(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage backend for profiles and patient records.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Value at `path`, or `None` when nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value at `path`. Writing `null` removes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Set each child of `partial` under `path`, leaving other children alone.
    async fn update(&self, path: &str, partial: Value) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.get(path).await?.is_some())
    }
}

/// Path of the profile written for an identity.
pub fn user_path(uid: &str) -> Result<String, StoreError> {
    let uid = uid.trim();
    if uid.is_empty() || uid.contains('/') || uid == "." || uid == ".." {
        return Err(StoreError::InvalidPath(format!("bad uid segment '{uid}'")));
    }
    Ok(format!("{USERS}/{uid}"))
}

pub fn patient_path(id: &PatientId) -> String {
    format!("{PATIENTS}/{id}")
}

pub fn patient_reports_path(id: &PatientId) -> String {
    format!("{PATIENTS}/{id}/reports")
}

/// Read and deserialize the value at `path`.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn ProfileStore,
    path: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize and write `value` at `path`.
pub async fn set_typed<T: Serialize + ?Sized>(
    store: &dyn ProfileStore,
    path: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.set(path, serde_json::to_value(value)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_path_rejects_separators() {
        assert_eq!(user_path("abc123").unwrap(), "users/abc123");
        assert!(user_path("a/b").is_err());
        assert!(user_path("..").is_err());
        assert!(user_path("").is_err());
    }

    #[test]
    fn patient_paths() {
        let id: PatientId = "14FAD97B".parse().unwrap();
        assert_eq!(patient_path(&id), "patients/14FAD97B");
        assert_eq!(patient_reports_path(&id), "patients/14FAD97B/reports");
    }
}
