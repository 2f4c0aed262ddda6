//! Device-local string cache.
//!
//! Best-effort only: a failed read or write is logged and otherwise
//! ignored, and nothing here is authoritative. Holds convenience values
//! such as the last patient id and an unfinished registration draft.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Last patient id written by onboarding on this device.
pub const PATIENT_ID_KEY: &str = "patientId";
/// Registration choices carried into profile completion.
pub const ONBOARDING_DRAFT_KEY: &str = "onboardingData";

pub struct LocalCache {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalCache {
    /// Cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Cache persisted as a JSON object at `path`. A missing or unreadable
    /// file starts an empty cache.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Local cache unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Local cache unavailable");
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::warn!(key, "Local cache lock poisoned, value not cached");
            return;
        };
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    pub fn remove(&self, key: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    /// Write-to-temp then rename, so a crash never leaves a torn file.
    fn persist(&self, entries: &BTreeMap<String, String>) {
        let Some(path) = &self.path else {
            return;
        };
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("json.tmp");
            let body = serde_json::to_vec_pretty(entries)?;
            std::fs::write(&tmp, body)?;
            std::fs::rename(&tmp, path)
        })();
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist local cache");
        }
    }
}
