use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Medportal";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound for a stored report, measured on the re-encoded payload.
pub const MAX_REPORT_BYTES: u64 = 900_000;

/// Length of an allocated patient identifier.
pub const PATIENT_ID_LENGTH: usize = 8;

/// Random candidates tried before the timestamp fallback.
pub const PATIENT_ID_ATTEMPTS: usize = 5;

/// PBKDF2 rounds for locally stored credentials.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Get the application data directory
/// ~/Medportal/ when a home directory is known, ./Medportal otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// SQLite file backing the profile store
pub fn store_db_path() -> PathBuf {
    app_data_dir().join("portal.db")
}

/// Device-local cache file
pub fn local_cache_path() -> PathBuf {
    app_data_dir().join("local_cache.json")
}

/// Filter used when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    "medportal_lib=info,warn".to_string()
}

/// Runtime knobs for a portal instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortalConfig {
    pub data_dir: PathBuf,
    pub max_report_bytes: u64,
    pub pbkdf2_iterations: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            data_dir: app_data_dir(),
            max_report_bytes: MAX_REPORT_BYTES,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl PortalConfig {
    /// Defaults overridden by `MEDPORTAL_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("MEDPORTAL_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("MEDPORTAL_MAX_REPORT_BYTES") {
            match raw.trim().parse::<u64>() {
                Ok(limit) => config.max_report_bytes = limit,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid MEDPORTAL_MAX_REPORT_BYTES"),
            }
        }
        if let Some(raw) = lookup("MEDPORTAL_PBKDF2_ITERATIONS") {
            match raw.trim().parse::<u32>() {
                Ok(rounds) if rounds > 0 => config.pbkdf2_iterations = rounds,
                _ => tracing::warn!(value = %raw, "Ignoring invalid MEDPORTAL_PBKDF2_ITERATIONS"),
            }
        }

        config
    }

    pub fn store_db_path(&self) -> PathBuf {
        self.data_dir.join("portal.db")
    }

    pub fn local_cache_path(&self) -> PathBuf {
        self.data_dir.join("local_cache.json")
    }
}
