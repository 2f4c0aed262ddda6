//! Read access to patient records.

use std::sync::Arc;

use serde_json::Value;

use crate::authorization::check_action;
use crate::error::PortalError;
use crate::models::{Action, PatientEntry, PatientId, PatientRecord, Report, Role};
use crate::session::SessionState;
use crate::store::local_cache::PATIENT_ID_KEY;
use crate::store::{patient_path, LocalCache, ProfileStore, PATIENTS};

pub struct PatientDirectory {
    store: Arc<dyn ProfileStore>,
    cache: Arc<LocalCache>,
}

impl PatientDirectory {
    pub fn new(store: Arc<dyn ProfileStore>, cache: Arc<LocalCache>) -> Self {
        Self { store, cache }
    }

    /// A body that cannot be read as a record is `CorruptPayload`, not an
    /// outage.
    pub async fn fetch(&self, id: &PatientId) -> Result<PatientRecord, PortalError> {
        let body = self
            .store
            .get(&patient_path(id))
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("patient {id}")))?;
        serde_json::from_value(body).map_err(|e| {
            tracing::warn!(patient_id = %id, error = %e, "Stored patient record is unreadable");
            PortalError::CorruptPayload(format!("patient {id}: {e}"))
        })
    }

    /// Every patient record, ordered by id. Clinical roles only.
    ///
    /// Entries whose key or body cannot be read are skipped.
    pub async fn list(&self, role: Role) -> Result<Vec<PatientEntry>, PortalError> {
        check_action(role, Action::ListPatients).require(role, Action::ListPatients)?;

        let Some(Value::Object(patients)) = self.store.get(PATIENTS).await? else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<PatientEntry> = patients
            .into_iter()
            .filter_map(|(key, body)| {
                let id = match key.parse::<PatientId>() {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Skipping patient with invalid key");
                        return None;
                    }
                };
                match serde_json::from_value::<PatientRecord>(body) {
                    Ok(record) => Some(PatientEntry { id, record }),
                    Err(e) => {
                        tracing::warn!(patient_id = %id, error = %e, "Skipping unreadable patient record");
                        None
                    }
                }
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::debug!(role = %role, count = entries.len(), "Listed patients");
        Ok(entries)
    }

    /// Reports of a patient in upload order.
    pub async fn reports(&self, id: &PatientId) -> Result<Vec<Report>, PortalError> {
        Ok(self.fetch(id).await?.reports)
    }

    /// Patient the caller means: an explicit id, else the signed-in
    /// patient's own record, else the id cached on this device.
    pub fn resolve_patient_id(
        &self,
        explicit: Option<&str>,
        session: &SessionState,
    ) -> Result<PatientId, PortalError> {
        if let Some(raw) = explicit.filter(|s| !s.trim().is_empty()) {
            return raw.parse();
        }
        if let Some(id) = session.patient_data_id() {
            return Ok(id.clone());
        }
        if let Some(cached) = self.cache.get(PATIENT_ID_KEY) {
            match cached.parse() {
                Ok(id) => return Ok(id),
                Err(e) => tracing::debug!(error = %e, "Ignoring cached patient id"),
            }
        }
        Err(PortalError::NotFound("no patient selected".into()))
    }
}
