//! Profile completion for signed-in identities without a profile.
//!
//! Patients get a freshly allocated record id. The writes are ordered:
//! profile stub at `users/{uid}`, then the patient record, then the device
//! cache. They are independent writes, not a transaction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::allocator::PatientIdAllocator;
use crate::error::PortalError;
use crate::models::{
    classify_profile, parse_measure, DoctorProfile, Identity, IntakeForm, PathLabProfile,
    PatientRecord, PatientStub, Profile, ProfileRecord, Role,
};
use crate::session::SessionResolver;
use crate::store::local_cache::{ONBOARDING_DRAFT_KEY, PATIENT_ID_KEY};
use crate::store::{patient_path, set_typed, user_path, LocalCache, ProfileStore};

/// Registration choices kept on the device until the profile is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationDraft {
    pub role: Role,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_name: Option<String>,
}

pub struct Onboarding {
    store: Arc<dyn ProfileStore>,
    allocator: Arc<PatientIdAllocator>,
    cache: Arc<LocalCache>,
    resolver: Arc<SessionResolver>,
}

impl Onboarding {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        allocator: Arc<PatientIdAllocator>,
        cache: Arc<LocalCache>,
        resolver: Arc<SessionResolver>,
    ) -> Self {
        Self {
            store,
            allocator,
            cache,
            resolver,
        }
    }

    /// Write the profile for `identity` and adopt it into the session.
    pub async fn complete_profile(
        &self,
        identity: &Identity,
        role: Role,
        intake: IntakeForm,
    ) -> Result<Profile, PortalError> {
        if intake.first_name.trim().is_empty() {
            return Err(PortalError::InvalidInput("First name is required".into()));
        }

        // Only a recognized profile blocks completion; anything else at the
        // path is what sent the session here and gets replaced.
        let profile_path = user_path(&identity.uid)?;
        match self.store.get(&profile_path).await?.map(classify_profile) {
            Some(ProfileRecord::Known(_)) => {
                return Err(PortalError::InvalidInput(
                    "Profile has already been completed".into(),
                ));
            }
            Some(ProfileRecord::Unrecognized { role }) => {
                tracing::info!(uid = %identity.uid, role = ?role, "Replacing unrecognized profile");
            }
            None => {}
        }

        let draft = self.load_draft();
        let intake = merge_draft(intake, draft.as_ref());
        let display_name = identity
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| intake.display_name());

        let profile = match role {
            Role::Patient => {
                let patient_data_id = self.allocator.allocate().await?;
                let stub = Profile::Patient(PatientStub {
                    uid: identity.uid.clone(),
                    email: identity.email.clone(),
                    patient_data_id: patient_data_id.clone(),
                    display_name: Some(display_name),
                });
                set_typed(self.store.as_ref(), &profile_path, &stub).await?;

                let record = PatientRecord {
                    name: intake.display_name(),
                    dob: non_empty(&intake.dob),
                    gender: non_empty(&intake.gender),
                    height_cm: parse_measure(&intake.height),
                    weight_kg: parse_measure(&intake.weight),
                    previous_diseases: Vec::new(),
                    reports: Vec::new(),
                };
                set_typed(self.store.as_ref(), &patient_path(&patient_data_id), &record).await?;
                self.cache.set(PATIENT_ID_KEY, patient_data_id.as_str());

                tracing::info!(
                    uid = %identity.uid,
                    patient_id = %patient_data_id,
                    "Patient onboarded"
                );
                stub
            }
            Role::Doctor => {
                let profile = Profile::Doctor(DoctorProfile {
                    uid: identity.uid.clone(),
                    email: identity.email.clone(),
                    display_name,
                    intake: Some(intake),
                    assigned_patients: Default::default(),
                });
                set_typed(self.store.as_ref(), &profile_path, &profile).await?;
                tracing::info!(uid = %identity.uid, "Doctor onboarded");
                profile
            }
            Role::PathLab => {
                let lab_name = intake.lab_name.clone().filter(|n| !n.trim().is_empty());
                let profile = Profile::PathLab(PathLabProfile {
                    uid: identity.uid.clone(),
                    email: identity.email.clone(),
                    display_name: lab_name.clone().unwrap_or(display_name),
                    intake: Some(intake),
                    lab_name,
                });
                set_typed(self.store.as_ref(), &profile_path, &profile).await?;
                tracing::info!(uid = %identity.uid, "Path lab onboarded");
                profile
            }
        };

        self.cache.remove(ONBOARDING_DRAFT_KEY);
        self.resolver.adopt_profile(identity.clone(), profile.clone());
        Ok(profile)
    }

    pub fn save_draft(&self, draft: &RegistrationDraft) {
        match serde_json::to_string(draft) {
            Ok(raw) => self.cache.set(ONBOARDING_DRAFT_KEY, &raw),
            Err(e) => tracing::warn!(error = %e, "Registration draft not cached"),
        }
    }

    pub fn load_draft(&self) -> Option<RegistrationDraft> {
        let raw = self.cache.get(ONBOARDING_DRAFT_KEY)?;
        serde_json::from_str(&raw)
            .map_err(|e| tracing::debug!(error = %e, "Ignoring unreadable registration draft"))
            .ok()
    }
}

/// Fill professional fields the form left empty from the registration draft.
fn merge_draft(mut intake: IntakeForm, draft: Option<&RegistrationDraft>) -> IntakeForm {
    if let Some(draft) = draft {
        intake.license_number = intake.license_number.or_else(|| draft.license_number.clone());
        intake.specialization = intake.specialization.or_else(|| draft.specialization.clone());
        intake.lab_name = intake.lab_name.or_else(|| draft.lab_name.clone());
    }
    intake
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
