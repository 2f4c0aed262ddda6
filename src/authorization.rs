//! Role-based action authorization.
//!
//! Default-deny rule table, checked in order:
//! 1. Clinical role (doctor, pathlab) → any action on any patient
//! 2. Patient viewing or downloading their own record → allowed
//! 3. Default → DENY
//!
//! Role-level checks ([`check_action`]) need no I/O and run before any store
//! access. Record-level checks ([`check_patient_access`]) additionally need
//! the caller's profile.

use crate::error::PortalError;
use crate::models::{Action, PatientId, Profile, Role};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Why access was granted (or denied), for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    /// Doctor or lab acting in a clinical capacity.
    ClinicalRole,
    /// Patient acting on the record their profile points to.
    OwnRecord,
    /// Action open to every resolved role, pending a record-level check.
    AnyResolvedRole,
    /// No matching rule.
    Denied,
}

/// Result of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::Denied,
        }
    }

    /// `Ok(())` when allowed, `PermissionDenied` naming the action otherwise.
    pub fn require(self, role: Role, action: Action) -> Result<(), PortalError> {
        if self.allowed {
            Ok(())
        } else {
            tracing::warn!(role = %role, action = %action, "Action denied");
            Err(PortalError::PermissionDenied(format!(
                "role '{role}' may not {}",
                action.as_str().replace('_', " ")
            )))
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Checks
// ═══════════════════════════════════════════════════════════

/// Whether `role` may attempt `action` at all.
pub fn check_action(role: Role, action: Action) -> AccessDecision {
    // Rule 1: clinical roles
    if role.is_clinical() {
        return AccessDecision::allow(AccessReason::ClinicalRole);
    }

    // Rule 2: reading is open to patients, narrowed per record later
    match action {
        Action::ViewPatient | Action::DownloadReport => {
            AccessDecision::allow(AccessReason::AnyResolvedRole)
        }
        // Rule 3: default deny
        Action::UploadReport | Action::ListPatients => AccessDecision::deny(),
    }
}

/// Whether the holder of `profile` may perform `action` on `target`.
pub fn check_patient_access(
    profile: &Profile,
    action: Action,
    target: &PatientId,
) -> AccessDecision {
    let role_level = check_action(profile.role(), action);
    if !role_level.allowed {
        return role_level;
    }

    match profile {
        Profile::Doctor(_) | Profile::PathLab(_) => {
            AccessDecision::allow(AccessReason::ClinicalRole)
        }
        Profile::Patient(stub) if &stub.patient_data_id == target => {
            AccessDecision::allow(AccessReason::OwnRecord)
        }
        Profile::Patient(_) => AccessDecision::deny(),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
