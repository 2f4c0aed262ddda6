//! Session container and role resolution.
//!
//! A [`Session`] is the raw container value (identity, profile, resolution
//! status). [`SessionState`] is the normalized view consumers match on;
//! it is always derived, never stored.

pub mod resolver;
pub mod routing;

pub use resolver::{ListenerHandle, SessionResolver};
pub use routing::{RouteDecision, RoutePolicy};

use serde::Serialize;

use crate::models::{
    DoctorProfile, Identity, PathLabProfile, PatientId, PatientStub, Profile, Role,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// No identity event observed yet.
    Idle,
    /// Identity observed, profile lookup in flight.
    Loading,
    Resolved,
    /// Profile lookup failed; treated as logged out.
    Failed,
}

/// Process-lifetime session value, replaced wholesale on every identity change.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub status: ResolutionStatus,
    pub last_error: Option<String>,
}

impl Session {
    pub fn idle() -> Self {
        Self {
            identity: None,
            profile: None,
            status: ResolutionStatus::Idle,
            last_error: None,
        }
    }

    pub(crate) fn loading(identity: Option<Identity>) -> Self {
        Self {
            identity,
            profile: None,
            status: ResolutionStatus::Loading,
            last_error: None,
        }
    }

    pub(crate) fn resolved(identity: Option<Identity>, profile: Option<Profile>) -> Self {
        Self {
            identity,
            profile,
            status: ResolutionStatus::Resolved,
            last_error: None,
        }
    }

    pub(crate) fn failed(error: String) -> Self {
        Self {
            identity: None,
            profile: None,
            status: ResolutionStatus::Failed,
            last_error: Some(error),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.status {
            ResolutionStatus::Idle | ResolutionStatus::Loading => SessionState::Loading,
            ResolutionStatus::Failed => SessionState::Unauthenticated,
            ResolutionStatus::Resolved => match (&self.identity, &self.profile) {
                (None, _) => SessionState::Unauthenticated,
                (Some(identity), None) => SessionState::AuthenticatedIncomplete {
                    identity: identity.clone(),
                },
                (Some(identity), Some(Profile::Patient(stub))) => {
                    SessionState::AuthenticatedPatient {
                        identity: identity.clone(),
                        profile: stub.clone(),
                    }
                }
                (Some(identity), Some(Profile::Doctor(doctor))) => {
                    SessionState::AuthenticatedDoctor {
                        identity: identity.clone(),
                        profile: doctor.clone(),
                    }
                }
                (Some(identity), Some(Profile::PathLab(lab))) => {
                    SessionState::AuthenticatedPathLab {
                        identity: identity.clone(),
                        profile: lab.clone(),
                    }
                }
            },
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}

/// Normalized session state used for routing and action gating.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Loading,
    Unauthenticated,
    /// Signed in, no usable profile yet.
    AuthenticatedIncomplete { identity: Identity },
    AuthenticatedPatient { identity: Identity, profile: PatientStub },
    AuthenticatedDoctor { identity: Identity, profile: DoctorProfile },
    AuthenticatedPathLab { identity: Identity, profile: PathLabProfile },
}

impl SessionState {
    /// Role of a fully resolved session.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::AuthenticatedPatient { .. } => Some(Role::Patient),
            Self::AuthenticatedDoctor { .. } => Some(Role::Doctor),
            Self::AuthenticatedPathLab { .. } => Some(Role::PathLab),
            Self::Loading | Self::Unauthenticated | Self::AuthenticatedIncomplete { .. } => None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Loading | Self::Unauthenticated => None,
            Self::AuthenticatedIncomplete { identity }
            | Self::AuthenticatedPatient { identity, .. }
            | Self::AuthenticatedDoctor { identity, .. }
            | Self::AuthenticatedPathLab { identity, .. } => Some(identity),
        }
    }

    /// Role-gated profile, rebuilt as the tagged [`Profile`].
    pub fn profile(&self) -> Option<Profile> {
        match self {
            Self::AuthenticatedPatient { profile, .. } => Some(Profile::Patient(profile.clone())),
            Self::AuthenticatedDoctor { profile, .. } => Some(Profile::Doctor(profile.clone())),
            Self::AuthenticatedPathLab { profile, .. } => Some(Profile::PathLab(profile.clone())),
            Self::Loading | Self::Unauthenticated | Self::AuthenticatedIncomplete { .. } => None,
        }
    }

    pub fn patient_data_id(&self) -> Option<&PatientId> {
        match self {
            Self::AuthenticatedPatient { profile, .. } => Some(&profile.patient_data_id),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}
