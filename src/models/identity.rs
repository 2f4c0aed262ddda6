use serde::{Deserialize, Serialize};

/// Authenticated credential handle issued by the identity provider.
///
/// Distinct from the application-level [`Profile`](super::Profile): an
/// identity can exist before onboarding has written a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(
        uid: impl Into<String>,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email,
            display_name,
        }
    }
}
