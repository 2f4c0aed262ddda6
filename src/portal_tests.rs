//! End-to-end flows through `PortalState`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::config::{PortalConfig, MAX_REPORT_BYTES};
use crate::core_state::PortalState;
use crate::identity::{IdentityStore, LocalIdentityStore};
use crate::models::{IntakeForm, PatientId, Role};
use crate::pipeline::compress::{compress_pdf, test_pdf::make_pdf};
use crate::pipeline::UploadedFile;
use crate::session::{RouteDecision, SessionState};
use crate::store::local_cache::PATIENT_ID_KEY;
use crate::store::{LocalCache, MemoryProfileStore, ProfileStore};

fn test_config() -> PortalConfig {
    PortalConfig {
        pbkdf2_iterations: 10,
        ..PortalConfig::default()
    }
}

fn portal() -> (PortalState, Arc<LocalIdentityStore>) {
    let identities = Arc::new(LocalIdentityStore::new(10));
    let state = PortalState::with_parts(
        test_config(),
        identities.clone(),
        Arc::new(MemoryProfileStore::new()),
        Arc::new(LocalCache::in_memory()),
    );
    (state, identities)
}

async fn settle(state: &PortalState, pred: impl Fn(&SessionState) -> bool) -> SessionState {
    let mut rx = state.resolver().subscribe();
    let session = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(&s.state())))
        .await
        .expect("session did not settle")
        .expect("resolver dropped");
    session.state()
}

fn is_incomplete(s: &SessionState) -> bool {
    matches!(s, SessionState::AuthenticatedIncomplete { .. })
}

fn form(first: &str, last: &str) -> IntakeForm {
    IntakeForm {
        first_name: first.into(),
        last_name: last.into(),
        ..Default::default()
    }
}

/// Register, wait for the incomplete state, then finish onboarding.
async fn onboard(
    state: &PortalState,
    identities: &LocalIdentityStore,
    email: &str,
    role: Role,
) -> SessionState {
    let identity = identities.register(email, "password1", None).await.unwrap();
    settle(state, |s| is_incomplete(s) && s.identity() == Some(&identity)).await;
    state
        .onboarding()
        .complete_profile(&identity, role, form("Test", "User"))
        .await
        .unwrap();
    settle(state, |s| s.role() == Some(role)).await
}

#[tokio::test]
async fn doctor_uploads_blood_test() {
    let (state, identities) = portal();
    let patient: PatientId = "14FAD97B".parse().unwrap();
    state
        .store()
        .set("patients/14FAD97B", json!({ "name": "Meera Iyer", "reports": [] }))
        .await
        .unwrap();
    state.start().unwrap();

    onboard(&state, &identities, "doctor@clinic.in", Role::Doctor).await;

    let original = make_pdf(50 * 1024);
    let file = Some(UploadedFile::pdf("blood.pdf", original.clone()));
    let report = state
        .upload_report(&patient, file, "Blood Test", "")
        .await
        .unwrap();

    let record = state.view_patient(&patient).await.unwrap();
    assert_eq!(record.reports.len(), 1);
    assert_eq!(record.reports[0].title, "Blood Test");
    assert_eq!(record.reports[0].date, crate::models::today());
    assert!(record.reports[0].size_bytes <= MAX_REPORT_BYTES);
    assert_eq!(record.reports[0], report);

    let artifact = state.download_report(&patient, 0).await.unwrap();
    assert_eq!(artifact.filename, "Blood_Test.pdf");
    assert_eq!(artifact.bytes, compress_pdf(&original).unwrap());

    state.stop().await;
}

#[tokio::test]
async fn sign_out_mid_session_redirects_to_login() {
    let (state, identities) = portal();
    state.start().unwrap();
    onboard(&state, &identities, "doc@clinic.in", Role::Doctor).await;
    assert_eq!(state.route("/dashboard"), RouteDecision::Allow);
    assert_eq!(state.route("/login"), RouteDecision::Redirect("/dashboard".into()));

    identities.sign_out().await.unwrap();
    let after = settle(&state, |s| !s.is_loading() && s.identity().is_none()).await;

    assert_eq!(after, SessionState::Unauthenticated);
    assert_eq!(state.route("/dashboard"), RouteDecision::Redirect("/login".into()));
    state.stop().await;
}

#[tokio::test]
async fn incomplete_session_is_sent_to_profile_completion() {
    let (state, identities) = portal();
    state.start().unwrap();
    identities.register("new@x.org", "password1", None).await.unwrap();
    settle(&state, is_incomplete).await;

    assert_eq!(
        state.route("/dashboard"),
        RouteDecision::Redirect("/complete-profile".into())
    );
    assert_eq!(state.route("/complete-profile"), RouteDecision::Allow);
    state.stop().await;
}

#[tokio::test]
async fn patient_sees_only_own_reports() {
    let (state, identities) = portal();
    state.start().unwrap();

    // Patient onboards and gets a record id.
    let patient_state = onboard(&state, &identities, "asha@x.org", Role::Patient).await;
    let own = patient_state.patient_data_id().unwrap().clone();
    assert_eq!(state.cache().get(PATIENT_ID_KEY).as_deref(), Some(own.as_str()));
    identities.sign_out().await.unwrap();
    settle(&state, |s| *s == SessionState::Unauthenticated).await;

    // A lab attaches a report to it.
    onboard(&state, &identities, "lab@x.org", Role::PathLab).await;
    let listed = state.list_patients().await.unwrap();
    assert!(listed.iter().any(|e| e.id == own));
    let file = Some(UploadedFile::pdf("tsh.pdf", make_pdf(3_000)));
    state
        .upload_report(&own, file, "Thyroid Panel", "TSH normal")
        .await
        .unwrap();
    identities.sign_out().await.unwrap();
    settle(&state, |s| *s == SessionState::Unauthenticated).await;

    // Patient signs back in; the profile is read from the store.
    identities
        .sign_in_with_credential("asha@x.org", "password1")
        .await
        .unwrap();
    settle(&state, |s| s.role() == Some(Role::Patient)).await;

    let artifact = state.download_report(&own, 0).await.unwrap();
    assert_eq!(artifact.filename, "Thyroid_Panel.pdf");

    let other: PatientId = "ZZZZ9999".parse().unwrap();
    let denied = state.download_report(&other, 0).await.unwrap_err();
    assert_eq!(denied.code(), "PERMISSION_DENIED");

    let upload = state
        .upload_report(&own, Some(UploadedFile::pdf("self.pdf", make_pdf(100))), "Mine", "")
        .await
        .unwrap_err();
    assert_eq!(upload.code(), "PERMISSION_DENIED");
    assert_eq!(state.list_patients().await.unwrap_err().code(), "PERMISSION_DENIED");

    state.stop().await;
}

#[tokio::test]
async fn actions_require_resolved_profile() {
    let (state, _identities) = portal();
    let id: PatientId = "14FAD97B".parse().unwrap();
    let err = state.view_patient(&id).await.unwrap_err();
    assert_eq!(err.code(), "PERMISSION_DENIED");
    assert_eq!(state.route("/dashboard"), RouteDecision::Wait);
}

#[tokio::test]
async fn sqlite_backed_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = PortalConfig {
        data_dir: dir.path().to_path_buf(),
        ..test_config()
    };

    let own = {
        let state = PortalState::open(config.clone()).unwrap();
        let identity = crate::models::Identity::new("uid-sql", Some("p@x.org".into()), None);
        state.resolver().resolve(Some(identity.clone())).await.unwrap();
        let profile = state
            .onboarding()
            .complete_profile(&identity, Role::Patient, form("Kiran", "Rao"))
            .await
            .unwrap();
        profile.patient_data_id().unwrap().clone()
    };

    let reopened = PortalState::open(config).unwrap();
    let record = reopened.directory().fetch(&own).await.unwrap();
    assert_eq!(record.name, "Kiran Rao");
    assert_eq!(reopened.cache().get(PATIENT_ID_KEY).as_deref(), Some(own.as_str()));

    let identity = crate::models::Identity::new("uid-sql", Some("p@x.org".into()), None);
    let resolved = reopened.resolver().resolve(Some(identity)).await.unwrap();
    assert_eq!(resolved.patient_data_id(), Some(&own));
}

#[test]
fn in_memory_state_uses_default_limits() {
    let state = PortalState::in_memory();
    assert_eq!(state.config().max_report_bytes, MAX_REPORT_BYTES);
    assert_eq!(state.session_state(), SessionState::Loading);
}
