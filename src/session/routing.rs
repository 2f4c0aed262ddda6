//! Navigation policy derived from [`SessionState`].
//!
//! | state                  | protected route          | auth/onboarding route        | other |
//! |------------------------|--------------------------|------------------------------|-------|
//! | Unauthenticated        | redirect to sign-in      | allow                        | allow |
//! | AuthenticatedIncomplete| redirect to completion   | allow completion only        | allow |
//! | Authenticated role     | allow                    | redirect to dashboard        | allow |
//!
//! While the session is loading no decision is made: the caller shows a
//! neutral placeholder.

use serde::{Deserialize, Serialize};

use super::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "to", rename_all = "snake_case")]
pub enum RouteDecision {
    Allow,
    Redirect(String),
    /// Session still resolving; render a placeholder, decide again later.
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Protected,
    Auth,
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePolicy {
    pub sign_in: String,
    pub profile_completion: String,
    pub dashboard: String,
    pub auth_routes: Vec<String>,
    pub protected_routes: Vec<String>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            sign_in: "/login".into(),
            profile_completion: "/complete-profile".into(),
            dashboard: "/dashboard".into(),
            auth_routes: vec![
                "/login".into(),
                "/register".into(),
                "/complete-profile".into(),
            ],
            protected_routes: vec!["/dashboard".into()],
        }
    }
}

impl RoutePolicy {
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize(path);
        if self.protected_routes.iter().any(|r| matches_route(path, r)) {
            RouteClass::Protected
        } else if self.auth_routes.iter().any(|r| matches_route(path, r)) {
            RouteClass::Auth
        } else {
            RouteClass::Public
        }
    }

    pub fn decide(&self, state: &SessionState, path: &str) -> RouteDecision {
        let class = self.classify(path);
        match state {
            SessionState::Loading => RouteDecision::Wait,
            SessionState::Unauthenticated => match class {
                RouteClass::Protected => RouteDecision::Redirect(self.sign_in.clone()),
                RouteClass::Auth | RouteClass::Public => RouteDecision::Allow,
            },
            SessionState::AuthenticatedIncomplete { .. } => match class {
                RouteClass::Public => RouteDecision::Allow,
                RouteClass::Auth if matches_route(normalize(path), &self.profile_completion) => {
                    RouteDecision::Allow
                }
                RouteClass::Auth | RouteClass::Protected => {
                    RouteDecision::Redirect(self.profile_completion.clone())
                }
            },
            SessionState::AuthenticatedPatient { .. }
            | SessionState::AuthenticatedDoctor { .. }
            | SessionState::AuthenticatedPathLab { .. } => match class {
                RouteClass::Auth => RouteDecision::Redirect(self.dashboard.clone()),
                RouteClass::Protected | RouteClass::Public => RouteDecision::Allow,
            },
        }
    }
}

/// Strip query, fragment and trailing slashes.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// `route` itself or anything nested below it.
fn matches_route(path: &str, route: &str) -> bool {
    let route = normalize(route);
    path == route
        || path
            .strip_prefix(route)
            .is_some_and(|rest| rest.starts_with('/'))
}
