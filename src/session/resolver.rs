//! Identity-change → session state machine.
//!
//! Every identity change enters `Loading` and performs exactly one profile
//! lookup at `users/{uid}`. The outcome replaces the session wholesale.
//! Each resolution carries a generation number; an outcome is published
//! only if no newer resolution (or adopted profile) started meanwhile, so a
//! slow lookup for a previous identity cannot overwrite a newer state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::{Session, SessionState};
use crate::error::PortalError;
use crate::identity::IdentityStore;
use crate::models::{classify_profile, Identity, Profile, ProfileRecord};
use crate::store::{user_path, ProfileStore};

pub struct SessionResolver {
    store: Arc<dyn ProfileStore>,
    session: watch::Sender<Session>,
    generation: AtomicU64,
    listening: Arc<AtomicBool>,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        let (session, _) = watch::channel(Session::idle());
        Self {
            store,
            session,
            generation: AtomicU64::new(0),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver notified on every published session.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().state()
    }

    /// Resolve the session for an identity change.
    ///
    /// A store failure leaves the session logged out and is also returned.
    /// If a newer resolution started while this one was in flight, the
    /// outcome is discarded and the current state returned instead.
    pub async fn resolve(&self, identity: Option<Identity>) -> Result<SessionState, PortalError> {
        let generation = self.begin(identity.clone());

        let Some(identity) = identity else {
            self.publish(generation, Session::resolved(None, None));
            tracing::debug!("Session resolved without identity");
            return Ok(self.state());
        };

        let uid = identity.uid.clone();
        let lookup = match user_path(&identity.uid) {
            Ok(path) => self.store.get(&path).await,
            Err(e) => Err(e),
        };

        let next = match lookup {
            Ok(None) => {
                tracing::debug!(uid = %identity.uid, "No profile, onboarding incomplete");
                Session::resolved(Some(identity), None)
            }
            Ok(Some(value)) => match classify_profile(value) {
                ProfileRecord::Known(profile) => {
                    tracing::info!(uid = %identity.uid, role = %profile.role(), "Session resolved");
                    Session::resolved(Some(identity), Some(profile))
                }
                ProfileRecord::Unrecognized { role } => {
                    tracing::warn!(
                        uid = %identity.uid,
                        role = role.as_deref().unwrap_or("<missing>"),
                        "Unrecognized profile, treating as incomplete"
                    );
                    Session::resolved(Some(identity), None)
                }
            },
            Err(e) => {
                tracing::warn!(uid = %identity.uid, error = %e, "Profile lookup failed, session logged out");
                if self.publish(generation, Session::failed(e.to_string())) {
                    return Err(PortalError::StoreUnavailable(e));
                }
                return Ok(self.state());
            }
        };

        if !self.publish(generation, next) {
            tracing::debug!(uid = %uid, "Discarded superseded resolution");
        }
        Ok(self.state())
    }

    /// Install a profile written by onboarding without a second lookup.
    pub fn adopt_profile(&self, identity: Identity, profile: Profile) -> SessionState {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(uid = %identity.uid, role = %profile.role(), "Adopted onboarding profile");
        self.publish(generation, Session::resolved(Some(identity), Some(profile)));
        self.state()
    }

    /// Follow `identities` until the returned handle is shut down or dropped.
    ///
    /// Changes are resolved one at a time in arrival order. Only one
    /// listener may be active per resolver. Must be called inside a Tokio
    /// runtime.
    pub fn listen(
        self: &Arc<Self>,
        identities: &dyn IdentityStore,
    ) -> Result<ListenerHandle, PortalError> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(PortalError::InvalidInput(
                "session resolver already has an identity listener".into(),
            ));
        }

        let mut subscription = identities.subscribe();
        let resolver = Arc::clone(self);
        let listening = Arc::clone(&self.listening);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    change = subscription.next() => match change {
                        Some(identity) => {
                            // Failures are already reflected in the session.
                            let _ = resolver.resolve(identity).await;
                        }
                        None => break,
                    },
                }
            }
            drop(subscription);
            listening.store(false, Ordering::SeqCst);
            tracing::debug!("Identity listener stopped");
        });

        Ok(ListenerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    fn begin(&self, identity: Option<Identity>) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(generation, Session::loading(identity));
        generation
    }

    /// Replace the session if `generation` is still the newest.
    fn publish(&self, generation: u64, next: Session) -> bool {
        self.session.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = next;
            true
        })
    }
}

/// Disposer for [`SessionResolver::listen`]. Dropping it stops the listener
/// after any in-flight resolution completes.
pub struct ListenerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop listening and wait for the listener task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Identity listener task failed");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
