//! In-process identity provider with email/password and federated accounts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::credentials::{is_valid_email, PasswordHash, MIN_PASSWORD_LENGTH};
use super::{IdentityError, IdentityStore, IdentitySubscription, ProviderGrant, SessionToken};
use crate::models::Identity;

struct Account {
    identity: Identity,
    credential: Option<PasswordHash>,
    /// Federated links as `(provider, subject)`.
    providers: Vec<(String, String)>,
}

impl Account {
    fn linked_subject(&self, provider: &str) -> Option<&str> {
        self.providers
            .iter()
            .find(|(p, _)| p == provider)
            .map(|(_, subject)| subject.as_str())
    }
}

struct ActiveSession {
    identity: Identity,
    token: SessionToken,
}

/// Identity provider keeping accounts in memory.
///
/// Lock order is `subscribers` then `active`, so a new subscriber can never
/// observe a change twice or miss one.
pub struct LocalIdentityStore {
    accounts: Mutex<HashMap<String, Account>>,
    active: Mutex<Option<ActiveSession>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<Identity>>>>,
    iterations: u32,
}

impl LocalIdentityStore {
    pub fn new(iterations: u32) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            iterations: iterations.max(1),
        }
    }

    /// Create an email/password account and sign it in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Identity, IdentityError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(IdentityError::WeakPassword {
                min: MIN_PASSWORD_LENGTH,
            });
        }
        if self.lock_accounts()?.contains_key(&email) {
            return Err(IdentityError::EmailInUse);
        }

        let credential = self.hash_password(password.to_string()).await?;
        let identity = Identity::new(
            Uuid::new_v4().simple().to_string(),
            Some(email.clone()),
            display_name.map(str::to_string).filter(|n| !n.trim().is_empty()),
        );

        {
            let mut accounts = self.lock_accounts()?;
            if accounts.contains_key(&email) {
                return Err(IdentityError::EmailInUse);
            }
            accounts.insert(
                email,
                Account {
                    identity: identity.clone(),
                    credential: Some(credential),
                    providers: Vec::new(),
                },
            );
        }

        tracing::info!(uid = %identity.uid, "Account registered");
        self.transition(Some(identity.clone()))?;
        Ok(identity)
    }

    /// Token of the current sign-in, if any.
    pub fn session_token(&self) -> Option<SessionToken> {
        self.active.lock().ok()?.as_ref().map(|s| s.token)
    }

    /// Number of live subscriptions (closed ones are pruned on the next change).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    fn lock_accounts(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Account>>, IdentityError> {
        self.accounts
            .lock()
            .map_err(|_| IdentityError::Unavailable("account lock poisoned".into()))
    }

    async fn hash_password(&self, password: String) -> Result<PasswordHash, IdentityError> {
        let iterations = self.iterations;
        tokio::task::spawn_blocking(move || PasswordHash::create(&password, iterations))
            .await
            .map_err(|e| IdentityError::Unavailable(format!("hashing task failed: {e}")))
    }

    /// Replace the active session and notify subscribers in order.
    fn transition(&self, identity: Option<Identity>) -> Result<(), IdentityError> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| IdentityError::Unavailable("subscriber lock poisoned".into()))?;
        {
            let mut active = self
                .active
                .lock()
                .map_err(|_| IdentityError::Unavailable("session lock poisoned".into()))?;
            *active = identity.clone().map(|identity| ActiveSession {
                identity,
                token: SessionToken::issue(),
            });
        }
        subscribers.retain(|tx| tx.send(identity.clone()).is_ok());
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for LocalIdentityStore {
    fn subscribe(&self) -> IdentitySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => {
                let _ = tx.send(self.current());
                subscribers.push(tx);
            }
            Err(_) => {
                // Poisoned registry: deliver the current state once and close.
                tracing::warn!("Identity subscriber registry poisoned");
                let _ = tx.send(self.current());
            }
        }
        IdentitySubscription::new(rx)
    }

    fn current(&self) -> Option<Identity> {
        self.active
            .lock()
            .ok()?
            .as_ref()
            .map(|s| s.identity.clone())
    }

    async fn sign_in_with_credential(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, IdentityError> {
        let email = normalize_email(email).map_err(|_| IdentityError::InvalidCredentials)?;
        let (identity, credential) = {
            let accounts = self.lock_accounts()?;
            match accounts.get(&email) {
                Some(Account {
                    identity,
                    credential: Some(credential),
                    ..
                }) => (identity.clone(), credential.clone()),
                _ => return Err(IdentityError::InvalidCredentials),
            }
        };

        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || credential.verify(&password))
            .await
            .map_err(|e| IdentityError::Unavailable(format!("verification task failed: {e}")))?;
        if !verified {
            tracing::info!("Credential sign-in rejected");
            return Err(IdentityError::InvalidCredentials);
        }

        tracing::info!(uid = %identity.uid, "Signed in with credential");
        self.transition(Some(identity.clone()))?;
        Ok(identity)
    }

    async fn sign_in_with_provider(&self, grant: ProviderGrant) -> Result<Identity, IdentityError> {
        if grant.provider.trim().is_empty() || grant.subject.trim().is_empty() {
            return Err(IdentityError::InvalidCredentials);
        }
        let email = normalize_email(&grant.email)?;
        let identity = {
            let mut accounts = self.lock_accounts()?;
            // A linked subject wins over the email, which the provider may change.
            let key = accounts
                .iter()
                .find(|(_, a)| a.linked_subject(&grant.provider) == Some(grant.subject.as_str()))
                .map(|(key, _)| key.clone())
                .unwrap_or(email);

            let account = accounts.entry(key.clone()).or_insert_with(|| Account {
                identity: Identity::new(
                    Uuid::new_v4().simple().to_string(),
                    Some(key),
                    grant.display_name.clone(),
                ),
                credential: None,
                providers: Vec::new(),
            });
            match account.linked_subject(&grant.provider).map(str::to_string) {
                Some(subject) if subject != grant.subject => {
                    tracing::info!(provider = %grant.provider, "Provider account mismatch for email");
                    return Err(IdentityError::EmailInUse);
                }
                Some(_) => {}
                None => account
                    .providers
                    .push((grant.provider.clone(), grant.subject.clone())),
            }
            if account.identity.display_name.is_none() {
                account.identity.display_name = grant.display_name.clone();
            }
            account.identity.clone()
        };

        tracing::info!(uid = %identity.uid, provider = %grant.provider, "Signed in with provider");
        self.transition(Some(identity.clone()))?;
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        if self.current().is_none() {
            return Ok(());
        }
        self.transition(None)?;
        tracing::info!("Signed out");
        Ok(())
    }
}

fn normalize_email(email: &str) -> Result<String, IdentityError> {
    if !is_valid_email(email) {
        return Err(IdentityError::InvalidEmail);
    }
    Ok(email.trim().to_lowercase())
}
