//! Session service.
//!
//! Wraps an [`IdentityProvider`]: signs identities in and out, maps opaque
//! session tokens to identities, and makes sure every signed-in identity has
//! a profile.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use equalvoice_common::{AppResult, IdGenerator};
use equalvoice_db::{NewProfile, ProfileStoreService, entities::profile};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::services::identity::{Identity, IdentityChange, IdentityProviderService};

/// How often the observer drops expired sessions.
const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

#[derive(Debug, Clone)]
struct SessionEntry {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// Result of a successful sign-in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub token: String,
    pub identity: Identity,
}

/// Session service for business logic.
#[derive(Clone)]
pub struct SessionService {
    provider: IdentityProviderService,
    profiles: ProfileStoreService,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    ttl: Duration,
    id_gen: IdGenerator,
}

impl SessionService {
    /// Create a new session service. Sessions expire `ttl_secs` after sign-in.
    #[must_use]
    pub fn new(
        provider: IdentityProviderService,
        profiles: ProfileStoreService,
        ttl_secs: u64,
    ) -> Self {
        Self {
            provider,
            profiles,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::try_seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
                .unwrap_or(Duration::MAX),
            id_gen: IdGenerator::new(),
        }
    }

    /// Sign in with a provider credential and open a session.
    pub async fn sign_in(&self, credential: &str) -> AppResult<SignedIn> {
        let identity = self.provider.sign_in(credential).await?;
        self.ensure_profile(&identity).await?;

        let token = self.id_gen.generate_token();
        let entry = SessionEntry {
            identity: identity.clone(),
            expires_at: Utc::now()
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        {
            let mut sessions = self.sessions.write().await;
            Self::retain_live(&mut sessions);
            sessions.insert(token.clone(), entry);
        }

        tracing::info!(user_id = %identity.id, "Signed in");
        Ok(SignedIn { token, identity })
    }

    /// Revoke a session token. Unknown tokens are ignored.
    pub async fn sign_out(&self, token: &str) -> AppResult<()> {
        let Some(entry) = self.sessions.write().await.remove(token) else {
            return Ok(());
        };

        self.provider.sign_out(&entry.identity.id).await?;
        tracing::info!(user_id = %entry.identity.id, "Signed out");
        Ok(())
    }

    /// The identity behind a session token, if the session is live.
    pub async fn resolve(&self, token: &str) -> Option<Identity> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                Some(entry) if entry.expires_at > Utc::now() => {
                    return Some(entry.identity.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired
        self.sessions.write().await.remove(token);
        None
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        Self::retain_live(&mut sessions);
        before - sessions.len()
    }

    fn retain_live(sessions: &mut HashMap<String, SessionEntry>) {
        let now = Utc::now();
        sessions.retain(|_, entry| entry.expires_at > now);
    }

    /// Whether the identity's profile carries the admin flag.
    ///
    /// Anything short of a readable profile with the flag set counts as
    /// non-admin.
    pub async fn is_admin(&self, identity: Option<&Identity>) -> bool {
        let Some(identity) = identity else {
            return false;
        };

        match self.profiles.find_profile(&identity.id).await {
            Ok(profile) => profile.is_some_and(|p| p.is_admin),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %identity.id, "Failed to read profile");
                false
            }
        }
    }

    /// Get the profile of an identity.
    pub async fn profile(&self, identity: &Identity) -> AppResult<Option<profile::Model>> {
        self.profiles.find_profile(&identity.id).await
    }

    /// Start following the provider's identity changes.
    ///
    /// Sign-ins refresh the identity held by live sessions and create the
    /// profile if it is missing; sign-outs revoke every session of that
    /// identity. Expired sessions are swept periodically. The task runs until
    /// [`ObserverHandle::shutdown`] is called.
    #[must_use]
    pub fn start_observer(&self) -> ObserverHandle {
        let mut changes = self.provider.changes();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let service = self.clone();

        let task = tokio::spawn(async move {
            let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
            sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = sweep.tick() => {
                        let purged = service.purge_expired().await;
                        if purged > 0 {
                            tracing::debug!(purged, "Purged expired sessions");
                        }
                    }
                    change = changes.recv() => match change {
                        Ok(change) => service.apply_change(change).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Identity observer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::debug!("Identity observer stopped");
        });

        ObserverHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    async fn apply_change(&self, change: IdentityChange) {
        match change {
            IdentityChange::SignedIn(identity) => {
                {
                    let mut sessions = self.sessions.write().await;
                    for entry in sessions.values_mut() {
                        if entry.identity.id == identity.id {
                            entry.identity = identity.clone();
                        }
                    }
                }
                if let Err(e) = self.ensure_profile(&identity).await {
                    tracing::warn!(error = %e, user_id = %identity.id, "Failed to ensure profile");
                }
            }
            IdentityChange::SignedOut { identity_id } => {
                self.sessions
                    .write()
                    .await
                    .retain(|_, entry| entry.identity.id != identity_id);
                tracing::debug!(user_id = %identity_id, "Revoked sessions");
            }
        }
    }

    async fn ensure_profile(&self, identity: &Identity) -> AppResult<()> {
        let created = self
            .profiles
            .create_profile_if_absent(NewProfile {
                identity_id: identity.id.clone(),
                display_name: identity.display_name.clone(),
                email: identity.email.clone(),
                photo_url: identity.photo_url.clone(),
            })
            .await?;

        if created {
            tracing::info!(user_id = %identity.id, "Created profile");
        }
        Ok(())
    }
}

/// Handle to a running identity observer.
pub struct ObserverHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ObserverHandle {
    /// Stop observing and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "Identity observer task failed");
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            self.task.abort();
        }
    }
}
