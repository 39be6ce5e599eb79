//! Identity providers.
//!
//! An [`IdentityProvider`] turns a sign-in credential into an [`Identity`]
//! and reports sign-in/sign-out transitions to whoever listens on
//! [`IdentityProvider::changes`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use equalvoice_common::{AppError, AppResult, config::AuthConfig};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Capacity of the identity change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Shortest accepted HS256 secret, in bytes.
const MIN_SECRET_LEN: usize = 32;

/// Sample values that must never reach production.
const PLACEHOLDER_SECRETS: [&str; 6] = [
    "change-me",
    "changeme",
    "secret",
    "jwt-secret",
    "your-secret",
    "your-jwt-secret",
];

/// Reject secrets anyone could guess.
fn check_secret(secret: &str) -> AppResult<()> {
    if secret.trim().is_empty() {
        return Err(AppError::Config("auth.jwt_secret must be set".to_string()));
    }
    if PLACEHOLDER_SECRETS
        .iter()
        .any(|p| secret.trim().eq_ignore_ascii_case(p))
    {
        return Err(AppError::Config(
            "auth.jwt_secret is a placeholder value".to_string(),
        ));
    }
    if secret.len() < MIN_SECRET_LEN {
        return Err(AppError::Config(format!(
            "auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes"
        )));
    }
    Ok(())
}

/// An authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

/// An identity state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityChange {
    SignedIn(Identity),
    SignedOut { identity_id: String },
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a credential for an identity.
    ///
    /// Fails with [`AppError::Auth`] when the credential is rejected.
    async fn sign_in(&self, credential: &str) -> AppResult<Identity>;

    /// End the provider-side session of an identity.
    async fn sign_out(&self, identity_id: &str) -> AppResult<()>;

    /// Register for identity change notifications.
    fn changes(&self) -> broadcast::Receiver<IdentityChange>;
}

pub type IdentityProviderService = Arc<dyn IdentityProvider>;

/// Claims of a provider-issued ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Identity id.
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: u64,
}

impl From<IdTokenClaims> for Identity {
    fn from(claims: IdTokenClaims) -> Self {
        Self {
            id: claims.sub,
            display_name: claims.name,
            email: claims.email,
            photo_url: claims.picture,
        }
    }
}

/// Verifies HS256-signed ID tokens.
#[derive(Clone)]
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
    changes: broadcast::Sender<IdentityChange>,
}

impl JwtIdentityProvider {
    /// Create a provider from the auth configuration.
    pub fn new(config: &AuthConfig) -> AppResult<Self> {
        check_secret(&config.jwt_secret)?;

        let mut validation = Validation::default();
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match config.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            changes,
        })
    }

    fn verify(&self, credential: &str) -> AppResult<IdTokenClaims> {
        decode::<IdTokenClaims>(credential, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "credential expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidIssuer => "unexpected issuer",
                    ErrorKind::InvalidAudience => "unexpected audience",
                    _ => "invalid credential",
                };
                AppError::Auth(reason.to_string())
            })
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn sign_in(&self, credential: &str) -> AppResult<Identity> {
        let identity = Identity::from(self.verify(credential)?);
        let _ = self.changes.send(IdentityChange::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self, identity_id: &str) -> AppResult<()> {
        let _ = self.changes.send(IdentityChange::SignedOut {
            identity_id: identity_id.to_string(),
        });
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<IdentityChange> {
        self.changes.subscribe()
    }
}

/// Provider with a fixed credential table.
///
/// Each credential maps to one identity; anything else is rejected. Used for
/// local development and tests.
#[derive(Clone)]
pub struct StaticIdentityProvider {
    identities: Arc<HashMap<String, Identity>>,
    changes: broadcast::Sender<IdentityChange>,
}

impl StaticIdentityProvider {
    /// Create a provider accepting the given `(credential, identity)` pairs.
    #[must_use]
    pub fn new(identities: impl IntoIterator<Item = (String, Identity)>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            identities: Arc::new(identities.into_iter().collect()),
            changes,
        }
    }

    /// Announce a sign-in that did not go through [`IdentityProvider::sign_in`],
    /// such as a profile refresh on the provider side.
    pub fn notify(&self, change: IdentityChange) {
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn sign_in(&self, credential: &str) -> AppResult<Identity> {
        let identity = self
            .identities
            .get(credential)
            .cloned()
            .ok_or_else(|| AppError::Auth("unknown credential".to_string()))?;
        let _ = self.changes.send(IdentityChange::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self, identity_id: &str) -> AppResult<()> {
        let _ = self.changes.send(IdentityChange::SignedOut {
            identity_id: identity_id.to_string(),
        });
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<IdentityChange> {
        self.changes.subscribe()
    }
}
