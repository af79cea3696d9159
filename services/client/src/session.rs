//! services/client/src/session.rs
//!
//! The session store: holds the authenticated identity and bearer token,
//! restores them from the durable vault at startup, and is the vault's
//! single writer. Every mutation updates memory and the vault in the same
//! call, so there is no consistency window between the two.

use learnhub_core::domain::{RegisterProfile, StoredSession, UserAccount};
use learnhub_core::ports::{AuthApi, PortError, SessionVault};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

const DEFAULT_LOGIN_FAILED: &str = "Login failed";

/// An error raised when a login or registration does not yield a session.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The gateway rejected the attempt, or its reply was missing the user
    /// or token. Carries the server-provided message when there is one.
    #[error("{0}")]
    Rejected(String),

    /// The attempt succeeded but the session could not be persisted.
    #[error("failed to persist session: {0}")]
    Storage(#[from] PortError),
}

/// Holds the current session and broadcasts authentication-state changes.
///
/// Consumers that need to react to a forced logout (the "redirect to the
/// login view" of a UI client) watch the channel from [`subscribe`].
///
/// [`subscribe`]: SessionStore::subscribe
pub struct SessionStore {
    vault: Arc<dyn SessionVault>,
    current: RwLock<Option<StoredSession>>,
    auth_tx: watch::Sender<bool>,
}

impl SessionStore {
    pub fn new(vault: Arc<dyn SessionVault>) -> Self {
        let (auth_tx, _) = watch::channel(false);
        Self {
            vault,
            current: RwLock::new(None),
            auth_tx,
        }
    }

    /// Restores the session from the vault at startup.
    ///
    /// If the vault holds a complete, parsable session the store becomes
    /// authenticated; anything else leaves it unauthenticated without
    /// surfacing an error.
    pub async fn restore(&self) {
        match self.vault.load() {
            Some(stored) => {
                info!(user_id = stored.user.id, "restored session from vault");
                *self.current.write().await = Some(stored);
                let _ = self.auth_tx.send(true);
            }
            None => {
                debug!("no stored session to restore");
            }
        }
    }

    /// Calls the authentication endpoint and establishes the session.
    ///
    /// Only a reply with `success` set and both a user and a token counts;
    /// any other outcome fails with the server-provided message or a
    /// default string, and the store is left untouched.
    pub async fn login(
        &self,
        auth: &dyn AuthApi,
        email: &str,
        password: &str,
    ) -> Result<UserAccount, AuthError> {
        let reply = auth
            .login(email, password)
            .await
            .map_err(|e| AuthError::Rejected(rejection_message(&e)))?;

        let message = reply.message.clone();
        match (reply.success, reply.user, reply.token) {
            (true, Some(user), Some(token)) => {
                self.establish(user.clone(), token).await?;
                Ok(user)
            }
            _ => Err(AuthError::Rejected(
                message.unwrap_or_else(|| DEFAULT_LOGIN_FAILED.to_string()),
            )),
        }
    }

    /// Registers a new account and establishes the session directly from
    /// the registration reply, with the same contract as [`login`].
    ///
    /// [`login`]: SessionStore::login
    pub async fn register(
        &self,
        auth: &dyn AuthApi,
        profile: &RegisterProfile,
    ) -> Result<UserAccount, AuthError> {
        let reply = auth
            .register(profile)
            .await
            .map_err(|e| AuthError::Rejected(rejection_message(&e)))?;

        let message = reply.message.clone();
        match (reply.success, reply.user, reply.token) {
            (true, Some(user), Some(token)) => {
                self.establish(user.clone(), token).await?;
                Ok(user)
            }
            _ => Err(AuthError::Rejected(
                message.unwrap_or_else(|| DEFAULT_LOGIN_FAILED.to_string()),
            )),
        }
    }

    /// Direct session establishment: writes memory and the vault in the
    /// same call.
    pub async fn establish(&self, user: UserAccount, token: String) -> Result<(), PortError> {
        let stored = StoredSession { user, token };
        self.vault.store(&stored)?;
        *self.current.write().await = Some(stored);
        let _ = self.auth_tx.send(true);
        Ok(())
    }

    /// Clears the session locally. No gateway endpoint is called.
    pub async fn logout(&self) {
        self.vault.clear();
        *self.current.write().await = None;
        let _ = self.auth_tx.send(false);
        info!("logged out");
    }

    /// The forced-logout path taken when any call returns 401: identical
    /// clearing, but logged as an expiry so the cause is visible.
    pub async fn expire(&self) {
        self.vault.clear();
        *self.current.write().await = None;
        let _ = self.auth_tx.send(false);
        info!("session expired by gateway, forcing logout");
    }

    pub async fn token(&self) -> Option<String> {
        self.current.read().await.as_ref().map(|s| s.token.clone())
    }

    pub async fn user(&self) -> Option<UserAccount> {
        self.current.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// A watch channel carrying the authentication state. Receivers see
    /// `false` after any logout, voluntary or forced.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.auth_tx.subscribe()
    }
}

/// The message surfaced when a port error aborts a login attempt: the
/// gateway's own message for API rejections, the display form otherwise.
fn rejection_message(err: &PortError) -> String {
    match err {
        PortError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
