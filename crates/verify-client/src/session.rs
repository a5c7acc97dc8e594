//! Credential context shared by every authenticated call
//!
//! A single bearer token is held behind a lock. Login is the only writer that
//! sets it; a 401 from any call clears it through [`Session::invalidate`],
//! which notifies subscribers at most once per credential.

use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Notifications emitted to whoever drives re-authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A credential was stored by a successful login
    LoggedIn,
    /// The stored credential was rejected and has been cleared
    Expired,
}

pub struct Session {
    token: RwLock<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Session {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            token: RwLock::new(None),
            events,
        }
    }

    /// Start with a credential obtained elsewhere (environment, config)
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        *session.token.write() = Some(token.into());
        session
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
        let _ = self.events.send(AuthEvent::LoggedIn);
        tracing::debug!("Session credential stored");
    }

    /// Clear the credential. Returns `true` only for the call that actually
    /// removed a live credential; repeated calls are no-ops.
    pub fn invalidate(&self) -> bool {
        let cleared = self.token.write().take().is_some();
        if cleared {
            tracing::info!("Session credential invalidated, re-authentication required");
            let _ = self.events.send(AuthEvent::Expired);
        }
        cleared
    }

    /// Clear the credential only if it is still `rejected`. A 401 that
    /// arrives for a request sent before a fresh login must not log the
    /// user out again.
    pub fn invalidate_if_current(&self, rejected: &str) -> bool {
        let cleared = {
            let mut token = self.token.write();
            if token.as_deref() == Some(rejected) {
                token.take();
                true
            } else {
                false
            }
        };
        if cleared {
            tracing::info!("Session credential rejected by server, re-authentication required");
            let _ = self.events.send(AuthEvent::Expired);
        }
        cleared
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
