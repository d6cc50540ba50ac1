//! Explicitly owned session object
//!
//! The session holds the current identity and bearer token. Stores and the
//! live channel subscribe to it and reset themselves when the identity changes
//! (login, logout, or a 401 from the server).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::notifications::PushSdk;

/// An authenticated identity
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Server-side user identifier
    pub user_id: String,
    /// Opaque bearer token
    pub token: String,
}

impl Identity {
    /// Create a new identity
    pub fn new(user_id: &str, token: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            token: token.to_string(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Snapshot of the session published to subscribers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Bumped on every open/close/invalidate
    pub generation: u64,
    /// Current identity, if logged in
    pub identity: Option<Identity>,
}

impl SessionState {
    /// Current user id, if logged in
    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }
}

/// Shared session handle (cheap to clone)
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: watch::Sender<SessionState>,
    push: Option<Arc<dyn PushSdk>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a closed session
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a closed session that links/unlinks the push SDK identity
    pub fn with_push_sdk(push: Arc<dyn PushSdk>) -> Self {
        Self::build(Some(push))
    }

    fn build(push: Option<Arc<dyn PushSdk>>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(SessionInner { state, push }),
        }
    }

    /// Open the session for an identity, replacing any previous one
    pub fn open(&self, identity: Identity) {
        let user_id = identity.user_id.clone();
        self.inner.state.send_modify(|state| {
            state.generation += 1;
            state.identity = Some(identity);
        });
        tracing::info!("Session opened for user {user_id}");

        if let Some(push) = &self.inner.push {
            push.link_external_id(&user_id);
        }
    }

    /// Close the session (logout)
    pub fn close(&self) {
        if self.end() {
            tracing::info!("Session closed");
        }
    }

    /// Invalidate the session after the server rejected the token
    pub fn invalidate(&self) {
        if self.end() {
            tracing::warn!("Session expired, logging out");
        }
    }

    fn end(&self) -> bool {
        let was_open = self.inner.state.borrow().identity.is_some();
        if !was_open {
            return false;
        }

        self.inner.state.send_modify(|state| {
            state.generation += 1;
            state.identity = None;
        });

        if let Some(push) = &self.inner.push {
            push.unlink_external_id();
        }
        true
    }

    /// Current snapshot
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Current identity
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity.clone()
    }

    /// Current bearer token
    pub fn token(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .identity
            .as_ref()
            .map(|i| i.token.clone())
    }

    /// Current user id
    pub fn user_id(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .identity
            .as_ref()
            .map(|i| i.user_id.clone())
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.inner.state.borrow().generation
    }

    /// Whether an identity is open
    pub fn is_open(&self) -> bool {
        self.inner.state.borrow().identity.is_some()
    }

    /// Subscribe to session changes
    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            rx: self.inner.state.subscribe(),
        }
    }
}

/// Receiving side of a session subscription
#[derive(Debug, Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<SessionState>,
}

impl SessionWatch {
    /// Latest snapshot, without marking it seen
    pub fn current(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    /// Return the new snapshot if the session changed since last seen
    pub fn take_change(&mut self) -> Option<SessionState> {
        match self.rx.has_changed() {
            Ok(true) => Some(self.rx.borrow_and_update().clone()),
            _ => None,
        }
    }

    /// Wait for the next change. Returns `None` once the session is dropped.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}
