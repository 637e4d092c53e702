use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use super::store::CredentialStore;
use crate::models::UserProfile;

/// Message recorded when the server rejects the stored token
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Capacity of the session event bus
const EVENT_BUFFER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
    /// Re-validating a stored session on start. Consumers treat this as
    /// authenticated.
    RefreshingProfile,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::RefreshingProfile)
    }
}

/// Observable authentication state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    pub state: SessionState,
    pub user: Option<UserProfile>,
    pub error: Option<String>,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(UserProfile),
    /// The server rolled the token and the new one was stored
    TokenRefreshed,
    /// The server rejected the session; whoever owns navigation should send
    /// the user to the login entry point
    Expired { message: String },
    LoggedOut,
}

/// Session generation observed when a request was sent.
///
/// Writes that stem from a response only apply while the generation is
/// unchanged, so a response to a request from an earlier session can't
/// touch the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Explicit session object shared by the HTTP client and the session
/// controller: the credential store plus the in-memory auth state.
pub struct SessionContext {
    store: Arc<dyn CredentialStore>,
    /// Session generation. Held while writing the token so refresh, clear
    /// and login writes are serialized.
    generation: Mutex<u64>,
    state: watch::Sender<AuthSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let (state, _) = watch::channel(AuthSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Arc::new(Self {
            store,
            generation: Mutex::new(0),
            state,
            events,
        })
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn update_state(&self, change: impl FnOnce(&mut AuthSnapshot)) {
        self.state.send_modify(change);
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// The stored token together with the generation it belongs to. Both
    /// are read under the generation lock so a login or clear can't slip in
    /// between them.
    pub(crate) async fn credentials(&self) -> (RequestTicket, Result<Option<String>>) {
        let generation = self.generation.lock().await;
        let token = self.store.get_token().await;
        (RequestTicket(*generation), token)
    }

    /// Store a token the server rolled on a response. Returns whether it was
    /// applied. Failures to persist are logged and swallowed.
    pub(crate) async fn apply_refresh(&self, ticket: RequestTicket, token: &str) -> bool {
        let generation = self.generation.lock().await;
        if *generation != ticket.0 {
            debug!(
                sent = ticket.0,
                current = *generation,
                "Ignoring refreshed token from an earlier session"
            );
            return false;
        }

        match self.store.set_token(token).await {
            Ok(()) => {
                debug!("Stored refreshed token");
                drop(generation);
                self.emit(SessionEvent::TokenRefreshed);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist refreshed token");
                false
            }
        }
    }

    /// Drop the session after the server rejected it. Returns whether the
    /// session was cleared; a ticket from an earlier session is ignored.
    pub(crate) async fn invalidate(&self, ticket: RequestTicket, message: &str) -> bool {
        let mut generation = self.generation.lock().await;
        if *generation != ticket.0 {
            debug!(
                sent = ticket.0,
                current = *generation,
                "Ignoring unauthorized response from an earlier session"
            );
            return false;
        }
        *generation += 1;
        self.wipe_store().await;
        drop(generation);

        info!("Session invalidated by server");
        self.update_state(|snapshot| {
            snapshot.state = SessionState::Anonymous;
            snapshot.user = None;
            snapshot.error = Some(message.to_string());
        });
        self.emit(SessionEvent::Expired {
            message: message.to_string(),
        });
        true
    }

    /// Persist a freshly issued token together with its profile. Either both
    /// are stored or neither is.
    pub(crate) async fn establish(&self, token: &str, profile: &UserProfile) -> Result<()> {
        let mut generation = self.generation.lock().await;
        *generation += 1;

        let stored: Result<()> = async {
            self.store.set_token(token).await?;
            if self.store.persists_profile() {
                self.store.set_profile(profile).await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = stored {
            warn!(error = %e, "Failed to persist new session, rolling back");
            self.wipe_store().await;
            return Err(e);
        }
        Ok(())
    }

    /// Forget the stored session. Safe to call when nothing is stored.
    pub(crate) async fn clear(&self) {
        let mut generation = self.generation.lock().await;
        *generation += 1;
        self.wipe_store().await;
    }

    pub(crate) fn announce(&self, event: SessionEvent) {
        self.emit(event);
    }

    async fn wipe_store(&self) {
        if let Err(e) = self.store.clear_token().await {
            warn!(error = %e, "Failed to clear stored token");
        }
        if let Err(e) = self.store.clear_profile().await {
            warn!(error = %e, "Failed to clear cached profile");
        }
    }
}
