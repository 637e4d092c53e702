use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::context::{AuthSnapshot, SessionContext, SessionEvent, SessionState};
use crate::api::{ApiClient, ApiError};
use crate::models::{ProfilePatch, UserProfile};

const MISSING_CREDENTIALS_MESSAGE: &str = "Email and password are required";
const SAVE_FAILED_MESSAGE: &str = "Signed in, but the session could not be saved on this device.";

/// Owns the anonymous/authenticated state machine that screens and
/// navigation guards consume.
///
/// Operations never return errors; outcomes are read from [`snapshot`].
///
/// [`snapshot`]: SessionController::snapshot
#[derive(Clone)]
pub struct SessionController {
    api: ApiClient,
    revoke_on_logout: bool,
}

impl SessionController {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            revoke_on_logout: false,
        }
    }

    /// Also tell the server to drop the token on logout (best effort)
    pub fn revoke_on_logout(mut self, enabled: bool) -> Self {
        self.revoke_on_logout = enabled;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn context(&self) -> &Arc<SessionContext> {
        self.api.session()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.context().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.context().subscribe_state()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.snapshot().user
    }

    pub fn clear_error(&self) {
        self.context().update_state(|s| s.error = None);
    }

    fn become_anonymous(&self, error: Option<String>) {
        self.context().update_state(|s| {
            s.state = SessionState::Anonymous;
            s.user = None;
            s.error = error;
        });
    }

    /// Sign in. Returns whether the session is now authenticated; on
    /// failure the snapshot carries a message for the login form.
    pub async fn login(&self, identifier: &str, secret: &str) -> bool {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            self.become_anonymous(Some(MISSING_CREDENTIALS_MESSAGE.to_string()));
            return false;
        }

        self.context().update_state(|s| {
            s.state = SessionState::Authenticating;
            s.error = None;
        });

        match self.api.login(identifier, secret).await {
            Ok(response) => {
                if let Err(e) = self.context().establish(&response.token, &response.user).await {
                    error!(error = %e, "Failed to save session");
                    self.become_anonymous(Some(SAVE_FAILED_MESSAGE.to_string()));
                    return false;
                }

                let user = response.user;
                info!(user_id = user.id, role = %user.role, "Login successful");
                self.context().update_state(|s| {
                    s.state = SessionState::Authenticated;
                    s.user = Some(user.clone());
                    s.error = None;
                });
                self.context().announce(SessionEvent::LoggedIn(user));
                true
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                // A failed attempt never leaves an earlier session half in place
                self.context().clear().await;
                self.become_anonymous(Some(e.login_message()));
                false
            }
        }
    }

    /// Sign out locally. Works from any state and can be repeated.
    pub async fn logout(&self) {
        // Decided from the store since a fresh process starts anonymous
        if self.revoke_on_logout && self.has_stored_token().await {
            if let Err(e) = self.api.revoke_session().await {
                debug!(error = %e, "Server-side logout failed, clearing locally anyway");
            }
        }

        self.context().clear().await;
        self.become_anonymous(None);
        self.context().announce(SessionEvent::LoggedOut);
        info!("Logged out");
    }

    async fn has_stored_token(&self) -> bool {
        matches!(self.context().store().get_token().await, Ok(Some(_)))
    }

    /// Validate the stored session once per process start.
    ///
    /// Without a stored token this settles on anonymous without touching the
    /// network. Otherwise the profile is fetched; only a 401 ends the
    /// session.
    #[doc(alias = "refresh_profile")]
    pub async fn check_auth(&self) -> SessionState {
        let store = self.context().store();

        let token = match store.get_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Stored token unreadable, discarding session");
                self.context().clear().await;
                self.become_anonymous(None);
                return SessionState::Anonymous;
            }
        };

        if token.is_none() {
            debug!("No stored token");
            self.context().update_state(|s| {
                s.state = SessionState::Anonymous;
                s.user = None;
            });
            return SessionState::Anonymous;
        }

        let cached = if store.persists_profile() {
            match store.get_profile().await {
                Ok(profile) => profile,
                Err(e) => {
                    warn!(error = %e, "Cached profile unreadable, discarding session");
                    self.context().clear().await;
                    self.become_anonymous(None);
                    return SessionState::Anonymous;
                }
            }
        } else {
            None
        };

        self.context().update_state(|s| {
            s.state = SessionState::RefreshingProfile;
            s.user = cached.clone();
            s.error = None;
        });

        match self.api.fetch_profile().await {
            Ok(profile) => {
                if store.persists_profile() {
                    if let Err(e) = store.set_profile(&profile).await {
                        warn!(error = %e, "Failed to cache profile");
                    }
                }
                debug!(user_id = profile.id, "Session restored");
                self.context().update_state(|s| {
                    s.state = SessionState::Authenticated;
                    s.user = Some(profile);
                });
                SessionState::Authenticated
            }
            Err(ApiError::Unauthorized(_)) => {
                // The client already dropped the session and recorded why
                info!("Stored session rejected by server");
                self.snapshot().state
            }
            Err(e) => match cached {
                Some(_) => {
                    warn!(error = %e, "Could not refresh profile, keeping cached session");
                    self.context().update_state(|s| s.state = SessionState::Authenticated);
                    SessionState::Authenticated
                }
                None => {
                    warn!(error = %e, "Could not verify stored session");
                    self.become_anonymous(Some(format!("Unable to verify session: {}", e)));
                    SessionState::Anonymous
                }
            },
        }
    }

    /// Merge a profile change that was already saved elsewhere into the
    /// in-memory profile.
    pub fn update_user(&self, patch: &ProfilePatch) {
        self.context().update_state(|s| {
            if let Some(ref mut user) = s.user {
                user.apply(patch);
            }
        });
    }
}
