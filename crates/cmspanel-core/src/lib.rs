//! cmspanel-core - client side of the content-management admin API.
//!
//! The interesting part is the session protocol shared by every request:
//! the stored bearer token is attached on the way out, a token rolled by
//! the server in a response header replaces the stored one, and a 401 ends
//! the session and tells whoever owns navigation to go back to login.
//!
//! ```no_run
//! use cmspanel_core::{ApiClient, ClientOptions, MemoryStore, SessionContext, SessionController};
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let session = SessionContext::new(Arc::new(MemoryStore::new()));
//! let api = ApiClient::new(ClientOptions::new("https://cms.example.com/api"), session)?;
//! let controller = SessionController::new(api);
//! if controller.login("admin@example.com", "secret").await {
//!     println!("Signed in as {:?}", controller.user());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod notifications;

pub use api::{ApiClient, ApiError, ClientOptions, Resource};
pub use auth::{
    AuthSnapshot, CredentialStore, FileStore, KeySource, KeyringStore, MemoryStore, SessionContext,
    SessionController, SessionEvent, SessionState,
};
pub use config::{Config, StoreKind};
pub use notifications::{NotificationFeed, NotificationPoller};
