//! Authentication module: session state, token persistence and the
//! controller screens use to sign in and out.
//!
//! This module provides:
//! - `CredentialStore`: where the bearer token (and optionally the profile)
//!   lives between runs, with memory, file, encrypted-file and keychain
//!   implementations
//! - `SessionContext`: the shared session object the HTTP client and the
//!   controller both write through
//! - `SessionController`: login, logout and start-up validation

pub mod context;
pub mod credentials;
pub mod file_store;
mod sealed;
pub mod session;
pub mod store;

pub use context::{
    AuthSnapshot, RequestTicket, SessionContext, SessionEvent, SessionState, SESSION_EXPIRED_MESSAGE,
};
pub use credentials::KeyringStore;
pub use file_store::{FileStore, SessionRecord};
pub use sealed::KeySource;
pub use session::SessionController;
pub use store::{CredentialStore, MemoryStore};
