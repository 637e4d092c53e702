//! Wire models shared by the API client and the session layer.
//!
//! - `UserProfile`, `Role`, `ProfilePatch`: the authenticated user
//! - `WebsiteSettings`, `SettingsPatch`: site-wide maintenance toggles
//! - `Notification`: admin notifications returned by the poll endpoint

pub mod notification;
pub mod settings;
pub mod user;

pub use notification::Notification;
pub use settings::{SettingsPatch, WebsiteSettings};
pub use user::{LoginRequest, LoginResponse, ProfilePatch, Role, UserProfile};
