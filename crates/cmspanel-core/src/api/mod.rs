//! REST API client module for the content-management backend.
//!
//! This module provides the `ApiClient`, which carries the session
//! contract for every call: bearer token on the way out, rolling refresh
//! and 401 invalidation on the way back.

pub mod client;
pub mod error;
pub mod resources;

#[cfg(test)]
mod tests;

pub use client::{ApiClient, ClientOptions, DEFAULT_REFRESH_HEADER};
pub use error::ApiError;
pub use resources::Resource;
