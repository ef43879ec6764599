//! jwtlogin core - session lifecycle for a password-grant identity provider.
//!
//! This crate signs a user in against an OAuth token endpoint, persists the
//! issued session, decodes identity claims from the bearer token, and
//! silently renews the session on startup. Front ends render the state
//! published by [`SessionManager`] and forward user intents into it.

pub mod api;
pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, AuthClient, AuthError};
pub use auth::{decode_claims, ClaimSet, CodecError, SessionRecord};
pub use config::{Config, StorageKind};
pub use lifecycle::{Identity, LoginFailure, LoginState, RefreshState, SessionManager};
pub use store::{PreferenceStore, SessionFeed, SessionStore, StorageError};
