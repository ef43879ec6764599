//! Identity provider client module.
//!
//! This module provides the `AuthClient` capability and its HTTP
//! implementation `ApiClient`, which talks to the identity provider's
//! `/idp/api/v1/token` endpoint using the password and refresh grants.
//!
//! Failures are reported as `AuthError`, a three-way taxonomy the
//! session lifecycle maps onto user-facing login failures.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthClient};
pub use error::AuthError;
