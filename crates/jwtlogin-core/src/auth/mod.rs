//! Token and session record handling.
//!
//! This module provides:
//! - `SessionRecord`: the persisted session issued by the token endpoint
//! - `ClaimSet`: identity claims decoded from the access token
//!
//! Neither type talks to the network or to storage.

pub mod claims;
pub mod error;
pub mod session;

pub use claims::{decode_claims, ClaimSet};
pub use error::CodecError;
pub use session::SessionRecord;
