use serde::{Deserialize, Serialize};

use super::claims::{decode_claims, ClaimSet};
use super::CodecError;

/// Token type assumed when the server omits one
const DEFAULT_TOKEN_TYPE: &str = "bearer";

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// A persisted authenticated session as issued by the token endpoint.
///
/// Records are replaced wholesale in the store, never edited in place.
/// The field names double as the wire and storage schema, so optional
/// fields fall back to their defaults when an older record lacks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
}

impl SessionRecord {
    /// Create a record with only an access token, other fields defaulted
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            expires_in: 0,
            refresh_token: String::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    pub fn with_expires_in(mut self, expires_in: i64) -> Self {
        self.expires_in = expires_in;
        self
    }

    /// Encode for durable storage
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored record. Never panics; malformed input is `CorruptSession`.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        serde_json::from_str(raw).map_err(|e| CodecError::CorruptSession(e.to_string()))
    }

    /// Decode the identity claims carried by the access token
    pub fn claims(&self) -> Result<ClaimSet, CodecError> {
        decode_claims(&self.access_token)
    }
}

// Display omits token values; use it in log fields.
impl std::fmt::Display for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SessionRecord(type={}, expires_in={}, has_refresh={})",
            self.token_type,
            self.expires_in,
            !self.refresh_token.is_empty()
        )
    }
}
