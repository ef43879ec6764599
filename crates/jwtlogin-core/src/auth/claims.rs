use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::CodecError;

const CLAIM_USER_ID: &str = "idp:user_id";
const CLAIM_USER_NAME: &str = "idp:user_name";
const CLAIM_FULL_NAME: &str = "idp:fullname";
const CLAIM_ROLE: &str = "role";
const CLAIM_EXP: &str = "exp";

/// Identity attributes carried in the access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClaimSet {
    pub user_id: String,
    pub user_name: String,
    pub full_name: String,
    pub role: String,
    /// Unix seconds, 0 when the token carries no expiry
    pub exp: i64,
}

impl ClaimSet {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.exp == 0 {
            return None;
        }
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Tokens without an expiry never report as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| now >= exp).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Decode one base64url segment into a JSON object
fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>, CodecError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| CodecError::MalformedToken(format!("{} is not base64url: {}", name, e)))?;

    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CodecError::MalformedToken(format!("{} is not a JSON object", name))),
        Err(e) => Err(CodecError::MalformedToken(format!("{} is not JSON: {}", name, e))),
    }
}

fn string_claim(payload: &Map<String, Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse the claims from a three-segment bearer token.
///
/// The signature is not verified; the token comes straight from the
/// identity provider over TLS and is only read for display purposes.
/// Missing claims take their defaults, but a token that does not have
/// the header.payload.signature shape fails as a whole.
pub fn decode_claims(token: &str) -> Result<ClaimSet, CodecError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(CodecError::MalformedToken(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    }

    decode_segment(parts[0], "header")?;
    let payload = decode_segment(parts[1], "payload")?;

    Ok(ClaimSet {
        user_id: string_claim(&payload, CLAIM_USER_ID),
        user_name: string_claim(&payload, CLAIM_USER_NAME),
        full_name: string_claim(&payload, CLAIM_FULL_NAME),
        role: string_claim(&payload, CLAIM_ROLE),
        exp: payload.get(CLAIM_EXP).and_then(Value::as_i64).unwrap_or_default(),
    })
}
