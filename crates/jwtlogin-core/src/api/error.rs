use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Unknown service error: {0}")]
    UnknownService(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// OAuth error code for a rejected refresh token
const INVALID_GRANT: &str = "invalid_grant";

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a rejected password grant. Only 401 means bad credentials.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => AuthError::InvalidCredentials,
            _ => AuthError::UnknownService(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }

    /// Map a rejected refresh grant. A 400 `invalid_grant` is an expired or
    /// revoked refresh token.
    pub fn from_refresh_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::BAD_REQUEST && body.contains(INVALID_GRANT) {
            return AuthError::InvalidCredentials;
        }
        Self::from_status(status, body)
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            AuthError::NetworkUnavailable(err.to_string())
        } else {
            AuthError::UnknownService(err.to_string())
        }
    }
}
