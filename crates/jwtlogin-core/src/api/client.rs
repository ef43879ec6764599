//! Token endpoint client.
//!
//! `AuthClient` is the capability the session lifecycle depends on;
//! `ApiClient` implements it against the identity provider's
//! form-encoded token endpoint.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};

use crate::auth::SessionRecord;
use crate::config::Config;

use super::AuthError;

// ============================================================================
// Constants
// ============================================================================

/// Token endpoint path, shared by the password and refresh grants
const TOKEN_PATH: &str = "/idp/api/v1/token";

const GRANT_PASSWORD: &str = "password";
const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Network operations needed to obtain and renew a session.
///
/// Both calls are single-shot: retries and timeouts belong to the
/// implementation, never to the caller.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Exchange a username and password for a session (password grant)
    async fn login(&self, username: &str, password: &str) -> Result<SessionRecord, AuthError>;

    /// Exchange a refresh token for a new session (refresh grant)
    async fn refresh(&self, refresh_token: &str) -> Result<SessionRecord, AuthError>;
}

/// HTTP client for the identity provider.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    client_id: String,
}

impl ApiClient {
    pub fn new(base_url: &str, client_id: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.client_id,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn token_url(&self) -> String {
        format!("{}{}", self.base_url, TOKEN_PATH)
    }

    /// POST a grant to the token endpoint and decode the issued session
    async fn request_token(&self, grant_type: &str, form: &[(&str, &str)]) -> Result<SessionRecord, AuthError> {
        let mut body: Vec<(&str, &str)> = form.to_vec();
        body.push(("grant_type", grant_type));
        body.push(("client_id", self.client_id.as_str()));

        debug!(grant_type, url = %self.token_url(), "Requesting token");

        let response = self
            .client
            .post(self.token_url())
            .header(header::ACCEPT, "application/json")
            .form(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(grant_type, error = %e, "Token request failed to send");
                AuthError::from_transport(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = if grant_type == GRANT_REFRESH_TOKEN {
                AuthError::from_refresh_status(status, &body)
            } else {
                AuthError::from_status(status, &body)
            };
            warn!(grant_type, %status, error = %err, "Token request rejected");
            return Err(err);
        }

        let record: SessionRecord = response
            .json()
            .await
            .map_err(|e| AuthError::UnknownService(format!("Failed to parse token response: {}", e)))?;

        debug!(grant_type, session = %record, "Token issued");
        Ok(record)
    }
}

#[async_trait]
impl AuthClient for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<SessionRecord, AuthError> {
        self.request_token(GRANT_PASSWORD, &[("username", username), ("password", password)])
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionRecord, AuthError> {
        self.request_token(GRANT_REFRESH_TOKEN, &[("refresh_token", refresh_token)])
            .await
    }
}
