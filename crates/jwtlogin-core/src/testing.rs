//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::sync::Notify;

use crate::api::{AuthClient, AuthError};
use crate::auth::SessionRecord;

/// Build an unsigned three-segment token around a JSON payload
pub fn token_with_payload(payload: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

pub fn token_for(full_name: &str, role: &str) -> String {
    token_with_payload(serde_json::json!({
        "idp:user_id": "1",
        "idp:user_name": full_name,
        "idp:fullname": full_name,
        "role": role,
        "exp": 10000,
    }))
}

/// Scripted `AuthClient` that records every call.
///
/// With `hold()` set, calls park until `release()` so tests can observe
/// the in-flight state.
pub struct FakeAuthClient {
    login_result: Mutex<Result<SessionRecord, AuthError>>,
    refresh_result: Mutex<Result<SessionRecord, AuthError>>,
    login_calls: Mutex<Vec<(String, String)>>,
    refresh_calls: Mutex<Vec<String>>,
    held: AtomicBool,
    gate: Notify,
}

impl FakeAuthClient {
    pub fn new() -> Self {
        let unset = || Err(AuthError::UnknownService("not scripted".to_string()));
        Self {
            login_result: Mutex::new(unset()),
            refresh_result: Mutex::new(unset()),
            login_calls: Mutex::new(Vec::new()),
            refresh_calls: Mutex::new(Vec::new()),
            held: AtomicBool::new(false),
            gate: Notify::new(),
        }
    }

    pub fn with_login(self, result: Result<SessionRecord, AuthError>) -> Self {
        *self.login_result.lock().unwrap() = result;
        self
    }

    pub fn with_refresh(self, result: Result<SessionRecord, AuthError>) -> Self {
        *self.refresh_result.lock().unwrap() = result;
        self
    }

    pub fn hold(self) -> Self {
        self.held.store(true, Ordering::SeqCst);
        self
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn login_calls(&self) -> Vec<(String, String)> {
        self.login_calls.lock().unwrap().clone()
    }

    pub fn refresh_calls(&self) -> Vec<String> {
        self.refresh_calls.lock().unwrap().clone()
    }

    async fn wait_for_release(&self) {
        if self.held.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
    }
}

#[async_trait]
impl AuthClient for FakeAuthClient {
    async fn login(&self, username: &str, password: &str) -> Result<SessionRecord, AuthError> {
        self.login_calls
            .lock()
            .unwrap()
            .push((username.to_string(), password.to_string()));
        self.wait_for_release().await;
        self.login_result.lock().unwrap().clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<SessionRecord, AuthError> {
        self.refresh_calls.lock().unwrap().push(refresh_token.to_string());
        self.wait_for_release().await;
        self.refresh_result.lock().unwrap().clone()
    }
}
