//! Session lifecycle management.
//!
//! `SessionManager` owns the authenticated session on behalf of the UI.
//! It runs two independent flows that share only the session store:
//!
//! - Login: `Idle -> Submitting -> Success | Failed(reason)`
//! - Startup refresh: `Pending -> RefreshSucceeded | RefreshFailed`, once
//!
//! and a claim projection that turns the stored token into the `Identity`
//! shown on the home view. Every flow publishes its state through a
//! `watch` channel.
//!
//! Disposal cancels the manager's token. In-flight work observes it before
//! touching the store or publishing a state, so a disposed manager never
//! changes again.

pub mod identity;
pub mod login;
pub mod refresh;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::AuthClient;
use crate::store::SessionStore;

pub use identity::Identity;
pub use login::{LoginFailure, LoginState};
pub use refresh::RefreshState;

struct Inner<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    login: watch::Sender<LoginState>,
    refresh: watch::Sender<RefreshState>,
    refresh_started: AtomicBool,
    cancel: CancellationToken,
}

impl<C, S> Drop for Inner<C, S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Orchestrates login, startup refresh, and identity projection.
/// Clone is cheap; clones share the same flows.
pub struct SessionManager<C, S> {
    inner: Arc<Inner<C, S>>,
}

impl<C, S> Clone for SessionManager<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, S> SessionManager<C, S>
where
    C: AuthClient + 'static,
    S: SessionStore + 'static,
{
    pub fn new(client: Arc<C>, store: Arc<S>) -> Self {
        let (login, _) = watch::channel(LoginState::default());
        let (refresh, _) = watch::channel(RefreshState::default());

        Self {
            inner: Arc::new(Inner {
                client,
                store,
                login,
                refresh,
                refresh_started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Detach from all in-flight work. Late results are discarded.
    pub fn dispose(&self) {
        debug!("Session manager disposed");
        self.inner.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // =========================================================================
    // Login
    // =========================================================================

    pub fn login_state(&self) -> LoginState {
        *self.inner.login.borrow()
    }

    pub fn watch_login(&self) -> watch::Receiver<LoginState> {
        self.inner.login.subscribe()
    }

    /// Run the login flow to completion.
    ///
    /// The flow itself runs on a task owned by the manager; dropping the
    /// returned future stops waiting for it but not the flow.
    /// Returns `false` without side effects when a field is empty, a login
    /// is already in progress, or the manager has been disposed.
    pub async fn submit(&self, username: &str, password: &str) -> bool {
        if username.is_empty() || password.is_empty() {
            debug!("Login ignored: username and password required");
            return false;
        }
        if self.is_disposed() {
            return false;
        }

        let accepted = self.inner.login.send_if_modified(|state| {
            if state.is_loading() {
                false
            } else {
                *state = LoginState::Submitting;
                true
            }
        });
        if !accepted {
            debug!("Login ignored: already submitting");
            return false;
        }

        info!(username, "Submitting login");

        // The flow runs on its own task so a dropped caller cannot strand
        // the state at Submitting.
        let manager = self.clone();
        let (username, password) = (username.to_string(), password.to_string());
        let flow = tokio::spawn(async move {
            match manager.run_login(&username, &password).await {
                Some(state) => manager.publish_login(state),
                None => debug!("Login result discarded after disposal"),
            }
        });

        if let Err(e) = flow.await {
            error!(error = %e, "Login task failed");
            self.publish_login(LoginState::Failed(LoginFailure::UnknownError));
        }
        true
    }

    /// Start the login flow on the runtime without waiting for it
    pub fn spawn_submit(&self, username: String, password: String) -> JoinHandle<bool> {
        let manager = self.clone();
        tokio::spawn(async move { manager.submit(&username, &password).await })
    }

    /// `None` when the manager was disposed mid-flight
    async fn run_login(&self, username: &str, password: &str) -> Option<LoginState> {
        let cancel = &self.inner.cancel;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = self.inner.client.login(username, password) => result,
        };

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Some(LoginState::Failed(LoginFailure::from(&e)));
            }
        };

        if cancel.is_cancelled() {
            return None;
        }

        match self.inner.store.put(record).await {
            Ok(record) => {
                info!(session = %record, "Login successful");
                Some(LoginState::Success)
            }
            Err(e) => {
                error!(error = %e, "Authenticated but failed to store session");
                Some(LoginState::Failed(LoginFailure::UnknownError))
            }
        }
    }

    fn publish_login(&self, state: LoginState) {
        if self.is_disposed() {
            return;
        }
        self.inner.login.send_replace(state);
    }

    /// Clear a failure so it is not shown again. No-op unless `Failed`.
    pub fn dismiss_error(&self) {
        if self.is_disposed() {
            return;
        }
        self.inner.login.send_if_modified(|state| match state {
            LoginState::Failed(_) => {
                *state = LoginState::Idle;
                true
            }
            LoginState::Idle | LoginState::Submitting | LoginState::Success => false,
        });
    }

    // =========================================================================
    // Startup refresh
    // =========================================================================

    pub fn refresh_state(&self) -> RefreshState {
        *self.inner.refresh.borrow()
    }

    pub fn watch_refresh(&self) -> watch::Receiver<RefreshState> {
        self.inner.refresh.subscribe()
    }

    /// Renew the stored session once per manager.
    ///
    /// Later calls do not start another attempt; they return the flow's
    /// current state. As with `submit`, the attempt outlives a dropped caller.
    pub async fn try_refresh(&self) -> RefreshState {
        if self.inner.refresh_started.swap(true, Ordering::SeqCst) {
            debug!("Startup refresh already started");
            return self.refresh_state();
        }

        let manager = self.clone();
        let flow = tokio::spawn(async move {
            match manager.run_refresh().await {
                Some(state) => manager.publish_refresh(state),
                None => debug!("Refresh result discarded after disposal"),
            }
        });

        if let Err(e) = flow.await {
            error!(error = %e, "Refresh task failed");
            self.publish_refresh(RefreshState::RefreshFailed);
        }
        self.refresh_state()
    }

    fn publish_refresh(&self, state: RefreshState) {
        if self.is_disposed() {
            return;
        }
        self.inner.refresh.send_replace(state);
    }

    pub fn spawn_refresh(&self) -> JoinHandle<RefreshState> {
        let manager = self.clone();
        tokio::spawn(async move { manager.try_refresh().await })
    }

    async fn run_refresh(&self) -> Option<RefreshState> {
        let cancel = &self.inner.cancel;

        // One-shot read: only the first value the feed yields
        let mut feed = self.inner.store.subscribe();
        let stored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            first = feed.next() => first.flatten(),
        };
        drop(feed);

        let Some(stored) = stored else {
            info!("No stored session, skipping refresh");
            return Some(RefreshState::RefreshFailed);
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = self.inner.client.refresh(&stored.refresh_token) => result,
        };

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                return Some(RefreshState::RefreshFailed);
            }
        };

        if cancel.is_cancelled() {
            return None;
        }

        match self.inner.store.put(record).await {
            Ok(record) => {
                info!(session = %record, "Session refreshed");
                Some(RefreshState::RefreshSucceeded)
            }
            Err(e) => {
                error!(error = %e, "Refreshed but failed to store session");
                Some(RefreshState::RefreshFailed)
            }
        }
    }

    // =========================================================================
    // Identity projection
    // =========================================================================

    /// Follow the store and project each session onto an `Identity`.
    ///
    /// Starts at the empty identity. The projection task ends on disposal
    /// or once every receiver is dropped.
    pub fn watch_identity(&self) -> watch::Receiver<Identity> {
        let (tx, rx) = watch::channel(Identity::default());
        let mut feed = self.inner.store.subscribe();
        let cancel = self.inner.cancel.clone();

        tokio::spawn(async move {
            loop {
                let value = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    value = feed.next() => value,
                };
                let Some(value) = value else { break };

                if let Some(next) = identity::project(value.as_ref()) {
                    tx.send_if_modified(|current| {
                        if *current == next {
                            false
                        } else {
                            *current = next;
                            true
                        }
                    });
                }
            }
            debug!("Identity projection stopped");
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::api::AuthError;
    use crate::auth::SessionRecord;
    use crate::store::{MemoryBackend, PreferenceStore};
    use crate::testing::{token_for, FakeAuthClient};

    type Manager = SessionManager<FakeAuthClient, PreferenceStore<MemoryBackend>>;

    const WAIT: Duration = Duration::from_secs(2);

    async fn manager_with(client: FakeAuthClient, backend: MemoryBackend) -> (Manager, Arc<FakeAuthClient>) {
        let client = Arc::new(client);
        let store = Arc::new(PreferenceStore::open(backend).await);
        (SessionManager::new(Arc::clone(&client), store), client)
    }

    async fn manager(client: FakeAuthClient) -> (Manager, Arc<FakeAuthClient>) {
        manager_with(client, MemoryBackend::new()).await
    }

    async fn stored(manager: &Manager, record: SessionRecord) {
        manager.store().put(record).await.unwrap();
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_success_stores_session() {
        let record = SessionRecord::new(token_for("James Bond", "marksman")).with_refresh_token("r");
        let (manager, client) = manager(FakeAuthClient::new().with_login(Ok(record.clone()))).await;

        assert!(manager.submit("bond", "007").await);

        assert_eq!(manager.login_state(), LoginState::Success);
        assert_eq!(manager.store().get_latest(), Some(record));
        assert_eq!(client.login_calls(), vec![("bond".to_string(), "007".to_string())]);
    }

    #[tokio::test]
    async fn test_login_no_internet() {
        let (manager, _) = manager(
            FakeAuthClient::new().with_login(Err(AuthError::NetworkUnavailable("unresolvable host".to_string()))),
        )
        .await;

        manager.submit("bond", "007").await;
        assert_eq!(manager.login_state(), LoginState::Failed(LoginFailure::NoInternet));
        assert_eq!(manager.store().get_latest(), None);
    }

    #[tokio::test]
    async fn test_login_invalid_credentials() {
        let (manager, _) = manager(FakeAuthClient::new().with_login(Err(AuthError::InvalidCredentials))).await;

        manager.submit("bond", "wrong").await;
        assert_eq!(manager.login_state(), LoginState::Failed(LoginFailure::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_unknown_service_error() {
        let (manager, _) = manager(
            FakeAuthClient::new().with_login(Err(AuthError::UnknownService("Status 500".to_string()))),
        )
        .await;

        manager.submit("bond", "007").await;
        assert_eq!(manager.login_state(), LoginState::Failed(LoginFailure::UnknownError));
    }

    #[tokio::test]
    async fn test_login_store_failure_is_unknown_error() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let (manager, _) = manager_with(
            FakeAuthClient::new().with_login(Ok(SessionRecord::new("a.b.c"))),
            backend,
        )
        .await;

        manager.submit("bond", "007").await;
        assert_eq!(manager.login_state(), LoginState::Failed(LoginFailure::UnknownError));
        assert_eq!(manager.store().get_latest(), None);
    }

    #[tokio::test]
    async fn test_login_empty_fields_ignored() {
        let (manager, client) = manager(FakeAuthClient::new().with_login(Ok(SessionRecord::new("a.b.c")))).await;

        assert!(!manager.submit("", "007").await);
        assert!(!manager.submit("bond", "").await);
        assert_eq!(manager.login_state(), LoginState::Idle);
        assert!(client.login_calls().is_empty());
    }

    #[tokio::test]
    async fn test_login_rejects_concurrent_submission() {
        let (manager, client) = manager(
            FakeAuthClient::new()
                .with_login(Ok(SessionRecord::new("a.b.c")))
                .hold(),
        )
        .await;
        let mut login = manager.watch_login();

        let first = manager.spawn_submit("bond".to_string(), "007".to_string());
        tokio::time::timeout(WAIT, login.wait_for(LoginState::is_loading))
            .await
            .unwrap()
            .unwrap();

        assert!(!manager.submit("bond", "007").await);

        client.release();
        assert!(first.await.unwrap());
        assert_eq!(manager.login_state(), LoginState::Success);
        assert_eq!(client.login_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_login_allowed_again_after_failure() {
        let (manager, client) = manager(FakeAuthClient::new().with_login(Err(AuthError::InvalidCredentials))).await;

        assert!(manager.submit("bond", "wrong").await);
        assert!(manager.submit("bond", "wrong").await);
        assert_eq!(client.login_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_dismiss_error() {
        let (manager, _) = manager(FakeAuthClient::new().with_login(Err(AuthError::InvalidCredentials))).await;
        let mut login = manager.watch_login();

        // From Idle: no-op, nothing published
        manager.dismiss_error();
        assert_eq!(manager.login_state(), LoginState::Idle);
        assert!(!login.has_changed().unwrap());

        manager.submit("bond", "wrong").await;
        assert_eq!(manager.login_state().failure(), Some(LoginFailure::InvalidCredentials));

        manager.dismiss_error();
        assert_eq!(manager.login_state(), LoginState::Idle);
        assert_eq!(manager.login_state().failure(), None);
    }

    #[tokio::test]
    async fn test_dismiss_error_keeps_success() {
        let (manager, _) = manager(FakeAuthClient::new().with_login(Ok(SessionRecord::new("a.b.c")))).await;
        manager.submit("bond", "007").await;
        manager.dismiss_error();
        assert_eq!(manager.login_state(), LoginState::Success);
    }

    // -------------------------------------------------------------------------
    // Startup refresh
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_refresh_without_stored_session() {
        let (manager, client) = manager(FakeAuthClient::new().with_refresh(Ok(SessionRecord::new("new")))).await;

        assert_eq!(manager.try_refresh().await, RefreshState::RefreshFailed);
        assert!(client.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let renewed = SessionRecord::new("renewed").with_refresh_token("refresh-2");
        let (manager, client) = manager(FakeAuthClient::new().with_refresh(Ok(renewed.clone()))).await;
        stored(&manager, SessionRecord::new("old").with_refresh_token("refresh")).await;

        assert_eq!(manager.refresh_state(), RefreshState::Pending);
        assert_eq!(manager.try_refresh().await, RefreshState::RefreshSucceeded);
        assert_eq!(client.refresh_calls(), vec!["refresh".to_string()]);
        assert_eq!(manager.store().get_latest(), Some(renewed));
    }

    #[tokio::test]
    async fn test_refresh_client_failure() {
        let original = SessionRecord::new("old").with_refresh_token("refresh");
        let (manager, _) = manager(FakeAuthClient::new().with_refresh(Err(AuthError::InvalidCredentials))).await;
        stored(&manager, original.clone()).await;

        assert_eq!(manager.try_refresh().await, RefreshState::RefreshFailed);
        assert_eq!(manager.store().get_latest(), Some(original));
    }

    #[tokio::test]
    async fn test_refresh_store_failure() {
        let (manager, _) = manager(FakeAuthClient::new().with_refresh(Ok(SessionRecord::new("renewed")))).await;
        stored(&manager, SessionRecord::new("old").with_refresh_token("refresh")).await;
        manager.store().backend().set_fail_writes(true);

        assert_eq!(manager.try_refresh().await, RefreshState::RefreshFailed);
    }

    #[tokio::test]
    async fn test_refresh_with_corrupt_stored_session() {
        let backend = MemoryBackend::with_value(crate::store::SESSION_KEY, "garbage");
        let (manager, client) = manager_with(FakeAuthClient::new(), backend).await;

        assert_eq!(manager.try_refresh().await, RefreshState::RefreshFailed);
        assert!(client.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_runs_once() {
        let (manager, client) = manager(FakeAuthClient::new().with_refresh(Ok(SessionRecord::new("renewed")))).await;
        stored(&manager, SessionRecord::new("old").with_refresh_token("refresh")).await;

        assert_eq!(manager.try_refresh().await, RefreshState::RefreshSucceeded);
        assert_eq!(manager.try_refresh().await, RefreshState::RefreshSucceeded);
        assert_eq!(client.refresh_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_login_and_refresh_run_independently() {
        let (manager, client) = manager(
            FakeAuthClient::new()
                .with_login(Ok(SessionRecord::new("from-login")))
                .with_refresh(Ok(SessionRecord::new("from-refresh"))),
        )
        .await;
        stored(&manager, SessionRecord::new("old").with_refresh_token("refresh")).await;

        let (submitted, refreshed) = tokio::join!(manager.submit("bond", "007"), manager.try_refresh());
        assert!(submitted);
        assert_eq!(refreshed, RefreshState::RefreshSucceeded);
        assert_eq!(manager.login_state(), LoginState::Success);
        assert_eq!(client.login_calls().len(), 1);
        assert_eq!(client.refresh_calls().len(), 1);
    }

    // -------------------------------------------------------------------------
    // Identity projection
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_identity_projection() {
        let (manager, _) = manager(FakeAuthClient::new()).await;
        let mut identity = manager.watch_identity();
        assert_eq!(*identity.borrow(), Identity::default());

        stored(&manager, SessionRecord::new(token_for("John Doe", "editor"))).await;
        let john = Identity {
            name: "John Doe".to_string(),
            role: "editor".to_string(),
        };
        tokio::time::timeout(WAIT, identity.wait_for(|i| *i == john))
            .await
            .unwrap()
            .unwrap();

        // Undecodable token: projection holds its previous value
        stored(&manager, SessionRecord::new("xyz")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*identity.borrow(), john);

        // Still following the store afterwards
        stored(&manager, SessionRecord::new(token_for("Jane Roe", "admin"))).await;
        tokio::time::timeout(WAIT, identity.wait_for(|i| i.name == "Jane Roe"))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_identity_from_existing_session() {
        let (manager, _) = manager(FakeAuthClient::new()).await;
        stored(&manager, SessionRecord::new(token_for("James Bond", "marksman"))).await;

        let mut identity = manager.watch_identity();
        tokio::time::timeout(WAIT, identity.wait_for(|i| i.role == "marksman"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.borrow().name, "James Bond");
    }

    // -------------------------------------------------------------------------
    // Disposal
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_dispose_discards_in_flight_login() {
        let (manager, client) = manager(
            FakeAuthClient::new()
                .with_login(Ok(SessionRecord::new("late")))
                .hold(),
        )
        .await;
        let mut login = manager.watch_login();

        let pending = manager.spawn_submit("bond".to_string(), "007".to_string());
        tokio::time::timeout(WAIT, login.wait_for(LoginState::is_loading))
            .await
            .unwrap()
            .unwrap();

        manager.dispose();
        client.release();
        assert!(pending.await.unwrap());

        assert_eq!(manager.login_state(), LoginState::Submitting);
        assert_eq!(manager.store().get_latest(), None);
    }

    #[tokio::test]
    async fn test_login_completes_after_caller_gives_up() {
        let record = SessionRecord::new("a.b.c");
        let (manager, client) = manager(
            FakeAuthClient::new()
                .with_login(Ok(record.clone()))
                .hold(),
        )
        .await;
        let mut login = manager.watch_login();

        let abandoned = tokio::time::timeout(Duration::from_millis(50), manager.submit("bond", "007")).await;
        assert!(abandoned.is_err());
        assert_eq!(manager.login_state(), LoginState::Submitting);

        client.release();
        tokio::time::timeout(WAIT, login.wait_for(|s| !s.is_loading()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.login_state(), LoginState::Success);
        assert_eq!(manager.store().get_latest(), Some(record));

        client.release();
        assert!(manager.submit("bond", "007").await);
        assert_eq!(client.login_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_completes_after_caller_gives_up() {
        let renewed = SessionRecord::new("renewed");
        let (manager, client) = manager(
            FakeAuthClient::new()
                .with_refresh(Ok(renewed.clone()))
                .hold(),
        )
        .await;
        stored(&manager, SessionRecord::new("old").with_refresh_token("refresh")).await;
        let mut refresh = manager.watch_refresh();

        let abandoned = tokio::time::timeout(Duration::from_millis(50), manager.try_refresh()).await;
        assert!(abandoned.is_err());

        client.release();
        tokio::time::timeout(WAIT, refresh.wait_for(RefreshState::is_finished))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.refresh_state(), RefreshState::RefreshSucceeded);
        assert_eq!(manager.store().get_latest(), Some(renewed));
    }

    #[tokio::test]
    async fn test_dispose_discards_in_flight_refresh() {
        let original = SessionRecord::new("old").with_refresh_token("refresh");
        let (manager, client) = manager(
            FakeAuthClient::new()
                .with_refresh(Ok(SessionRecord::new("late")))
                .hold(),
        )
        .await;
        stored(&manager, original.clone()).await;

        let pending = manager.spawn_refresh();
        tokio::time::timeout(WAIT, async {
            while client.refresh_calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        manager.dispose();
        client.release();
        assert_eq!(pending.await.unwrap(), RefreshState::Pending);

        assert_eq!(manager.refresh_state(), RefreshState::Pending);
        assert_eq!(manager.store().get_latest(), Some(original));
    }

    #[tokio::test]
    async fn test_dispose_ignores_new_commands() {
        let (manager, client) = manager(FakeAuthClient::new().with_login(Ok(SessionRecord::new("a.b.c")))).await;
        stored(&manager, SessionRecord::new("old").with_refresh_token("refresh")).await;
        manager.dispose();

        assert!(!manager.submit("bond", "007").await);
        assert_eq!(manager.try_refresh().await, RefreshState::Pending);
        assert!(client.login_calls().is_empty());
        assert!(client.refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dispose_stops_identity_projection() {
        let (manager, _) = manager(FakeAuthClient::new()).await;
        let mut identity = manager.watch_identity();

        manager.dispose();
        let closed = tokio::time::timeout(WAIT, identity.changed()).await.unwrap();
        assert!(closed.is_err());
    }
}
