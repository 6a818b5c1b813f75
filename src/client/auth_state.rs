// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Auth State
//!
//! The single source of truth for the client's authentication. All changes go
//! through [`ClientAuthState::login`], [`ClientAuthState::logout`],
//! [`ClientAuthState::refresh`], [`ClientAuthState::initialize`],
//! [`ClientAuthState::clear_error`] and
//! [`ClientAuthState::observe_response_status`]; subscribers are called
//! synchronously after every change.
//!
//! ## Ordering
//!
//! `login`, `refresh` and `initialize` run one at a time. `logout` and an
//! observed 401/403 apply immediately and bump a sequence number, so a
//! sign-in or refresh that was in flight is discarded when it resolves.
//!
//! Notifications are delivered one at a time and always carry the latest
//! committed snapshot, so the last thing a subscriber sees is the current
//! state even when mutations race on different threads. Subscribers run
//! while delivery is in progress and must not call the mutating operations
//! synchronously; defer them instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::OnceCell;

use super::api::{AuthApi, ClientError, LoginCredentials};
use crate::models::UserView;

/// Shown instead of the server's message when local sign-in is refused.
pub const SIGN_IN_UNAVAILABLE: &str = "Sign-in is not available. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPhase {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// What subscribers observe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    pub user: Option<UserView>,
    pub token: Option<String>,
    pub is_loading: bool,
    /// Set when an authenticated session is lost; cleared by the next sign-in.
    pub is_redirecting: bool,
    pub last_error: Option<String>,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.phase == AuthPhase::Authenticated && self.user.is_some() && self.token.is_some()
    }
}

/// Where the refresh credential survives client restarts.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, refresh_token: &str);
    fn clear(&self);
}

#[derive(Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn with_token(refresh_token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(refresh_token.into())),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    fn save(&self, refresh_token: &str) {
        *lock(&self.token) = Some(refresh_token.to_string());
    }

    fn clear(&self) {
        *lock(&self.token) = None;
    }
}

/// Handle returned by [`ClientAuthState::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&AuthSnapshot) + Send + Sync>;

#[derive(Default)]
struct Inner {
    snapshot: AuthSnapshot,
    refresh_token: Option<String>,
}

pub struct ClientAuthState {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn SessionStore>,
    inner: Mutex<Inner>,
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    /// Last snapshot handed to subscribers; held for the whole delivery.
    delivered: Mutex<AuthSnapshot>,
    next_subscriber: AtomicU64,
    sequence: AtomicU64,
    lane: tokio::sync::Mutex<()>,
    initialized: OnceCell<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ClientAuthState {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            api,
            store,
            inner: Mutex::new(Inner::default()),
            subscribers: RwLock::new(Vec::new()),
            delivered: Mutex::new(AuthSnapshot::default()),
            next_subscriber: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
            lane: tokio::sync::Mutex::new(()),
            initialized: OnceCell::new(),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        lock(&self.inner).snapshot.clone()
    }

    /// Call `f` after every state change.
    pub fn subscribe(&self, f: impl Fn(&AuthSnapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(f)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sid, _)| *sid != id.0);
    }

    /// Restore a persisted session once. Later and concurrent calls wait for
    /// the first and then do nothing.
    pub async fn initialize(&self) {
        self.initialized
            .get_or_init(|| async {
                let _lane = self.lane.lock().await;
                self.restore().await;
            })
            .await;
    }

    async fn restore(&self) {
        let Some(refresh_token) = self.store.load() else {
            return;
        };
        let seq = self.sequence.load(Ordering::SeqCst);

        let restored = match self.api.refresh(&refresh_token).await {
            Ok(pair) => match self.api.me(&pair.access_token).await {
                Ok(user) => Ok((pair, user)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match restored {
            Ok((pair, user)) => {
                let applied = self.apply_if_current(seq, |inner| {
                    inner.refresh_token = Some(pair.refresh_token.clone());
                    inner.snapshot = AuthSnapshot {
                        phase: AuthPhase::Authenticated,
                        user: Some(user.clone()),
                        token: Some(pair.access_token.clone()),
                        ..AuthSnapshot::default()
                    };
                });
                if applied {
                    self.store.save(&pair.refresh_token);
                    tracing::info!(user_id = user.id, "session restored");
                } else if let Err(e) = self.api.logout(&pair.refresh_token).await {
                    tracing::debug!(error = %e, "failed to revoke superseded session");
                }
            }
            Err(e) => {
                tracing::info!(error = %e, "stored session could not be restored");
                self.store.clear();
            }
        }
    }

    /// Sign in. On failure the state is `Unauthenticated` with `last_error`
    /// set.
    pub async fn login(&self, credentials: LoginCredentials) -> Result<(), ClientError> {
        let _lane = self.lane.lock().await;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.mutate(|inner| {
            inner.snapshot.phase = AuthPhase::Authenticating;
            inner.snapshot.is_loading = true;
            inner.snapshot.is_redirecting = false;
            inner.snapshot.last_error = None;
        });

        match self.api.sign_in(&credentials).await {
            Ok(signed_in) => {
                let applied = self.apply_if_current(seq, |inner| {
                    inner.refresh_token = Some(signed_in.refresh_token.clone());
                    inner.snapshot = AuthSnapshot {
                        phase: AuthPhase::Authenticated,
                        user: Some(signed_in.user.clone()),
                        token: Some(signed_in.access_token.clone()),
                        ..AuthSnapshot::default()
                    };
                });
                if !applied {
                    tracing::debug!("discarding superseded sign-in");
                    // Nobody holds this session any more.
                    if let Err(e) = self.api.logout(&signed_in.refresh_token).await {
                        tracing::debug!(error = %e, "failed to revoke superseded session");
                    }
                    return Err(ClientError::Superseded);
                }
                self.store.save(&signed_in.refresh_token);
                tracing::info!(user_id = signed_in.user.id, role = %signed_in.user.role, "signed in");
                Ok(())
            }
            Err(e) => {
                let (message, error) = if e.is_security_violation() {
                    tracing::warn!("local sign-in refused by server");
                    (SIGN_IN_UNAVAILABLE.to_string(), ClientError::SignInUnavailable)
                } else {
                    tracing::info!(error = %e, "sign-in failed");
                    (e.to_string(), e)
                };
                self.apply_if_current(seq, |inner| {
                    inner.refresh_token = None;
                    inner.snapshot = AuthSnapshot {
                        last_error: Some(message.clone()),
                        ..AuthSnapshot::default()
                    };
                });
                Err(error)
            }
        }
    }

    /// Sign out. Safe to call any number of times, from any state.
    pub async fn logout(&self) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        let refresh_token = self.sign_out_locally();
        self.store.clear();

        if let Some(refresh_token) = refresh_token {
            if let Err(e) = self.api.logout(&refresh_token).await {
                tracing::warn!(error = %e, "server-side sign-out failed");
            }
        }
    }

    /// Replace the access token. Any failure signs the client out.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let _lane = self.lane.lock().await;
        let seq = self.sequence.load(Ordering::SeqCst);
        let refresh_token = lock(&self.inner)
            .refresh_token
            .clone()
            .ok_or(ClientError::NotSignedIn)?;

        match self.api.refresh(&refresh_token).await {
            Ok(pair) => {
                let applied = self.apply_if_current(seq, |inner| {
                    inner.refresh_token = Some(pair.refresh_token.clone());
                    inner.snapshot.token = Some(pair.access_token.clone());
                });
                if !applied {
                    tracing::debug!("discarding superseded refresh");
                    // The server rotated to a credential nobody holds any more.
                    if let Err(e) = self.api.logout(&pair.refresh_token).await {
                        tracing::debug!(error = %e, "failed to revoke superseded session");
                    }
                    return Err(ClientError::Superseded);
                }
                self.store.save(&pair.refresh_token);
                tracing::debug!("access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::info!(error = %e, "refresh failed; signing out");
                if self.sequence.compare_exchange(seq, seq + 1, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                    self.sign_out_locally();
                    self.store.clear();
                }
                Err(e)
            }
        }
    }

    /// Report the status of any server response. A 401 or 403 while signed in
    /// signs the client out.
    pub fn observe_response_status(&self, status: u16) {
        if !matches!(status, 401 | 403) {
            return;
        }
        if !self.snapshot().is_authenticated() {
            return;
        }
        tracing::info!(status, "server rejected the session; signing out");
        self.sequence.fetch_add(1, Ordering::SeqCst);
        self.sign_out_locally();
        self.store.clear();
    }

    pub fn clear_error(&self) {
        self.mutate(|inner| inner.snapshot.last_error = None);
    }

    /// Move to `Unauthenticated` and hand back the refresh credential, if any.
    fn sign_out_locally(&self) -> Option<String> {
        let mut refresh_token = None;
        self.mutate(|inner| {
            refresh_token = inner.refresh_token.take();
            let was_authenticated = inner.snapshot.is_authenticated();
            inner.snapshot = AuthSnapshot {
                is_redirecting: inner.snapshot.is_redirecting || was_authenticated,
                ..AuthSnapshot::default()
            };
        });
        refresh_token
    }

    fn apply_if_current(&self, seq: u64, f: impl FnOnce(&mut Inner)) -> bool {
        let (applied, changed) = {
            let mut inner = lock(&self.inner);
            // Checked under the lock so a concurrent sign-out can't interleave
            if self.sequence.load(Ordering::SeqCst) != seq {
                (false, false)
            } else {
                let before = inner.snapshot.clone();
                f(&mut inner);
                (true, inner.snapshot != before)
            }
        };
        if changed {
            self.publish();
        }
        applied
    }

    fn mutate(&self, f: impl FnOnce(&mut Inner)) {
        let changed = {
            let mut inner = lock(&self.inner);
            let before = inner.snapshot.clone();
            f(&mut inner);
            inner.snapshot != before
        };
        if changed {
            self.publish();
        }
    }

    /// Deliver the current snapshot unless subscribers already have it.
    ///
    /// The snapshot is read after taking `delivered`, so a thread that lost
    /// the race to publish its own change delivers the newer state (or
    /// nothing) instead of replaying a stale one.
    fn publish(&self) {
        let mut delivered = lock(&self.delivered);
        let current = self.snapshot();
        if *delivered == current {
            return;
        }
        *delivered = current.clone();

        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for subscriber in subscribers {
            subscriber(&current);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tokio::sync::Notify;

    fn state_with(api: Arc<FakeApi>) -> (Arc<ClientAuthState>, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::default());
        let state = Arc::new(ClientAuthState::new(api, store.clone()));
        (state, store)
    }

    fn local(role: &str) -> LoginCredentials {
        LoginCredentials::Local {
            role: role.to_string(),
        }
    }

    fn assert_signed_out(snapshot: &AuthSnapshot) {
        assert_eq!(snapshot.phase, AuthPhase::Unauthenticated);
        assert!(!snapshot.is_authenticated());
        assert!(snapshot.user.is_none());
        assert!(snapshot.token.is_none());
        assert!(snapshot.last_error.is_none());
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn starts_unauthenticated() {
        let (state, _) = state_with(Arc::new(FakeApi::default()));
        assert_eq!(state.snapshot(), AuthSnapshot::default());
    }

    #[tokio::test]
    async fn login_authenticates_and_persists() {
        let (state, store) = state_with(Arc::new(FakeApi::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        state.subscribe(move |s| lock(&sink).push(s.phase));

        state.login(local("admin")).await.unwrap();

        let snapshot = state.snapshot();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.user.unwrap().role, "admin");
        assert_eq!(snapshot.token.as_deref(), Some("access-1"));
        assert_eq!(store.load().as_deref(), Some("refresh-1"));
        assert_eq!(
            *lock(&seen),
            vec![AuthPhase::Authenticating, AuthPhase::Authenticated]
        );
    }

    #[tokio::test]
    async fn failed_login_keeps_error() {
        let api = Arc::new(FakeApi::default());
        *lock(&api.sign_in_error) = Some(rejected(401, "provider_exchange_failed"));
        let (state, _) = state_with(api);

        assert!(state.login(local("admin")).await.is_err());
        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, AuthPhase::Unauthenticated);
        assert!(snapshot.user.is_none() && snapshot.token.is_none());
        assert_eq!(snapshot.last_error.as_deref(), Some("rejected"));

        state.clear_error();
        assert!(state.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn security_violation_becomes_generic_message() {
        let api = Arc::new(FakeApi::default());
        *lock(&api.sign_in_error) = Some(rejected(403, "security_violation"));
        let (state, _) = state_with(api);

        assert_eq!(
            state.login(local("admin")).await.unwrap_err(),
            ClientError::SignInUnavailable
        );
        assert_eq!(state.snapshot().last_error.as_deref(), Some(SIGN_IN_UNAVAILABLE));
    }

    #[tokio::test]
    async fn concurrent_logouts_converge() {
        for n in [1usize, 50, 100] {
            let api = Arc::new(FakeApi::default());
            let (state, store) = state_with(Arc::clone(&api));
            state.login(local("manager")).await.unwrap();

            let flickered = Arc::new(std::sync::atomic::AtomicBool::new(false));
            let signed_out = Arc::new(std::sync::atomic::AtomicBool::new(false));
            {
                let (flickered, signed_out) = (Arc::clone(&flickered), Arc::clone(&signed_out));
                state.subscribe(move |s| {
                    if s.is_authenticated() && signed_out.load(Ordering::SeqCst) {
                        flickered.store(true, Ordering::SeqCst);
                    }
                    if !s.is_authenticated() {
                        signed_out.store(true, Ordering::SeqCst);
                    }
                });
            }

            let tasks: Vec<_> = (0..n)
                .map(|_| {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move { state.logout().await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            assert_signed_out(&state.snapshot());
            assert!(!flickered.load(Ordering::SeqCst), "n = {n}");
            assert_eq!(api.logouts.load(Ordering::SeqCst), 1, "n = {n}");
            assert!(store.load().is_none());
        }
    }

    #[tokio::test]
    async fn logout_when_signed_out_is_a_no_op() {
        let api = Arc::new(FakeApi::default());
        let (state, _) = state_with(Arc::clone(&api));
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        state.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        state.logout().await;
        state.logout().await;
        assert_signed_out(&state.snapshot());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logout_during_sign_in_discards_late_success() {
        let hold = Arc::new(Notify::new());
        let api = Arc::new(FakeApi {
            hold_sign_in: Some(Arc::clone(&hold)),
            ..FakeApi::default()
        });
        let (state, store) = state_with(Arc::clone(&api));

        let login = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.login(local("admin")).await })
        };
        api.sign_in_started.notified().await;
        assert_eq!(state.snapshot().phase, AuthPhase::Authenticating);

        state.logout().await;
        assert_signed_out(&state.snapshot());

        hold.notify_one();
        assert_eq!(login.await.unwrap(), Err(ClientError::Superseded));
        assert_signed_out(&state.snapshot());
        assert!(store.load().is_none());
        // The orphaned server session was revoked
        assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn logout_during_refresh_revokes_the_rotated_credential() {
        let hold = Arc::new(Notify::new());
        let api = Arc::new(FakeApi {
            hold_refresh: Some(Arc::clone(&hold)),
            ..FakeApi::default()
        });
        let (state, store) = state_with(Arc::clone(&api));
        state.login(local("dispatcher")).await.unwrap();

        let refresh = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.refresh().await })
        };
        api.refresh_started.notified().await;
        state.logout().await;

        hold.notify_one();
        assert_eq!(refresh.await.unwrap(), Err(ClientError::Superseded));
        assert_signed_out(&state.snapshot());
        assert!(store.load().is_none());
        // Both the credential held at logout and its rotated successor
        assert_eq!(
            *lock(&api.revoked),
            vec!["refresh-1".to_string(), "refresh-1-r1".to_string()]
        );
    }

    #[tokio::test]
    async fn logout_during_initialize_revokes_the_restored_session() {
        let hold = Arc::new(Notify::new());
        let api = Arc::new(FakeApi {
            hold_refresh: Some(Arc::clone(&hold)),
            ..FakeApi::default()
        });
        let store = Arc::new(MemorySessionStore::with_token("persisted"));
        let state = Arc::new(ClientAuthState::new(api.clone(), store.clone()));

        let init = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.initialize().await })
        };
        api.refresh_started.notified().await;
        state.logout().await;
        hold.notify_one();
        init.await.unwrap();

        assert_eq!(state.snapshot(), AuthSnapshot::default());
        assert!(store.load().is_none());
        assert_eq!(*lock(&api.revoked), vec!["persisted-r1".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn subscribers_always_end_on_the_current_state() {
        for round in 0..200 {
            let (state, _) = state_with(Arc::new(FakeApi::default()));
            let last_seen = Arc::new(Mutex::new(AuthSnapshot::default()));
            let sink = Arc::clone(&last_seen);
            state.subscribe(move |s| *lock(&sink) = s.clone());

            let login = {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let _ = state.login(local("admin")).await;
                })
            };
            let logouts: Vec<_> = (0..4)
                .map(|_| {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move { state.logout().await })
                })
                .collect();
            login.await.unwrap();
            for logout in logouts {
                logout.await.unwrap();
            }

            assert_eq!(*lock(&last_seen), state.snapshot(), "round {round}");
        }
    }

    #[tokio::test]
    async fn refresh_rotates_token() {
        let (state, store) = state_with(Arc::new(FakeApi::default()));
        state.login(local("viewer")).await.unwrap();

        state.refresh().await.unwrap();
        let snapshot = state.snapshot();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.token.as_deref(), Some("access-r1"));
        assert_eq!(store.load().as_deref(), Some("refresh-1-r1"));
    }

    #[tokio::test]
    async fn failed_refresh_signs_out() {
        let api = Arc::new(FakeApi::default());
        let (state, store) = state_with(Arc::clone(&api));
        state.login(local("viewer")).await.unwrap();
        *lock(&api.refresh_error) = Some(rejected(401, "refresh_invalid"));

        assert!(state.refresh().await.is_err());
        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, AuthPhase::Unauthenticated);
        assert!(snapshot.is_redirecting);
        assert!(store.load().is_none());

        assert_eq!(state.refresh().await, Err(ClientError::NotSignedIn));
    }

    #[tokio::test]
    async fn rejected_response_signs_out() {
        let (state, _) = state_with(Arc::new(FakeApi::default()));
        state.login(local("technician")).await.unwrap();

        state.observe_response_status(200);
        state.observe_response_status(404);
        assert!(state.snapshot().is_authenticated());

        state.observe_response_status(403);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.phase, AuthPhase::Unauthenticated);
        assert!(snapshot.is_redirecting);

        // A new sign-in clears the redirect marker
        state.login(local("technician")).await.unwrap();
        assert!(!state.snapshot().is_redirecting);
    }

    #[tokio::test]
    async fn initialize_restores_once() {
        let api = Arc::new(FakeApi::default());
        let store = Arc::new(MemorySessionStore::with_token("persisted"));
        let state = Arc::new(ClientAuthState::new(api.clone(), store.clone()));

        tokio::join!(state.initialize(), state.initialize());
        state.initialize().await;

        assert_eq!(api.refreshes.load(Ordering::SeqCst), 1);
        let snapshot = state.snapshot();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.user.unwrap().role, "dispatcher");
        assert_eq!(store.load().as_deref(), Some("persisted-r1"));
    }

    #[tokio::test]
    async fn initialize_drops_unusable_session() {
        let api = Arc::new(FakeApi::default());
        *lock(&api.refresh_error) = Some(rejected(401, "refresh_invalid"));
        let store = Arc::new(MemorySessionStore::with_token("stale"));
        let state = ClientAuthState::new(api, store.clone());

        state.initialize().await;
        assert_eq!(state.snapshot(), AuthSnapshot::default());
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn unsubscribed_listener_is_not_called() {
        let (state, _) = state_with(Arc::new(FakeApi::default()));
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let id = state.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        state.unsubscribe(id);
        state.login(local("viewer")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
