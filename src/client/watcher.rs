// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sends the user back to sign-in whenever authentication is lost.
//!
//! The watcher only reads [`ClientAuthState`]; navigation is deferred to the
//! end of the current render pass through [`FrameScheduler`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::auth_state::{AuthPhase, AuthSnapshot, ClientAuthState, SubscriptionId};
use super::routes::Route;

/// The UI's navigation stack.
pub trait Navigator: Send + Sync {
    fn current(&self) -> Route;

    /// Show `route` with an empty history, so back-navigation can't reveal
    /// earlier surfaces.
    fn reset_to(&self, route: Route);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// History stack kept in memory. The last entry is the current route.
pub struct InMemoryNavigator {
    history: Mutex<Vec<Route>>,
}

impl InMemoryNavigator {
    pub fn new(start: Route) -> Self {
        Self {
            history: Mutex::new(vec![start]),
        }
    }

    pub fn push(&self, route: Route) {
        lock(&self.history).push(route);
    }

    /// Go back one entry. `None` when there is nothing to go back to.
    pub fn back(&self) -> Option<Route> {
        let mut history = lock(&self.history);
        if history.len() < 2 {
            return None;
        }
        history.pop();
        history.last().copied()
    }

    pub fn history(&self) -> Vec<Route> {
        lock(&self.history).clone()
    }
}

impl Navigator for InMemoryNavigator {
    fn current(&self) -> Route {
        lock(&self.history).last().copied().unwrap_or(Route::Login)
    }

    fn reset_to(&self, route: Route) {
        let mut history = lock(&self.history);
        history.clear();
        history.push(route);
    }
}

type Task = Box<dyn FnOnce() + Send>;

/// Work deferred until the current render pass completes.
#[derive(Default)]
pub struct FrameScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) {
        lock(&self.queue).push_back(Box::new(task));
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Run everything queued before this call; tasks scheduled while running
    /// wait for the next pass. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<Task> = lock(&self.queue).drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

/// Root-level subscriber that redirects to [`Route::Login`] on auth loss.
pub struct GlobalAuthWatcher {
    state: Weak<ClientAuthState>,
    subscription: SubscriptionId,
}

impl GlobalAuthWatcher {
    pub fn attach(
        state: &Arc<ClientAuthState>,
        navigator: Arc<dyn Navigator>,
        scheduler: Arc<FrameScheduler>,
    ) -> Self {
        let pending = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(state);
        let subscription = state.subscribe(move |snapshot| {
            on_change(snapshot, &weak, &navigator, &scheduler, &pending);
        });
        Self {
            state: Arc::downgrade(state),
            subscription,
        }
    }
}

impl Drop for GlobalAuthWatcher {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.unsubscribe(self.subscription);
        }
    }
}

fn on_change(
    snapshot: &AuthSnapshot,
    state: &Weak<ClientAuthState>,
    navigator: &Arc<dyn Navigator>,
    scheduler: &Arc<FrameScheduler>,
    pending: &Arc<AtomicBool>,
) {
    if snapshot.phase != AuthPhase::Unauthenticated {
        return;
    }
    if navigator.current().is_auth_surface() {
        return;
    }
    // One redirect in flight at a time
    if pending.swap(true, Ordering::SeqCst) {
        return;
    }

    let (state, navigator, pending) = (state.clone(), Arc::clone(navigator), Arc::clone(pending));
    scheduler.schedule(move || {
        pending.store(false, Ordering::SeqCst);
        let still_signed_out = state
            .upgrade()
            .map_or(true, |s| s.snapshot().phase == AuthPhase::Unauthenticated);
        let from = navigator.current();
        if still_signed_out && !from.is_auth_surface() {
            tracing::info!(from = from.path(), "authentication lost; returning to sign-in");
            navigator.reset_to(Route::Login);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api::LoginCredentials;
    use crate::client::auth_state::test_support::FakeApi;
    use crate::client::auth_state::MemorySessionStore;

    struct Harness {
        state: Arc<ClientAuthState>,
        navigator: Arc<InMemoryNavigator>,
        scheduler: Arc<FrameScheduler>,
        _watcher: GlobalAuthWatcher,
    }

    async fn signed_in_at(routes: &[Route]) -> Harness {
        let state = Arc::new(ClientAuthState::new(
            Arc::new(FakeApi::default()),
            Arc::new(MemorySessionStore::default()),
        ));
        let navigator = Arc::new(InMemoryNavigator::new(Route::Login));
        let scheduler = Arc::new(FrameScheduler::new());
        let watcher = GlobalAuthWatcher::attach(&state, navigator.clone(), Arc::clone(&scheduler));

        state
            .login(LoginCredentials::Local {
                role: "technician".into(),
            })
            .await
            .unwrap();
        for route in routes {
            navigator.push(*route);
        }
        scheduler.run_pending();
        Harness {
            state,
            navigator,
            scheduler,
            _watcher: watcher,
        }
    }

    #[tokio::test]
    async fn forbidden_response_redirects_within_one_pass() {
        let h = signed_in_at(&[Route::Dashboard, Route::WorkOrders]).await;

        h.state.observe_response_status(403);
        assert_eq!(h.state.snapshot().phase, AuthPhase::Unauthenticated);
        // Deferred, not synchronous with the state change
        assert_eq!(h.navigator.current(), Route::WorkOrders);
        assert_eq!(h.scheduler.pending(), 1);

        assert_eq!(h.scheduler.run_pending(), 1);
        assert_eq!(h.navigator.current(), Route::Login);
        assert_eq!(h.navigator.history(), vec![Route::Login]);
        assert_eq!(h.navigator.back(), None);
    }

    #[tokio::test]
    async fn logout_redirects_once() {
        let h = signed_in_at(&[Route::Invoices]).await;
        h.state.logout().await;
        h.state.logout().await;
        h.state.observe_response_status(401);
        assert_eq!(h.scheduler.pending(), 1);
        h.scheduler.run_pending();
        assert_eq!(h.navigator.history(), vec![Route::Login]);
    }

    #[tokio::test]
    async fn no_redirect_from_sign_in_surfaces() {
        let h = signed_in_at(&[Route::OAuthCallback]).await;
        h.state.logout().await;
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.navigator.current(), Route::OAuthCallback);
    }

    #[tokio::test]
    async fn no_redirect_while_authenticating() {
        let h = signed_in_at(&[Route::Dashboard]).await;
        // Re-authenticating passes through Authenticating, then Authenticated
        h.state
            .login(LoginCredentials::Local {
                role: "manager".into(),
            })
            .await
            .unwrap();
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.navigator.current(), Route::Dashboard);
    }

    #[tokio::test]
    async fn sign_in_before_the_pass_cancels_redirect() {
        let h = signed_in_at(&[Route::Customers]).await;
        h.state.logout().await;
        h.state
            .login(LoginCredentials::Local {
                role: "technician".into(),
            })
            .await
            .unwrap();
        h.scheduler.run_pending();
        assert_eq!(h.navigator.current(), Route::Customers);
    }

    #[tokio::test]
    async fn dropped_watcher_stops_redirecting() {
        let h = signed_in_at(&[Route::Dashboard]).await;
        let Harness {
            state,
            navigator,
            scheduler,
            _watcher: watcher,
        } = h;
        drop(watcher);
        state.logout().await;
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(navigator.current(), Route::Dashboard);
    }

    #[test]
    fn scheduler_defers_nested_tasks() {
        let scheduler = Arc::new(FrameScheduler::new());
        let inner = Arc::clone(&scheduler);
        scheduler.schedule(move || inner.schedule(|| {}));
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(scheduler.run_pending(), 0);
    }
}
