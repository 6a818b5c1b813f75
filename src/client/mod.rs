// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Auth
//!
//! The client half of authentication, shared with the server through
//! `crate::models`.
//!
//! - [`ClientAuthState`]: reactive state machine
//!   (`Unauthenticated -> Authenticating -> Authenticated -> Unauthenticated`)
//! - [`GlobalAuthWatcher`]: redirects to sign-in when authentication is lost
//! - [`RouteGate`]: checked before showing any surface, including deep links
//! - [`AuthorizedClient`]: attaches the bearer token and reports rejections
//!   back to the state
//!
//! ```rust,ignore
//! let api = HttpAuthApi::new("https://workorders.example.com", Duration::from_secs(10))?;
//! let state = Arc::new(ClientAuthState::new(Arc::new(api.clone()), store));
//! let _watcher = GlobalAuthWatcher::attach(&state, navigator, scheduler);
//! state.initialize().await;
//! ```

pub mod api;
pub mod auth_state;
pub mod pkce;
pub mod routes;
pub mod watcher;

pub use api::{AuthApi, AuthorizedClient, ClientError, HttpAuthApi, LoginCredentials, SignedIn};
pub use auth_state::{
    AuthPhase, AuthSnapshot, ClientAuthState, MemorySessionStore, SessionStore, SubscriptionId,
};
pub use pkce::PkcePair;
pub use routes::{Route, RouteDecision, RouteGate};
pub use watcher::{FrameScheduler, GlobalAuthWatcher, InMemoryNavigator, Navigator};
