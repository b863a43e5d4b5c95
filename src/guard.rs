//! Route surface, route guard, and navigation.
//!
//! SYSTEM CONTEXT
//! ==============
//! Protected views consult `evaluate` before rendering. The guard never
//! redirects before the session store has initialized, so a user whose
//! valid session is still being restored is shown a loading state instead
//! of being bounced to `/login`.

use std::sync::Mutex;

use crate::services::session::{AuthState, AuthStatus};

// =============================================================================
// ROUTES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Signup,
    Dashboard,
    Members,
    Member(String),
    Scan,
    Account,
    NotFound(String),
}

impl Route {
    /// Parse a path (query string and trailing slash ignored).
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Self::Home,
            ["login"] => Self::Login,
            ["signup"] => Self::Signup,
            ["dashboard"] => Self::Dashboard,
            ["members"] => Self::Members,
            ["members", id] => Self::Member((*id).to_owned()),
            ["scan"] => Self::Scan,
            ["account"] => Self::Account,
            _ => Self::NotFound(path.to_owned()),
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_owned(),
            Self::Login => "/login".to_owned(),
            Self::Signup => "/signup".to_owned(),
            Self::Dashboard => "/dashboard".to_owned(),
            Self::Members => "/members".to_owned(),
            Self::Member(id) => format!("/members/{id}"),
            Self::Scan => "/scan".to_owned(),
            Self::Account => "/account".to_owned(),
            Self::NotFound(path) => path.clone(),
        }
    }

    /// Routes that require an authenticated session.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Dashboard | Self::Members | Self::Member(_) | Self::Scan | Self::Account)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the requested view.
    Render,
    /// Auth state is not settled yet; show a loading indicator.
    Loading,
    /// Send the user to `to`, remembering where they were headed.
    Redirect { to: Route, return_to: Route },
}

/// Decide what a route should show for the given auth state.
#[must_use]
pub fn evaluate(state: &AuthState, route: &Route) -> GuardDecision {
    if !route.is_protected() {
        return GuardDecision::Render;
    }
    if !state.is_initialized || state.is_loading {
        return GuardDecision::Loading;
    }
    if state.status == AuthStatus::Authenticated && state.session.is_some() {
        GuardDecision::Render
    } else {
        GuardDecision::Redirect { to: Route::Login, return_to: route.clone() }
    }
}

/// Evaluate the navigator's current route and follow any redirect.
pub fn enforce(state: &AuthState, navigator: &dyn Navigator) -> GuardDecision {
    let decision = evaluate(state, &navigator.current());
    if let GuardDecision::Redirect { to, return_to } = &decision {
        tracing::info!(from = %return_to, to = %to, "route guard redirect");
        navigator.remember_return_to(return_to.clone());
        navigator.navigate(to.clone());
    }
    decision
}

// =============================================================================
// NAVIGATION
// =============================================================================

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
    fn current(&self) -> Route;
    /// Record the protected route a redirected user was trying to reach.
    fn remember_return_to(&self, route: Route);
    /// Take the recorded return-to route, if any.
    fn take_return_to(&self) -> Option<Route>;
}

struct NavState {
    current: Route,
    history: Vec<Route>,
    return_to: Option<Route>,
}

/// In-process navigator that records every transition.
pub struct HistoryNavigator {
    inner: Mutex<NavState>,
}

impl HistoryNavigator {
    #[must_use]
    pub fn new(start: Route) -> Self {
        Self { inner: Mutex::new(NavState { current: start, history: Vec::new(), return_to: None }) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavState> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Routes navigated to, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Route> {
        self.lock().history.clone()
    }
}

impl Default for HistoryNavigator {
    fn default() -> Self {
        Self::new(Route::Home)
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, route: Route) {
        let mut nav = self.lock();
        nav.history.push(route.clone());
        nav.current = route;
    }

    fn current(&self) -> Route {
        self.lock().current.clone()
    }

    fn remember_return_to(&self, route: Route) {
        self.lock().return_to = Some(route);
    }

    fn take_return_to(&self) -> Option<Route> {
        self.lock().return_to.take()
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
