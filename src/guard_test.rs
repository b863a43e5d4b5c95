use super::*;
use crate::backend::{Session, User};

fn session() -> Session {
    Session {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        expires_at: crate::backend::types::now_secs() + 3600,
        token_type: "bearer".into(),
        user: User { id: uuid::Uuid::new_v4(), email: "a@b.com".into() },
    }
}

fn settled(authenticated: bool) -> AuthState {
    AuthState {
        session: authenticated.then(session),
        status: if authenticated { AuthStatus::Authenticated } else { AuthStatus::Anonymous },
        is_initialized: true,
        ..AuthState::default()
    }
}

// =============================================================================
// Route
// =============================================================================

#[test]
fn parse_known_routes() {
    assert_eq!(Route::parse("/"), Route::Home);
    assert_eq!(Route::parse(""), Route::Home);
    assert_eq!(Route::parse("/login"), Route::Login);
    assert_eq!(Route::parse("/dashboard/"), Route::Dashboard);
    assert_eq!(Route::parse("/members?page=2"), Route::Members);
    assert_eq!(Route::parse("/members/42"), Route::Member("42".into()));
    assert_eq!(Route::parse("/scan"), Route::Scan);
}

#[test]
fn parse_unknown_route() {
    assert_eq!(Route::parse("/nope/deeper"), Route::NotFound("/nope/deeper".into()));
    assert!(!Route::parse("/nope").is_protected());
}

#[test]
fn path_matches_parse() {
    for path in ["/", "/login", "/signup", "/dashboard", "/members", "/members/7", "/scan", "/account"] {
        assert_eq!(Route::parse(path).path(), path);
    }
}

#[test]
fn protected_routes() {
    assert!(Route::Dashboard.is_protected());
    assert!(Route::Member("1".into()).is_protected());
    assert!(!Route::Login.is_protected());
    assert!(!Route::Home.is_protected());
}

// =============================================================================
// evaluate
// =============================================================================

#[test]
fn unprotected_route_always_renders() {
    assert_eq!(evaluate(&AuthState::default(), &Route::Login), GuardDecision::Render);
}

#[test]
fn uninitialized_state_never_redirects() {
    let state = AuthState { is_loading: true, ..AuthState::default() };
    assert_eq!(evaluate(&state, &Route::Dashboard), GuardDecision::Loading);

    let state = AuthState { is_loading: false, is_initialized: false, ..AuthState::default() };
    assert_eq!(evaluate(&state, &Route::Dashboard), GuardDecision::Loading);
}

#[test]
fn loading_after_initialization_waits() {
    let state = AuthState { is_loading: true, ..settled(false) };
    assert_eq!(evaluate(&state, &Route::Members), GuardDecision::Loading);
}

#[test]
fn settled_anonymous_redirects_to_login() {
    assert_eq!(
        evaluate(&settled(false), &Route::Scan),
        GuardDecision::Redirect { to: Route::Login, return_to: Route::Scan }
    );
}

#[test]
fn settled_authenticated_renders() {
    assert_eq!(evaluate(&settled(true), &Route::Account), GuardDecision::Render);
}

#[test]
fn status_without_session_is_not_enough() {
    let state = AuthState { session: None, ..settled(true) };
    assert!(matches!(evaluate(&state, &Route::Dashboard), GuardDecision::Redirect { .. }));
}

// =============================================================================
// enforce
// =============================================================================

#[test]
fn enforce_redirect_remembers_destination() {
    let nav = HistoryNavigator::new(Route::Members);
    let decision = enforce(&settled(false), &nav);
    assert!(matches!(decision, GuardDecision::Redirect { .. }));
    assert_eq!(nav.current(), Route::Login);
    assert_eq!(nav.history(), vec![Route::Login]);
    assert_eq!(nav.take_return_to(), Some(Route::Members));
    assert_eq!(nav.take_return_to(), None);
}

#[test]
fn enforce_loading_does_not_navigate() {
    let nav = HistoryNavigator::new(Route::Dashboard);
    assert_eq!(enforce(&AuthState::default(), &nav), GuardDecision::Loading);
    assert_eq!(nav.current(), Route::Dashboard);
    assert!(nav.history().is_empty());
}
