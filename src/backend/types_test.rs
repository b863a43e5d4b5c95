use super::*;

fn session(expires_at: i64) -> Session {
    Session {
        access_token: "a".into(),
        refresh_token: "r".into(),
        expires_at,
        token_type: "bearer".into(),
        user: User { id: Uuid::nil(), email: "a@b.com".into() },
    }
}

#[test]
fn session_expiry_checks() {
    let s = session(1_000);
    assert!(!s.is_expired_at(999));
    assert!(s.is_expired_at(1_000));
    assert!(s.expires_within(950, 60));
    assert!(!s.expires_within(900, 60));
}

#[test]
fn session_deserializes_without_token_type() {
    let json = serde_json::json!({
        "access_token": "a",
        "refresh_token": "r",
        "expires_at": 42,
        "user": { "id": Uuid::nil(), "email": "a@b.com" }
    });
    let s: Session = serde_json::from_value(json).unwrap();
    assert_eq!(s.token_type, "bearer");
    assert_eq!(s.user.email, "a@b.com");
}

#[test]
fn permission_denied_detection() {
    let rls = BackendError::Api {
        status: 403,
        code: Some("42501".into()),
        message: "permission denied for table gyms".into(),
    };
    assert!(rls.is_permission_denied());

    let jwt = BackendError::Api { status: 400, code: Some("PGRST301".into()), message: "JWT expired".into() };
    assert!(jwt.is_permission_denied());

    let conflict = BackendError::Api { status: 409, code: Some("23505".into()), message: "duplicate key".into() };
    assert!(!conflict.is_permission_denied());

    assert!(!BackendError::Network("down".into()).is_permission_denied());
    assert!(BackendError::NoSession.is_permission_denied());
}

#[test]
fn retryable_statuses() {
    let busy = BackendError::Api { status: 503, code: None, message: String::new() };
    let bad = BackendError::Api { status: 400, code: None, message: String::new() };
    assert!(busy.retryable());
    assert!(!bad.retryable());
    assert_eq!(bad.error_code(), "E_API_RESPONSE");
}

#[test]
fn auth_change_event_wire_names() {
    let json = serde_json::to_string(&AuthChangeEvent::TokenRefreshed).unwrap();
    assert_eq!(json, "\"TOKEN_REFRESHED\"");
}

#[test]
fn clock_is_positive() {
    assert!(now_secs() > 0);
    assert!(now_ms() / 1000 >= now_secs() - 1);
}
