use super::*;

fn api(status: u16, code: Option<&str>, message: &str) -> BackendError {
    BackendError::Api { status, code: code.map(str::to_owned), message: message.to_owned() }
}

// =============================================================================
// classify
// =============================================================================

#[test]
fn classify_wrong_password() {
    let err = api(400, Some("invalid_credentials"), "Invalid login credentials");
    assert_eq!(classify(&err), AuthErrorKind::InvalidCredentials);
}

#[test]
fn classify_legacy_invalid_grant() {
    let err = api(400, Some("invalid_grant"), "Invalid login credentials");
    assert_eq!(classify(&err), AuthErrorKind::InvalidCredentials);
}

#[test]
fn classify_email_in_use() {
    let err = api(422, Some("user_already_exists"), "User already registered");
    assert_eq!(classify(&err), AuthErrorKind::EmailInUse);
}

#[test]
fn classify_invalid_email() {
    let err = api(400, Some("email_address_invalid"), "Unable to validate email address: invalid format");
    assert_eq!(classify(&err), AuthErrorKind::InvalidEmail);
}

#[test]
fn classify_rate_limited_by_status() {
    let err = api(429, None, "slow down");
    assert_eq!(classify(&err), AuthErrorKind::RateLimited);
}

#[test]
fn classify_rate_limited_by_message() {
    let err = api(400, None, "Email rate limit exceeded");
    assert_eq!(classify(&err), AuthErrorKind::RateLimited);
}

#[test]
fn classify_expired_jwt() {
    let err = api(401, Some("bad_jwt"), "JWT expired");
    assert_eq!(classify(&err), AuthErrorKind::SessionExpired);
}

#[test]
fn classify_missing_session() {
    assert_eq!(classify(&BackendError::NoSession), AuthErrorKind::SessionExpired);
}

#[test]
fn classify_network_failure() {
    let err = BackendError::Network("connection refused".into());
    assert_eq!(classify(&err), AuthErrorKind::NetworkError);
}

#[test]
fn classify_server_error_is_network() {
    let err = api(503, None, "upstream unavailable");
    assert_eq!(classify(&err), AuthErrorKind::NetworkError);
}

#[test]
fn classify_unrecognized_is_unknown() {
    let err = api(400, Some("weak_password"), "Password should be at least 6 characters");
    assert_eq!(classify(&err), AuthErrorKind::UnknownError);
}

// =============================================================================
// AuthError
// =============================================================================

#[test]
fn auth_error_from_backend_keeps_message() {
    let err: AuthError = api(400, Some("invalid_credentials"), "Invalid login credentials").into();
    assert_eq!(err.kind, AuthErrorKind::InvalidCredentials);
    assert!(err.message.contains("Invalid login credentials"));
    assert_eq!(err.error_code(), "invalid_credentials");
    assert!(!err.retryable());
}

#[test]
fn auth_error_notification_is_destructive() {
    let err = AuthError::new(AuthErrorKind::EmailInUse, "dup");
    let note = err.notification();
    assert_eq!(note.variant, crate::notify::Variant::Destructive);
    assert_eq!(note.title, "Email already registered");
}

#[test]
fn network_errors_are_retryable() {
    let err = AuthError::new(AuthErrorKind::NetworkError, "offline");
    assert!(err.retryable());
}

#[test]
fn kind_serializes_snake_case() {
    let json = serde_json::to_string(&AuthErrorKind::EmailInUse).unwrap();
    assert_eq!(json, "\"email_in_use\"");
}
