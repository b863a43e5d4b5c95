//! Drives `HostedBackend` and the hosted repositories over real HTTP against
//! an in-process router that imitates the auth and table endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use gymdesk::backend::rest::RestClient;
use gymdesk::backend::{AuthBackend, AuthChangeEvent, BackendError, HostedBackend, Session};
use gymdesk::config::{BackendConfig, Timings};
use gymdesk::error::{AuthErrorKind, classify};
use gymdesk::guard::{HistoryNavigator, Navigator, Route};
use gymdesk::gyms::{GymRepository, GymUpdate, HostedGymRepository, NewGym};
use gymdesk::members::{HostedMemberRepository, MemberRepository};
use gymdesk::state::AppState;
use gymdesk::storage::{LocalStore, MemoryStore, get_json, set_json};
use serde_json::{Value, json};
use uuid::Uuid;

// =============================================================================
// MOCK BACKEND
// =============================================================================

#[derive(Default)]
struct Mock {
    /// email -> (user id, password)
    users: HashMap<String, (Uuid, String)>,
    access: HashMap<String, Uuid>,
    refresh: HashMap<String, Uuid>,
    gyms: Vec<Value>,
    members: Vec<Value>,
    logouts: usize,
    recover_requests: Vec<(String, Option<String>)>,
}

type Shared = Arc<Mutex<Mock>>;

fn lock(mock: &Shared) -> std::sync::MutexGuard<'_, Mock> {
    mock.lock().unwrap()
}

fn email_of(mock: &Mock, id: Uuid) -> String {
    mock.users
        .iter()
        .find(|(_, (uid, _))| *uid == id)
        .map(|(email, _)| email.clone())
        .unwrap_or_default()
}

fn issue(mock: &mut Mock, id: Uuid) -> Value {
    let access = Uuid::new_v4().to_string();
    let refresh = Uuid::new_v4().to_string();
    mock.access.insert(access.clone(), id);
    mock.refresh.insert(refresh.clone(), id);
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 3600,
        "user": { "id": id, "email": email_of(mock, id), "aud": "authenticated" },
    })
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

fn filter<'a>(query: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    query.get(column)?.strip_prefix("eq.")
}

async fn signup(State(mock): State<Shared>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default().to_owned();
    let mut mock = lock(&mock);
    if mock.users.contains_key(&email) {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "code": 422, "error_code": "user_already_exists", "msg": "User already registered" }),
        );
    }
    let id = Uuid::new_v4();
    mock.users.insert(email, (id, password));
    Json(issue(&mut mock, id)).into_response()
}

async fn token(
    State(mock): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut mock = lock(&mock);
    match query.get("grant_type").map(String::as_str) {
        Some("password") => {
            let email = body["email"].as_str().unwrap_or_default();
            let password = body["password"].as_str().unwrap_or_default();
            match mock.users.get(email) {
                Some((id, stored)) if stored == password => {
                    let id = *id;
                    Json(issue(&mut mock, id)).into_response()
                }
                _ => error(
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" }),
                ),
            }
        }
        Some("refresh_token") => {
            let presented = body["refresh_token"].as_str().unwrap_or_default();
            match mock.refresh.remove(presented) {
                Some(id) => Json(issue(&mut mock, id)).into_response(),
                None => error(
                    StatusCode::BAD_REQUEST,
                    json!({ "code": 400, "error_code": "refresh_token_not_found", "msg": "Invalid Refresh Token: Refresh Token Not Found" }),
                ),
            }
        }
        _ => error(StatusCode::BAD_REQUEST, json!({ "msg": "unsupported grant_type" })),
    }
}

async fn logout(State(mock): State<Shared>, headers: HeaderMap) -> StatusCode {
    let mut mock = lock(&mock);
    if let Some(token) = bearer(&headers) {
        mock.access.remove(&token);
    }
    mock.logouts += 1;
    StatusCode::NO_CONTENT
}

async fn recover(
    State(mock): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    lock(&mock)
        .recover_requests
        .push((email, query.get("redirect_to").cloned()));
    Json(json!({}))
}

async fn user(State(mock): State<Shared>, headers: HeaderMap) -> Response {
    let mock = lock(&mock);
    match bearer(&headers).and_then(|t| mock.access.get(&t).copied()) {
        Some(id) => Json(json!({ "id": id, "email": email_of(&mock, id) })).into_response(),
        None => error(
            StatusCode::FORBIDDEN,
            json!({ "code": 403, "error_code": "bad_jwt", "msg": "invalid JWT: unable to parse or verify signature" }),
        ),
    }
}

async fn select_gyms(State(mock): State<Shared>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let mock = lock(&mock);
    let rows: Vec<Value> = mock
        .gyms
        .iter()
        .filter(|g| filter(&query, "email").is_none_or(|e| g["email"] == e))
        .filter(|g| filter(&query, "owner_id").is_none_or(|o| g["owner_id"] == o))
        .cloned()
        .collect();
    Json(Value::Array(rows))
}

async fn insert_gym(State(mock): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    assert_eq!(headers.get("prefer").and_then(|v| v.to_str().ok()), Some("return=representation"));
    let mut mock = lock(&mock);
    if mock.gyms.iter().any(|g| g["email"] == body["email"]) {
        return error(
            StatusCode::CONFLICT,
            json!({ "code": "23505", "message": "duplicate key value violates unique constraint \"gyms_email_key\"" }),
        );
    }
    let row = json!({
        "id": Uuid::new_v4(),
        "name": body["name"],
        "email": body["email"],
        "phone": null,
        "company_name": null,
        "address": null,
        "owner_id": body.get("owner_id").cloned().unwrap_or(Value::Null),
    });
    mock.gyms.push(row.clone());
    (StatusCode::CREATED, Json(json!([row]))).into_response()
}

async fn update_gym(
    State(mock): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut mock = lock(&mock);
    let id = filter(&query, "id").unwrap_or_default().to_owned();
    let mut updated = Vec::new();
    for gym in mock.gyms.iter_mut().filter(|g| g["id"] == id.as_str()) {
        if let (Some(row), Some(changes)) = (gym.as_object_mut(), body.as_object()) {
            for (k, v) in changes {
                row.insert(k.clone(), v.clone());
            }
        }
        updated.push(gym.clone());
    }
    Json(Value::Array(updated))
}

async fn select_members(
    State(mock): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mock = lock(&mock);
    if bearer(&headers).and_then(|t| mock.access.get(&t).copied()).is_none() {
        return error(
            StatusCode::UNAUTHORIZED,
            json!({ "code": "42501", "message": "permission denied for table members" }),
        );
    }
    let gym_id = filter(&query, "gym_id").unwrap_or_default();
    let rows: Vec<Value> = mock
        .members
        .iter()
        .filter(|m| m["gym_id"] == gym_id)
        .cloned()
        .collect();
    Json(Value::Array(rows)).into_response()
}

async fn spawn_mock() -> (SocketAddr, Shared) {
    let mock = Shared::default();
    let app = Router::new()
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/recover", post(recover))
        .route("/auth/v1/user", get(user))
        .route("/rest/v1/gyms", get(select_gyms).post(insert_gym).patch(update_gym))
        .route("/rest/v1/members", get(select_members))
        .with_state(Arc::clone(&mock));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    (addr, mock)
}

fn config(addr: SocketAddr) -> BackendConfig {
    BackendConfig::new(&format!("http://{addr}"), "anon-key")
}

fn backend(addr: SocketAddr, storage: &Arc<MemoryStore>) -> Arc<HostedBackend> {
    Arc::new(HostedBackend::new(&config(addr), Arc::clone(storage) as Arc<dyn LocalStore>).unwrap())
}

// =============================================================================
// AUTH
// =============================================================================

#[tokio::test]
async fn sign_up_persists_session_across_clients() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let first = backend(addr, &storage);
    let mut events = first.subscribe();

    let resp = first
        .sign_up("a@b.com", "secret1", json!({ "gym_name": "Apex" }))
        .await
        .unwrap();
    let session = resp.session.unwrap();
    assert_eq!(session.user.email, "a@b.com");
    assert_eq!(events.recv().await.unwrap().kind, AuthChangeEvent::SignedIn);

    let key = first.storage_key();
    assert!(key.starts_with("sb-") && key.ends_with("-auth-token"));
    let persisted: Option<Session> = get_json(storage.as_ref(), &key).unwrap();
    assert_eq!(persisted.as_ref(), Some(&session));

    let second = backend(addr, &storage);
    assert_eq!(second.get_session().await.unwrap(), Some(session));
}

#[tokio::test]
async fn wrong_password_classifies_as_invalid_credentials() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let client = backend(addr, &storage);
    client.sign_up("a@b.com", "secret1", json!({})).await.unwrap();
    client.sign_out().await.unwrap();

    let err = client
        .sign_in_with_password("a@b.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Api { status: 400, .. }));
    assert_eq!(classify(&err), AuthErrorKind::InvalidCredentials);
    assert_eq!(client.get_session().await.unwrap(), None);
}

#[tokio::test]
async fn duplicate_sign_up_classifies_as_email_in_use() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let client = backend(addr, &storage);
    client.sign_up("a@b.com", "secret1", json!({})).await.unwrap();

    let err = client.sign_up("a@b.com", "secret1", json!({})).await.unwrap_err();
    assert_eq!(classify(&err), AuthErrorKind::EmailInUse);
}

#[tokio::test]
async fn refresh_rotates_tokens() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let client = backend(addr, &storage);
    let original = client
        .sign_up("a@b.com", "secret1", json!({}))
        .await
        .unwrap()
        .session
        .unwrap();
    let mut events = client.subscribe();

    let refreshed = client.refresh_session().await.unwrap();
    assert_ne!(refreshed.access_token, original.access_token);
    assert_eq!(events.recv().await.unwrap().kind, AuthChangeEvent::TokenRefreshed);
    assert!(client.get_user(&refreshed.access_token).await.is_ok());

    let persisted: Option<Session> = get_json(storage.as_ref(), &client.storage_key()).unwrap();
    assert_eq!(persisted, Some(refreshed));
}

#[tokio::test]
async fn expiring_stored_session_is_refreshed_on_read() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let writer = backend(addr, &storage);
    let mut session = writer
        .sign_up("a@b.com", "secret1", json!({}))
        .await
        .unwrap()
        .session
        .unwrap();
    session.expires_at = 0;
    set_json(storage.as_ref(), &writer.storage_key(), &session).unwrap();

    let reader = backend(addr, &storage);
    let restored = reader.get_session().await.unwrap().unwrap();
    assert_ne!(restored.access_token, session.access_token);
    assert!(restored.expires_at > 0);
}

#[tokio::test]
async fn unknown_refresh_token_drops_stored_session() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let client = backend(addr, &storage);
    let mut session = client
        .sign_up("a@b.com", "secret1", json!({}))
        .await
        .unwrap()
        .session
        .unwrap();
    session.expires_at = 0;
    session.refresh_token = "bogus".into();
    set_json(storage.as_ref(), &client.storage_key(), &session).unwrap();

    let reader = backend(addr, &storage);
    let err = reader.get_session().await.unwrap_err();
    assert_eq!(classify(&err), AuthErrorKind::SessionExpired);
    assert_eq!(storage.get(&reader.storage_key()).unwrap(), None);
}

#[tokio::test]
async fn get_user_rejects_unknown_token() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let err = backend(addr, &storage).get_user("nope").await.unwrap_err();
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn sign_out_clears_storage_and_revokes() {
    let (addr, mock) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let client = backend(addr, &storage);
    let session = client
        .sign_up("a@b.com", "secret1", json!({}))
        .await
        .unwrap()
        .session
        .unwrap();

    client.sign_out().await.unwrap();
    assert_eq!(storage.get(&client.storage_key()).unwrap(), None);
    assert_eq!(lock(&mock).logouts, 1);
    assert!(client.get_user(&session.access_token).await.is_err());
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let storage = Arc::new(MemoryStore::new());

    let err = backend(addr, &storage)
        .sign_in_with_password("a@b.com", "secret1")
        .await
        .unwrap_err();
    assert_eq!(classify(&err), AuthErrorKind::NetworkError);
}

// =============================================================================
// TABLES
// =============================================================================

#[tokio::test]
async fn gym_repository_round_trip() {
    let (addr, _) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let auth = backend(addr, &storage);
    let user = auth
        .sign_up("a@b.com", "secret1", json!({}))
        .await
        .unwrap()
        .user;
    let rest = Arc::new(RestClient::new(&config(addr), auth as Arc<dyn AuthBackend>).unwrap());
    let repo = HostedGymRepository::new(rest);

    let new_gym = NewGym { name: "Apex".into(), email: "a@b.com".into(), owner_id: Some(user.id) };
    let created = repo.insert(&new_gym).await.unwrap();
    assert_eq!(repo.find_by_email("a@b.com").await.unwrap(), Some(created.clone()));
    assert_eq!(repo.find_by_owner(user.id).await.unwrap(), Some(created.clone()));
    assert!(matches!(repo.insert(&new_gym).await, Err(gymdesk::gyms::GymStoreError::Conflict)));

    let updated = repo
        .update(created.id, &GymUpdate { address: Some("1 Main St".into()), ..GymUpdate::default() })
        .await
        .unwrap();
    assert_eq!(updated.address.as_deref(), Some("1 Main St"));
    assert_eq!(updated.name, "Apex");
}

#[tokio::test]
async fn members_require_session() {
    let (addr, mock) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let auth = backend(addr, &storage);
    let rest = Arc::new(RestClient::new(&config(addr), Arc::clone(&auth) as Arc<dyn AuthBackend>).unwrap());
    let repo = HostedMemberRepository::new(rest);
    let gym_id = Uuid::new_v4();
    lock(&mock)
        .members
        .push(json!({ "id": Uuid::new_v4(), "gym_id": gym_id, "name": "Sam" }));

    let err = repo.list_for_gym(gym_id).await.unwrap_err();
    assert!(err.is_permission_denied());

    auth.sign_up("a@b.com", "secret1", json!({})).await.unwrap();
    let members = repo.list_for_gym(gym_id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name, "Sam");
}

// =============================================================================
// FACADE OVER HTTP
// =============================================================================

#[tokio::test]
async fn sign_up_provisions_gym_over_http() {
    let (addr, mock) = spawn_mock().await;
    let storage = Arc::new(MemoryStore::new());
    let auth = backend(addr, &storage);
    let rest = Arc::new(RestClient::new(&config(addr), Arc::clone(&auth) as Arc<dyn AuthBackend>).unwrap());
    let nav = Arc::new(HistoryNavigator::new(Route::Signup));
    let app = AppState::new(
        auth,
        Arc::new(HostedGymRepository::new(Arc::clone(&rest))),
        Arc::new(HostedMemberRepository::new(rest)),
        storage,
        Arc::clone(&nav) as Arc<dyn Navigator>,
        Timings::default(),
        "http://localhost:5173",
    );
    let mut sub = app.mount();
    sub.initial_fetch_done().await;

    let outcome = app.auth().sign_up("a@b.com", "secret1", "Apex").await.unwrap();
    assert_eq!(outcome.gym.map(|g| g.name).as_deref(), Some("Apex"));
    assert_eq!(nav.current(), Route::Dashboard);
    assert_eq!(lock(&mock).gyms.len(), 1);

    app.auth().reset_password("a@b.com").await.unwrap();
    assert_eq!(
        lock(&mock).recover_requests,
        vec![("a@b.com".to_owned(), Some("http://localhost:5173/account".to_owned()))]
    );

    app.auth().sign_out().await;
    assert_eq!(nav.current(), Route::Login);
    assert!(!app.store.snapshot().is_authenticated());
}
