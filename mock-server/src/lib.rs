//! In-memory notes service with session login and revocable bearer tokens.
//!
//! A client opens a session, logs it in to obtain a token, then reads and
//! writes notes with that token. `POST /admin/expire-tokens` revokes every
//! token so clients observe an expired login on their next call.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_USER: &str = "ada";
pub const DEFAULT_PASSWORD: &str = "secret";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub text: String,
}

#[derive(Deserialize)]
pub struct CreateNote {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session: Uuid,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: Uuid,
}

#[derive(Default)]
pub struct Store {
    users: HashMap<String, String>,
    sessions: HashSet<Uuid>,
    /// token -> session
    tokens: HashMap<Uuid, Uuid>,
    notes: Vec<Note>,
    logins: usize,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_user(DEFAULT_USER, DEFAULT_PASSWORD)
}

pub fn app_with_user(user: &str, password: &str) -> Router {
    let mut store = Store::default();
    store.users.insert(user.to_string(), password.to_string());
    let db: Db = Arc::new(RwLock::new(store));
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/{id}/login", post(login))
        .route("/notes", get(list_notes).post(create_note))
        .route("/admin/expire-tokens", post(expire_tokens))
        .route("/admin/logins", get(login_count))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn open_session(State(db): State<Db>) -> (StatusCode, Json<SessionCreated>) {
    let session = Uuid::new_v4();
    db.write().await.sessions.insert(session);
    debug!(%session, "session opened");
    (StatusCode::CREATED, Json(SessionCreated { session }))
}

async fn login(
    State(db): State<Db>,
    Path(session): Path<Uuid>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let mut store = db.write().await;
    if !store.sessions.contains(&session) {
        return Err(StatusCode::NOT_FOUND);
    }
    if store.users.get(&input.user) != Some(&input.password) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let token = Uuid::new_v4();
    store.tokens.insert(token, session);
    store.logins += 1;
    info!(%session, user = %input.user, "login");
    Ok(Json(LoginResponse { token }))
}

/// Resolve the bearer token of a request to its session.
fn authorize(store: &Store, headers: &HeaderMap) -> Result<Uuid, StatusCode> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|t| Uuid::parse_str(t).ok())
        .and_then(|t| store.tokens.get(&t).copied())
        .ok_or(StatusCode::UNAUTHORIZED)
}

async fn list_notes(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<Note>>, StatusCode> {
    let store = db.read().await;
    authorize(&store, &headers)?;
    Ok(Json(store.notes.clone()))
}

async fn create_note(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateNote>,
) -> Result<(StatusCode, Json<Note>), StatusCode> {
    let mut store = db.write().await;
    authorize(&store, &headers)?;
    let note = Note {
        id: Uuid::new_v4(),
        text: input.text,
    };
    store.notes.push(note.clone());
    Ok((StatusCode::CREATED, Json(note)))
}

async fn expire_tokens(State(db): State<Db>) -> StatusCode {
    let mut store = db.write().await;
    let revoked = store.tokens.len();
    store.tokens.clear();
    info!(revoked, "tokens expired");
    StatusCode::NO_CONTENT
}

async fn login_count(State(db): State<Db>) -> Json<usize> {
    Json(db.read().await.logins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_serializes_to_json() {
        let note = Note {
            id: Uuid::nil(),
            text: "Test".to_string(),
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["text"], "Test");
    }

    #[test]
    fn login_request_rejects_missing_password() {
        let result: Result<LoginRequest, _> = serde_json::from_str(r#"{"user":"ada"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn authorize_rejects_unknown_and_malformed_tokens() {
        let mut store = Store::default();
        let token = Uuid::new_v4();
        let session = Uuid::new_v4();
        store.tokens.insert(token, session);

        let mut headers = HeaderMap::new();
        assert_eq!(authorize(&store, &headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(header::AUTHORIZATION, "Bearer not-a-uuid".parse().unwrap());
        assert_eq!(authorize(&store, &headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        assert_eq!(authorize(&store, &headers), Ok(session));
    }
}
