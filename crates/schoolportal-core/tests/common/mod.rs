//! In-process mock of the portal backend for integration tests.
//!
//! Each test starts its own server on an ephemeral port, so tests can run in
//! parallel without port conflicts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use schoolportal_core::api::{ApiClient, AuthApi};
use schoolportal_core::auth::{CredentialStore, MemoryCredentialStore};
use schoolportal_core::SessionController;

pub type Params = HashMap<String, String>;

/// Canned responses and call records shared with the handlers
pub struct MockState {
    pub send_otp_response: Mutex<(u16, Value)>,
    pub verify_response: Mutex<(u16, Value)>,
    pub refresh_response: Mutex<(u16, Value)>,
    pub validate_response: Mutex<(u16, Value)>,
    pub profile: Mutex<Value>,
    /// Bearer token the protected endpoints accept
    pub valid_token: Mutex<String>,
    /// Reject every bearer token, even freshly refreshed ones
    pub always_unauthorized: AtomicBool,
    pub refresh_delay_ms: AtomicU64,

    pub send_otp_calls: Mutex<Vec<Params>>,
    pub verify_calls: Mutex<Vec<Params>>,
    pub refresh_bodies: Mutex<Vec<Value>>,
    pub role_bodies: Mutex<Vec<Value>>,
    pub profile_calls: AtomicUsize,
    pub profile_auth_headers: Mutex<Vec<Option<String>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            send_otp_response: Mutex::new((200, json!({"requestId": "req-1"}))),
            verify_response: Mutex::new((200, json!({"token": "tok-xyz", "user": {"id": 1}}))),
            refresh_response: Mutex::new((200, json!({"token": "tok-new", "refreshToken": "ref-new"}))),
            validate_response: Mutex::new((200, json!({"token": "tok-valid"}))),
            profile: Mutex::new(json!({"student_ids": [5], "school_ids": []})),
            valid_token: Mutex::new("tok-xyz".to_string()),
            always_unauthorized: AtomicBool::new(false),
            refresh_delay_ms: AtomicU64::new(0),
            send_otp_calls: Mutex::new(Vec::new()),
            verify_calls: Mutex::new(Vec::new()),
            refresh_bodies: Mutex::new(Vec::new()),
            role_bodies: Mutex::new(Vec::new()),
            profile_calls: AtomicUsize::new(0),
            profile_auth_headers: Mutex::new(Vec::new()),
        }
    }
}

impl MockState {
    pub fn set_send_otp(&self, status: u16, body: Value) {
        *self.send_otp_response.lock().unwrap() = (status, body);
    }

    pub fn set_verify(&self, status: u16, body: Value) {
        *self.verify_response.lock().unwrap() = (status, body);
    }

    pub fn set_refresh(&self, status: u16, body: Value) {
        *self.refresh_response.lock().unwrap() = (status, body);
    }

    pub fn set_validate(&self, status: u16, body: Value) {
        *self.validate_response.lock().unwrap() = (status, body);
    }

    pub fn set_profile(&self, profile: Value) {
        *self.profile.lock().unwrap() = profile;
    }

    pub fn set_valid_token(&self, token: &str) {
        *self.valid_token.lock().unwrap() = token.to_string();
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_bodies.lock().unwrap().len()
    }

    pub fn profile_count(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        if self.always_unauthorized.load(Ordering::SeqCst) {
            return false;
        }
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::start_with(MockState::default()).await
    }

    pub async fn start_with(state: MockState) -> Self {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/auth/send-otp", post(send_otp))
            .route("/auth/verify-otp", post(verify_otp))
            .route("/auth/refresh", post(refresh))
            .route("/auth/validate-token", post(validate_token))
            .route("/auth/role", put(update_role))
            .route("/user/profile", get(profile))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend crashed");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn client(&self, store: Arc<MemoryCredentialStore>) -> ApiClient {
        let store: Arc<dyn CredentialStore> = store;
        ApiClient::new(&self.base_url, Duration::from_secs(5), store).expect("build client")
    }

    pub fn api(&self, store: Arc<MemoryCredentialStore>) -> AuthApi {
        AuthApi::new(self.client(store))
    }

    pub fn controller(&self, store: Arc<MemoryCredentialStore>) -> SessionController {
        SessionController::new(self.api(store), false)
    }
}

fn reply(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn unauthorized() -> Response {
    reply(401, json!({"message": "Token expired"}))
}

async fn send_otp(State(state): State<Arc<MockState>>, Query(params): Query<Params>) -> Response {
    state.send_otp_calls.lock().unwrap().push(params);
    let (status, body) = state.send_otp_response.lock().unwrap().clone();
    reply(status, body)
}

async fn verify_otp(State(state): State<Arc<MockState>>, Query(params): Query<Params>) -> Response {
    state.verify_calls.lock().unwrap().push(params);
    let (status, body) = state.verify_response.lock().unwrap().clone();
    reply(status, body)
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.refresh_bodies.lock().unwrap().push(body);
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let (status, body) = state.refresh_response.lock().unwrap().clone();
    if status == 200 {
        if let Some(token) = body.get("token").and_then(Value::as_str) {
            state.set_valid_token(token);
        }
    }
    reply(status, body)
}

async fn validate_token(
    State(state): State<Arc<MockState>>,
    Query(params): Query<Params>,
) -> Response {
    let expected = state.valid_token.lock().unwrap().clone();
    if params.get("token") != Some(&expected) {
        return unauthorized();
    }
    let (status, body) = state.validate_response.lock().unwrap().clone();
    reply(status, body)
}

async fn update_role(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    state.role_bodies.lock().unwrap().push(body);
    reply(200, json!({"token": "tok-role"}))
}

async fn profile(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.profile_calls.fetch_add(1, Ordering::SeqCst);
    state.profile_auth_headers.lock().unwrap().push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    let profile = state.profile.lock().unwrap().clone();
    reply(200, profile)
}
