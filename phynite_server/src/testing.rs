//! In-process stand-in for the upstream API, used by tests

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use phynite_common::{constants::API_KEY_HEADER, Environment, Settings};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

pub const MOCK_API_KEY: &str = "sk_test_mock_key_1234";

#[derive(Clone, Default)]
struct MockState {
    hits: Arc<DashMap<&'static str, usize>>,
    last_checkout: Arc<Mutex<Option<Value>>>,
}

impl MockState {
    fn hit(&self, path: &'static str) {
        *self.hits.entry(path).or_insert(0) += 1;
    }
}

pub struct MockStewie {
    pub base_url: String,
    state: MockState,
}

impl MockStewie {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/v1/users/signup-existence-check", post(existence))
            .route("/v1/billing/checkout", post(checkout))
            .route("/v1/billing/products", get(products))
            .route("/v1/billing/health", get(health))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Settings pointing at this server with a valid key
    pub fn settings(&self) -> Settings {
        Settings {
            api_key: MOCK_API_KEY.to_string(),
            stewie_url: self.base_url.clone(),
            environment: Environment::Development,
            ..Settings::default()
        }
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.hits.get(path).map(|n| *n).unwrap_or(0)
    }

    pub fn last_checkout(&self) -> Option<Value> {
        self.state.last_checkout.lock().unwrap().clone()
    }
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(MOCK_API_KEY) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": "Invalid API key" })),
        )
            .into_response()),
    }
}

async fn existence(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("/v1/users/signup-existence-check");
    if let Err(response) = authorized(&headers) {
        return response;
    }

    let user_exists = body["email"] == "existing@example.com";
    let website_exists = body["website"] == "https://existing.com";
    let message = if user_exists || website_exists {
        "Already registered"
    } else {
        "Available"
    };

    Json(json!({
        "success": true,
        "data": {
            "user_exists": user_exists,
            "website_exists": website_exists,
            "message": message,
        }
    }))
    .into_response()
}

async fn checkout(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("/v1/billing/checkout");
    if let Err(response) = authorized(&headers) {
        return response;
    }
    *state.last_checkout.lock().unwrap() = Some(body.clone());

    if body["email"] == "existing@example.com" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "EMAIL_EXISTS",
                "message": "This email is already registered with Phynite Analytics",
            })),
        )
            .into_response();
    }

    Json(json!({
        "success": true,
        "sessionId": format!("cs_test_{}", hex::encode(rand::random::<[u8; 8]>())),
        "message": "Checkout session created successfully",
    }))
    .into_response()
}

async fn products(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.hit("/v1/billing/products");
    if let Err(response) = authorized(&headers) {
        return response;
    }

    Json(json!({
        "success": true,
        "message": "Products retrieved successfully",
        "data": {
            "monthly": { "id": "monthly", "name": "Monthly", "price": 1900, "currency": "usd", "interval": "month" },
            "yearly": { "id": "yearly", "name": "Yearly", "price": 19000, "currency": "usd", "interval": "year" },
        }
    }))
    .into_response()
}

async fn health(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.hit("/v1/billing/health");
    if let Err(response) = authorized(&headers) {
        return response;
    }

    Json(json!({ "success": true, "message": "Billing service is healthy" })).into_response()
}
