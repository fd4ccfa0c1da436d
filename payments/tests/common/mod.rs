//! Shared harness: a fake payment provider and the real service router, both
//! served on ephemeral local ports.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use storefront_payments::confirmation::RetryPolicy;
use storefront_payments::provider::ProviderClient;
use storefront_payments::routes;
use storefront_payments::service::{PaymentService, ServiceSettings};
use storefront_payments::store::InMemoryStore;
use tokio::net::TcpListener;
use url::Url;

/// Secret key the fake provider answers with 401.
pub const REVOKED_SECRET: &str = "APP_USR-revoked";

/// Card token the fake provider declines with a 201 `rejected` payment.
pub const DECLINED_TOKEN: &str = "declined-token";

/// Card token the fake provider refuses with a structured 400.
pub const MALFORMED_TOKEN: &str = "malformed-token";

/// Everything the fake provider has seen, plus its canned payments.
#[derive(Debug, Default)]
pub struct ProviderState {
    pub payments: Vec<Value>,
    pub preferences: Vec<Value>,
    pub charges: Vec<(Option<String>, Value)>,
    /// First response per `X-Idempotency-Key`, replayed on repeats.
    pub replays: HashMap<String, (StatusCode, Value)>,
    pub calls: usize,
    /// Answer every call with an unreadable 502.
    pub broken: bool,
}

pub type SharedProvider = Arc<Mutex<ProviderState>>;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "message": "invalid access token",
            "error": "unauthorized",
            "status": 401,
            "cause": [],
        })),
    )
        .into_response()
}

/// Counts the call and returns the canned failure, if any.
fn guard(state: &SharedProvider, headers: &HeaderMap) -> Option<Response> {
    let mut state = state.lock().unwrap();
    state.calls += 1;
    if state.broken {
        return Some((StatusCode::BAD_GATEWAY, "<html>502 Bad Gateway</html>").into_response());
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    (bearer == format!("Bearer {REVOKED_SECRET}") || !bearer.starts_with("Bearer "))
        .then(unauthorized)
}

async fn create_preference(
    State(state): State<SharedProvider>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = guard(&state, &headers) {
        return failure;
    }
    let mut state = state.lock().unwrap();
    let id = format!("pref-{}", state.preferences.len() + 1);
    state.preferences.push(body);
    (
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "init_point": format!("https://checkout.test/{id}"),
            "sandbox_init_point": format!("https://sandbox.checkout.test/{id}"),
        })),
    )
        .into_response()
}

async fn search_payments(
    State(state): State<SharedProvider>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(failure) = guard(&state, &headers) {
        return failure;
    }
    let state = state.lock().unwrap();
    let limit = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(usize::MAX);
    let results: Vec<&Value> = state
        .payments
        .iter()
        .rev()
        .filter(|p| match params.get("external_reference") {
            Some(reference) => p["external_reference"] == json!(reference),
            None => true,
        })
        .take(limit)
        .collect();
    Json(json!({ "results": results })).into_response()
}

async fn create_payment(
    State(state): State<SharedProvider>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = guard(&state, &headers) {
        return failure;
    }
    let mut state = state.lock().unwrap();
    let idempotency_key = headers
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.charges.push((idempotency_key.clone(), body.clone()));
    if let Some((status, replay)) = idempotency_key
        .as_ref()
        .and_then(|key| state.replays.get(key))
    {
        return (*status, Json(replay.clone())).into_response();
    }

    let (status, payment) = match body["token"].as_str() {
        Some(MALFORMED_TOKEN) => (
            StatusCode::BAD_REQUEST,
            json!({
                "message": "invalid parameters",
                "error": "bad_request",
                "status": 400,
                "cause": [{ "code": 3003, "description": "Invalid card_token_id" }],
            }),
        ),
        token => {
            let (status, detail) = if token == Some(DECLINED_TOKEN) {
                ("rejected", "cc_rejected_insufficient_amount")
            } else {
                ("approved", "accredited")
            };
            let payment = json!({
                "id": 7000 + state.charges.len(),
                "external_reference": body["external_reference"],
                "status": status,
                "status_detail": detail,
                "transaction_amount": body["transaction_amount"],
                "date_created": "2026-10-18T12:00:00.000-03:00",
            });
            state.payments.push(payment.clone());
            (StatusCode::CREATED, payment)
        }
    };
    if let Some(key) = idempotency_key {
        state.replays.insert(key, (status, payment.clone()));
    }
    (status, Json(payment)).into_response()
}

fn provider_router(state: SharedProvider) -> Router {
    Router::new()
        .route("/checkout/preferences", post(create_preference))
        .route("/v1/payments/search", get(search_payments))
        .route("/v1/payments", post(create_payment))
        .with_state(state)
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A running service wired to a fake provider.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub provider: SharedProvider,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let provider = SharedProvider::default();
        let provider_addr = serve(provider_router(Arc::clone(&provider))).await;

        let provider_url = Url::parse(&format!("http://{provider_addr}/")).unwrap();
        let client = ProviderClient::new(&provider_url, Duration::from_secs(5)).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let settings = ServiceSettings {
            retry: RetryPolicy::new(Duration::from_millis(10), 3),
            ..ServiceSettings::default()
        };
        let service = PaymentService::new(
            Arc::<InMemoryStore>::clone(&store),
            store,
            Arc::new(client),
            settings,
        );
        let app_addr = serve(routes::routes().with_state(Arc::new(service))).await;

        Self {
            base_url: format!("http://{app_addr}"),
            client: reqwest::Client::new(),
            provider,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let response = self.client.post(self.url(path)).json(body).send().await.unwrap();
        read(response).await
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        read(response).await
    }

    pub async fn save_credentials(&self, merchant_id: &str, secret_key: &str) -> Value {
        let response = self
            .client
            .put(self.url(&format!("/merchants/{merchant_id}/credentials")))
            .json(&json!({ "publicKey": "APP_USR-public", "secretKey": secret_key }))
            .send()
            .await
            .unwrap();
        let (status, body) = read(response).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    /// Places a two-pizza delivery order (50.00 + 5.00 delivery fee).
    pub async fn place_order(&self, merchant_id: &str) -> String {
        let (status, body) = self
            .post(
                "/orders",
                &json!({
                    "merchantId": merchant_id,
                    "items": [{ "title": "Pizza Margherita", "quantity": 2, "unitPrice": 25.0 }],
                    "totalAmount": 55.0,
                    "deliveryAddress": "Rua das Flores, 10",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_owned()
    }

    /// Records a provider-side payment for `order_id`.
    pub fn push_payment(&self, id: u64, order_id: &str, status: &str, date_created: &str) {
        self.provider.lock().unwrap().payments.push(json!({
            "id": id,
            "external_reference": order_id,
            "status": status,
            "status_detail": "accredited",
            "transaction_amount": 55.0,
            "date_created": date_created,
        }));
    }

    pub fn provider_calls(&self) -> usize {
        self.provider.lock().unwrap().calls
    }
}

async fn read(response: reqwest::Response) -> (StatusCode, Value) {
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}
