//! HTTP route handlers for the payment service.
//!
//! Order endpoints (`/orders`), payment endpoints (`/payments/preference`,
//! `/payments/confirm`, `/payments/charge`), merchant credentials and
//! liveness. All payloads use camelCase JSON.
//!
//! Failures are returned as `{"status": "error", "code", "message"}` with
//! the HTTP status of the [`PaymentError`]. A confirmation that finds no
//! payment yet is a 404 carrying `"retry": true`. A declined card is a
//! successful call and answers 200.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::charge::TokenizedPaymentData;
use crate::confirmation::Confirmation;
use crate::credential::PaymentCredential;
use crate::error::PaymentError;
use crate::order::{NewOrder, Order};
use crate::provider::ProviderStatus;
use crate::service::{CheckoutRequest, PaymentService};

/// Shared state of every handler.
pub type PaymentsState = Arc<PaymentService>;

/// Creates the router with all service endpoints.
pub fn routes() -> Router<PaymentsState> {
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/orders", post(post_order))
        .route("/orders/{order_id}", get(get_order))
        .route("/payments/preference", post(post_preference))
        .route("/payments/confirm", post(post_confirm))
        .route("/payments/charge", post(post_charge))
        .route(
            "/merchants/{merchant_id}/credentials",
            put(put_credentials),
        )
}

fn rejected_body(rejection: &JsonRejection) -> Response {
    PaymentError::InvalidRequest(rejection.body_text()).into_response()
}

/// `GET /`
#[cfg_attr(feature = "telemetry", instrument(skip_all))]
async fn get_root() -> impl IntoResponse {
    (
        StatusCode::OK,
        concat!("Hello from ", env!("CARGO_PKG_NAME"), "!"),
    )
}

/// `GET /health`
#[cfg_attr(feature = "telemetry", instrument(skip_all))]
async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `POST /orders`: places an order awaiting payment.
#[cfg_attr(feature = "telemetry", instrument(skip_all))]
async fn post_order(
    State(service): State<PaymentsState>,
    body: Result<Json<NewOrder>, JsonRejection>,
) -> Response {
    let Json(new) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(&rejection),
    };
    match service.place_order(new).await {
        Ok(order) => (StatusCode::CREATED, Json(OrderView::from(order))).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Order as seen by the storefront while it polls.
#[derive(Debug, Serialize)]
struct OrderView {
    #[serde(flatten)]
    order: Order,
    terminal: bool,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let terminal = order.status.is_terminal();
        Self { order, terminal }
    }
}

/// `GET /orders/{order_id}`
#[cfg_attr(feature = "telemetry", instrument(skip_all, fields(order_id = %order_id)))]
async fn get_order(
    State(service): State<PaymentsState>,
    Path(order_id): Path<String>,
) -> Response {
    match service.order(&order_id).await {
        Ok(order) => Json(OrderView::from(order)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// `POST /payments/preference`: returns the checkout redirect URL.
#[cfg_attr(feature = "telemetry", instrument(skip_all))]
async fn post_preference(
    State(service): State<PaymentsState>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Response {
    let Json(checkout) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(&rejection),
    };
    match service.create_preference(&checkout).await {
        Ok(redirect_url) => Json(json!({ "redirectUrl": redirect_url })).into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest {
    order_id: String,
    /// Poll server-side until the payment settles.
    #[serde(default)]
    wait: bool,
}

/// `POST /payments/confirm`: reconciles the order with the provider.
#[cfg_attr(feature = "telemetry", instrument(skip_all))]
async fn post_confirm(
    State(service): State<PaymentsState>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(&rejection),
    };
    match service.confirm_payment(&request.order_id, request.wait).await {
        Ok(Confirmation::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "not_found",
                "message": "no payment found for this order yet",
                "retry": true,
            })),
        )
            .into_response(),
        Ok(Confirmation::Payment {
            payment_id,
            status,
            order_status,
            ..
        }) => Json(json!({
            "status": status,
            "message": confirmation_message(&status),
            "paymentId": payment_id,
            "orderStatus": order_status,
        }))
        .into_response(),
        Err(error) => error.into_response(),
    }
}

fn confirmation_message(status: &ProviderStatus) -> &'static str {
    match status {
        ProviderStatus::Approved => "payment approved",
        ProviderStatus::Pending
        | ProviderStatus::Authorized
        | ProviderStatus::InProcess
        | ProviderStatus::InMediation => "payment is being processed",
        ProviderStatus::Rejected | ProviderStatus::Cancelled => "payment was not approved",
        ProviderStatus::Refunded | ProviderStatus::ChargedBack => "payment was reversed",
        ProviderStatus::Other(_) => "payment status unknown",
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeRequestBody {
    order_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    total_amount: Decimal,
    payer_email: String,
    payment_data: TokenizedPaymentData,
}

/// `POST /payments/charge`: charges a tokenized card.
#[cfg_attr(feature = "telemetry", instrument(skip_all))]
async fn post_charge(
    State(service): State<PaymentsState>,
    body: Result<Json<ChargeRequestBody>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(&rejection),
    };
    match service
        .charge_card(
            &request.order_id,
            request.total_amount,
            &request.payer_email,
            request.payment_data,
        )
        .await
    {
        Ok((outcome, _)) => Json(outcome).into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsBody {
    public_key: String,
    secret_key: String,
}

/// `PUT /merchants/{merchant_id}/credentials`
#[cfg_attr(feature = "telemetry", instrument(skip_all, fields(merchant_id = %merchant_id)))]
async fn put_credentials(
    State(service): State<PaymentsState>,
    Path(merchant_id): Path<String>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> Response {
    let Json(keys) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(&rejection),
    };
    let credential = PaymentCredential::new(keys.public_key, keys.secret_key);
    match service.save_credentials(&merchant_id, credential).await {
        Ok(verified) => Json(json!({
            "message": "credentials saved",
            "verified": verified,
        }))
        .into_response(),
        Err(error) => error.into_response(),
    }
}
