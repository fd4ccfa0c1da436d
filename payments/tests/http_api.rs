//! End-to-end checks of the HTTP surface against a fake provider.

#![allow(clippy::unwrap_used)]

mod common;

use axum::http::StatusCode;
use common::{DECLINED_TOKEN, MALFORMED_TOKEN, REVOKED_SECRET, TestApp};
use serde_json::json;

fn checkout(order_id: &str, merchant_name: &str) -> serde_json::Value {
    json!({
        "orderId": order_id,
        "items": [{ "title": "Pizza Margherita", "quantity": 2, "unitPrice": 25.0 }],
        "totalAmount": 55.0,
        "merchantName": merchant_name,
        "clientBaseUrl": "https://shop.example",
    })
}

fn card(token: &str) -> serde_json::Value {
    json!({ "token": token, "paymentMethodId": "master" })
}

#[tokio::test]
async fn health_and_root_respond() {
    let app = TestApp::spawn().await;

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let root = app.client.get(app.url("/")).send().await.unwrap();
    assert!(root.status().is_success());
}

#[tokio::test]
async fn preference_returns_checkout_url_with_delivery_fee() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;

    let (status, body) = app
        .post("/payments/preference", &checkout(&order_id, "Cantina São João"))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["redirectUrl"], "https://checkout.test/pref-1");

    let provider = app.provider.lock().unwrap();
    let preference = &provider.preferences[0];
    assert_eq!(preference["external_reference"], json!(order_id));
    assert_eq!(preference["statement_descriptor"], "CANTINA SAO JOAO");
    assert_eq!(preference["auto_return"], "approved");
    assert_eq!(preference["items"].as_array().unwrap().len(), 2);
    assert_eq!(preference["items"][1]["title"], "Delivery fee");
    assert_eq!(preference["items"][1]["unit_price"], json!(5.0));
    assert_eq!(
        preference["payment_methods"]["excluded_payment_types"][0]["id"],
        "ticket"
    );
    let success = preference["back_urls"]["success"].as_str().unwrap();
    assert!(success.starts_with("https://shop.example/checkout/result?"));
    assert!(success.contains(&format!("order_id={order_id}")));
}

#[tokio::test]
async fn sandbox_secret_gets_sandbox_checkout() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "TEST-123-secret").await;
    let order_id = app.place_order("cantina").await;

    let (status, body) = app
        .post("/payments/preference", &checkout(&order_id, "Cantina"))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["redirectUrl"], "https://sandbox.checkout.test/pref-1");
}

#[tokio::test]
async fn missing_credential_fails_before_calling_provider() {
    let app = TestApp::spawn().await;
    let order_id = app.place_order("no-keys").await;

    let (status, body) = app
        .post("/payments/preference", &checkout(&order_id, "No Keys"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "missing_credential");
    assert_eq!(app.provider_calls(), 0);
}

#[tokio::test]
async fn cart_without_valid_items_is_rejected() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;
    let calls_before = app.provider_calls();

    let mut request = checkout(&order_id, "Cantina");
    request["items"] = json!([{ "title": "Free", "quantity": 1, "unitPrice": 0.0 }]);
    let (status, body) = app.post("/payments/preference", &request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "no_valid_items");
    assert_eq!(app.provider_calls(), calls_before);
}

#[tokio::test]
async fn unreadable_provider_failure_is_provider_error() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;
    app.provider.lock().unwrap().broken = true;

    let (status, body) = app
        .post("/payments/preference", &checkout(&order_id, "Cantina"))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "provider_error");
    assert!(!body["message"].as_str().unwrap().contains("502 Bad Gateway</html>"));
}

#[tokio::test]
async fn confirmation_waits_for_payment_then_applies_once() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;

    let (status, body) = app
        .post("/payments/confirm", &json!({ "orderId": order_id }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["retry"], true);

    app.push_payment(41, &order_id, "pending", "2026-10-18T12:00:00Z");
    app.push_payment(42, &order_id, "approved", "2026-10-18T12:05:00Z");

    for _ in 0..2 {
        let (status, body) = app
            .post("/payments/confirm", &json!({ "orderId": order_id }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "approved");
        assert_eq!(body["paymentId"], 42);
        assert_eq!(body["orderStatus"], "pending");
    }

    let (status, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["terminal"], false);
}

#[tokio::test]
async fn non_approved_payment_leaves_order_awaiting() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;
    app.push_payment(51, &order_id, "rejected", "2026-10-18T12:00:00Z");

    let (status, body) = app
        .post("/payments/confirm", &json!({ "orderId": order_id, "wait": true }))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["orderStatus"], "awaiting_payment");
}

#[tokio::test]
async fn confirming_unknown_order_is_not_found_error() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .post("/payments/confirm", &json!({ "orderId": "missing" }))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "order_not_found");
}

#[tokio::test]
async fn approved_charge_moves_order_to_pending() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;

    let (status, body) = app
        .post(
            "/payments/charge",
            &json!({
                "orderId": order_id,
                "totalAmount": 55.0,
                "payerEmail": "ana@example.com",
                "paymentData": card("tok-ok"),
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "approved");
    assert_eq!(body["statusDetail"], "accredited");
    assert!(body["paymentId"].is_u64());

    {
        let provider = app.provider.lock().unwrap();
        let (key, charge) = &provider.charges[0];
        assert_eq!(key.as_deref(), Some(format!("charge-{order_id}-tok-ok").as_str()));
        assert_eq!(charge["installments"], 1);
        assert_eq!(charge["payer"]["email"], "ana@example.com");
    }

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "pending");
}

#[tokio::test]
async fn declined_charges_answer_200() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;

    for (token, detail) in [
        (DECLINED_TOKEN, "cc_rejected_insufficient_amount"),
        (MALFORMED_TOKEN, "Invalid card_token_id"),
    ] {
        let (status, body) = app
            .post(
                "/payments/charge",
                &json!({
                    "orderId": order_id,
                    "totalAmount": 55.0,
                    "payerEmail": "ana@example.com",
                    "paymentData": card(token),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["statusDetail"], detail);
    }

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "awaiting_payment");
}

#[tokio::test]
async fn revoked_credential_is_saved_unverified() {
    let app = TestApp::spawn().await;

    let body = app.save_credentials("cantina", REVOKED_SECRET).await;
    assert_eq!(body["verified"], false);

    let order_id = app.place_order("cantina").await;
    let (status, body) = app
        .post("/payments/preference", &checkout(&order_id, "Cantina"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "provider_error");

    let body = app.save_credentials("cantina", "APP_USR-rotated").await;
    assert_eq!(body["verified"], true);
    let (status, _) = app
        .post("/payments/preference", &checkout(&order_id, "Cantina"))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/payments/confirm"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn order_validation_errors_are_bad_request() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .post(
            "/orders",
            &json!({
                "merchantId": "cantina",
                "items": [{ "title": "Pizza", "quantity": 1, "unitPrice": 25.0 }],
                "totalAmount": 25.0,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn new_card_after_decline_is_charged() {
    let app = TestApp::spawn().await;
    app.save_credentials("cantina", "APP_USR-secret").await;
    let order_id = app.place_order("cantina").await;
    let charge = |token: &str| {
        json!({
            "orderId": order_id,
            "totalAmount": 55.0,
            "payerEmail": "ana@example.com",
            "paymentData": card(token),
        })
    };

    let (_, first) = app.post("/payments/charge", &charge(DECLINED_TOKEN)).await;
    let (_, resent) = app.post("/payments/charge", &charge(DECLINED_TOKEN)).await;
    assert_eq!(first["status"], "rejected");
    assert_eq!(resent["paymentId"], first["paymentId"]);

    let (status, body) = app.post("/payments/charge", &charge("tok-second-card")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "approved");
    assert_ne!(body["paymentId"], first["paymentId"]);

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "pending");
}
