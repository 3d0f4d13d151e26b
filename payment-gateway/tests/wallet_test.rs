mod common;

use common::{TestApp, TEST_USER_ID};
use reqwest::Method;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

async fn balance(app: &TestApp) -> Decimal {
    let body: Value = app
        .as_user(Method::GET, "/wallet/balance")
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    decimal(&body["balance"])
}

#[tokio::test]
async fn wallet_payment_debits_the_balance() {
    let app = TestApp::spawn().await;
    app.credit_wallet(TEST_USER_ID, dec!(5000)).await;

    let (status, body) = app
        .pay(json!({
            "gateway": "wallet",
            "amount": "3000",
            "currency": "NGN",
            "purpose": "registration"
        }))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "success");
    assert_eq!(decimal(&body["balance"]), dec!(2000));
    assert!(body["reference"].as_str().unwrap().starts_with("WAL_"));
    assert_eq!(balance(&app).await, dec!(2000));

    let page: Value = app
        .as_user(Method::GET, "/transactions?page=1&limit=10")
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(page["total"], 2);
    assert_eq!(page["transactions"][0]["kind"], "debit");
    assert_eq!(decimal(&page["transactions"][0]["amount"]), dec!(-3000));
}

#[tokio::test]
async fn insufficient_balance_fails_without_debiting() {
    let app = TestApp::spawn().await;
    app.credit_wallet(TEST_USER_ID, dec!(1000)).await;

    let (status, body) = app
        .pay(json!({
            "gateway": "wallet",
            "amount": "3000",
            "purpose": "registration"
        }))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "failed");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Insufficient wallet balance"));
    assert_eq!(balance(&app).await, dec!(1000));
}

#[tokio::test]
async fn partial_refund_credits_the_wallet_and_caps_the_total() {
    let app = TestApp::spawn().await;
    app.credit_wallet(TEST_USER_ID, dec!(5000)).await;

    let (_, payment) = app
        .pay(json!({ "gateway": "wallet", "amount": "3000", "purpose": "registration" }))
        .await;
    let transaction_id = payment["transaction_id"].as_str().unwrap().to_string();

    let refund: Value = app
        .as_admin(Method::POST, "/admin/payments/refund")
        .json(&json!({ "gateway": "wallet", "transaction_id": transaction_id, "amount": "1000" }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(refund["success"], true);
    assert_eq!(refund["status"], "refunded");
    assert_eq!(balance(&app).await, dec!(3000));

    let over: Value = app
        .as_admin(Method::POST, "/admin/payments/refund")
        .json(&json!({ "gateway": "wallet", "transaction_id": transaction_id, "amount": "2500" }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(over["success"], false);
    assert_eq!(balance(&app).await, dec!(3000));
}

#[tokio::test]
async fn omitted_gateway_uses_the_recommendation() {
    let app = TestApp::spawn().await;
    app.credit_wallet(TEST_USER_ID, dec!(500)).await;

    let methods: Value = app
        .as_user(Method::GET, "/payments/methods?amount=200")
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(methods["recommended"], "wallet");

    let (_, covered) = app
        .pay(json!({ "amount": "200", "purpose": "registration" }))
        .await;
    assert!(covered["reference"].as_str().unwrap().starts_with("WAL_"));

    // 300 left: a larger payment falls through to the default gateway.
    let (_, uncovered) = app
        .pay(json!({ "amount": "1000", "purpose": "registration" }))
        .await;
    assert!(uncovered["reference"].as_str().unwrap().starts_with("MOCK_"));
    assert_eq!(balance(&app).await, dec!(300));
}

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/payments"))
        .json(&json!({ "gateway": "wallet", "amount": "100", "purpose": "registration" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn invalid_payment_body_is_rejected() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .pay(json!({ "gateway": "wallet", "amount": "-5", "purpose": "registration" }))
        .await;
    assert_eq!(status, 422);

    let (status, _) = app
        .pay(json!({ "gateway": "wallet", "amount": "5", "purpose": "" }))
        .await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn sub_unit_amount_is_rejected_without_touching_the_balance() {
    let app = TestApp::spawn().await;
    app.credit_wallet(TEST_USER_ID, dec!(10)).await;

    let (status, body) = app
        .pay(json!({ "gateway": "wallet", "amount": "0.004", "purpose": "registration" }))
        .await;
    assert_eq!(status, 422);
    assert!(body["error"].is_string());
    assert_eq!(balance(&app).await, dec!(10));
}

#[tokio::test]
async fn disabled_gateway_is_unavailable() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .pay(json!({ "gateway": "paystack", "amount": "100", "purpose": "registration" }))
        .await;
    assert_eq!(status, 503);
    assert!(body["error"].is_string());
}
