mod common;

use common::{gateways_with_flutterwave, gateways_with_paystack, TestApp, FRONTEND_URL};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn paystack_checkout_returns_a_redirect_url() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .and(header("authorization", "Bearer sk_test"))
        .and(body_partial_json(json!({
            "amount": 500000,
            "currency": "NGN",
            "email": "payer@example.com",
            "callback_url": "http://payments.test/webhooks/paystack/callback"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Authorization URL created",
            "data": {
                "authorization_url": "https://checkout.paystack.com/xyz",
                "access_code": "xyz"
            }
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let app = TestApp::spawn_with(gateways_with_paystack(&provider.uri())).await;
    let (status, body) = app
        .pay(json!({
            "gateway": "paystack",
            "amount": "5000",
            "currency": "NGN",
            "purpose": "registration",
            "email": "payer@example.com"
        }))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["redirect_url"], "https://checkout.paystack.com/xyz");
    assert!(body["reference"].as_str().unwrap().starts_with("PSK_"));
}

#[tokio::test]
async fn paystack_without_email_fails_without_calling_the_provider() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    let app = TestApp::spawn_with(gateways_with_paystack(&provider.uri())).await;
    let (status, body) = app
        .pay(json!({ "gateway": "paystack", "amount": "5000", "purpose": "registration" }))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn callback_reverifies_before_redirecting_to_success() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/PSK_1_abcdef12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": { "id": 42, "status": "success", "amount": 500000, "currency": "NGN" }
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let app = TestApp::spawn_with(gateways_with_paystack(&provider.uri())).await;
    let response = app
        .client
        .get(app.url(
            "/webhooks/paystack/callback?trxref=PSK_1_abcdef12&reference=PSK_1_abcdef12",
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(
        location(&response),
        format!(
            "{}/payment/success?reference=PSK_1_abcdef12&status=success",
            FRONTEND_URL
        )
    );
}

#[tokio::test]
async fn callback_for_an_abandoned_payment_redirects_to_failed() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction/verify/PSK_2_abcdef12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "message": "Verification successful",
            "data": { "id": 43, "status": "abandoned", "amount": 500000, "currency": "NGN" }
        })))
        .mount(&provider)
        .await;

    let app = TestApp::spawn_with(gateways_with_paystack(&provider.uri())).await;
    let response = app
        .client
        .get(app.url("/webhooks/paystack/callback?reference=PSK_2_abcdef12"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert!(location(&response).starts_with(&format!("{}/payment/failed?", FRONTEND_URL)));
}

#[tokio::test]
async fn cancelled_callback_skips_verification() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&provider)
        .await;

    let app = TestApp::spawn_with(gateways_with_flutterwave(&provider.uri())).await;
    let response = app
        .client
        .get(app.url(
            "/webhooks/flutterwave/callback?status=cancelled&tx_ref=FLW_1_abcdef12",
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 303);
    assert_eq!(
        location(&response),
        format!("{}/payment/cancelled?reference=FLW_1_abcdef12", FRONTEND_URL)
    );
}

#[tokio::test]
async fn flutterwave_checkout_returns_the_hosted_link() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments"))
        .and(header("authorization", "Bearer FLWSECK_TEST"))
        .and(body_partial_json(json!({ "amount": 5000.0, "currency": "NGN" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Hosted Link",
            "data": { "link": "https://checkout.flutterwave.com/v3/hosted/pay/abc" }
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let app = TestApp::spawn_with(gateways_with_flutterwave(&provider.uri())).await;
    let (status, body) = app
        .pay(json!({
            "gateway": "flutterwave",
            "amount": "5000",
            "purpose": "registration",
            "email": "payer@example.com",
            "name": "Ada Obi"
        }))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "pending");
    assert_eq!(
        body["redirect_url"],
        "https://checkout.flutterwave.com/v3/hosted/pay/abc"
    );
    assert!(body["reference"].as_str().unwrap().starts_with("FLW_"));
}

#[tokio::test]
async fn flutterwave_verify_by_reference() {
    let provider = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions/verify_by_reference"))
        .and(query_param("tx_ref", "FLW_9_abcdef12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Transaction fetched successfully",
            "data": {
                "id": 288200108,
                "tx_ref": "FLW_9_abcdef12",
                "status": "successful",
                "amount": 5000,
                "currency": "NGN"
            }
        })))
        .mount(&provider)
        .await;

    let app = TestApp::spawn_with(gateways_with_flutterwave(&provider.uri())).await;
    let body: serde_json::Value = app
        .as_user(reqwest::Method::POST, "/payments/verify")
        .json(&json!({ "gateway": "flutterwave", "reference": "FLW_9_abcdef12" }))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");

    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "success");
}
