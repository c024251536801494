// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! In-process tests of the request pipeline

mod fixtures;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use fixtures::{RecordingBilling, VALID_SIGNATURE};
use gateway::{
    Environment, Pipeline, RouteTable, ServerConfig, Stage,
    config::TimeoutSeconds,
    translator::GENERIC_FAULT_MESSAGE,
    webhook::SIGNATURE_HEADER,
};
use providers::{StripeConfig, StripeWebhookVerifier, sign_payload};
use serde_json::{Value, json};
use tower::ServiceExt;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

async fn send(router: Router, request: Request<Body>) -> Reply {
    let response = router.oneshot(request).await.expect("infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    Reply {
        status,
        headers,
        body,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

fn dev_pipeline() -> Router {
    fixtures::pipeline(
        &fixtures::config(Environment::Development),
        Arc::new(RecordingBilling::default()),
    )
}

fn pipeline_for(config: &ServerConfig) -> Router {
    fixtures::pipeline(config, Arc::new(RecordingBilling::default()))
}

#[test]
fn stages_are_registered_in_order() {
    let config = fixtures::config(Environment::Development);
    let pipeline = Pipeline::builder(&config, Arc::new(RecordingBilling::default())).build();
    assert_eq!(pipeline.stages(), Stage::ALL.to_vec());

    let config = fixtures::config(Environment::Production);
    let pipeline = Pipeline::builder(&config, Arc::new(RecordingBilling::default())).build();
    let stages = pipeline.stages();
    assert!(!stages.contains(&Stage::AccessLog));
    assert_eq!(stages.first(), Some(&Stage::Compression));
    assert_eq!(stages.last(), Some(&Stage::ErrorTranslation));
    let position = |stage| stages.iter().position(|s| *s == stage).expect("stage present");
    assert!(position(Stage::WebhookIngress) < position(Stage::BodyParsing));
    assert!(position(Stage::PollutionControl) < position(Stage::RouterDispatch));
}

#[tokio::test]
async fn webhook_receives_the_exact_bytes() {
    let billing = Arc::new(RecordingBilling::default());
    let router = fixtures::pipeline(&fixtures::config(Environment::Development), billing.clone());
    // Spacing, operator keys and markup must all survive untouched
    let payload = "{\"id\": \"evt_1\",  \"type\":\"checkout.session.completed\", \"$where\": \"<b>\"}";

    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, VALID_SIGNATURE)
        .body(Body::from(payload))
        .expect("valid request");
    let reply = send(router, request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["received"], true);
    assert_eq!(billing.payloads(), vec![Bytes::from(payload)]);
}

#[tokio::test]
async fn webhook_signature_verifies_over_the_raw_body() {
    let secret = "whsec_pipeline";
    let config = fixtures::config(Environment::Production);
    let billing = Arc::new(StripeWebhookVerifier::new(StripeConfig {
        webhook_secret: secret.to_string(),
        tolerance_seconds: 300,
    }));
    let router = Pipeline::builder(&config, billing)
        .routes(fixtures::echo_routes())
        .build()
        .into_router();

    let payload = "{ \"id\":\"evt_2\", \"type\": \"invoice.paid\" }";
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs();
    let signature = sign_payload(
        secret,
        i64::try_from(now).expect("timestamp fits"),
        payload.as_bytes(),
    )
    .expect("signing succeeds");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(payload))
        .expect("valid request");
    let reply = send(router, request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        json!({"received": true, "event_id": "evt_2", "event_type": "invoice.paid"})
    );
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, "t=1,v1=forged")
        .body(Body::from("{}"))
        .expect("valid request");
    let reply = send(dev_pipeline(), request).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.json(),
        json!({
            "status": "fail",
            "message": "Webhook Error: no signatures found matching the expected signature"
        })
    );
}

#[tokio::test]
async fn webhook_without_signature_is_rejected() {
    let reply = send(dev_pipeline(), post_json("/webhook", "{}")).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.json()["message"],
        "Webhook Error: missing stripe-signature header"
    );
}

#[tokio::test]
async fn other_methods_on_the_webhook_path_fall_through() {
    let reply = send(dev_pipeline(), get("/webhook")).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["message"], "Can't find /webhook on this server!");
}

#[tokio::test]
async fn development_unmatched_route_is_404() {
    let reply = send(dev_pipeline(), get("/api/v1/bogus")).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(
        reply.body,
        Bytes::from_static(
            br#"{"status":"fail","message":"Can't find /api/v1/bogus on this server!"}"#
        )
    );
}

#[tokio::test]
async fn development_unmatched_route_is_404_for_any_method() {
    let reply = send(dev_pipeline(), post_json("/checkout?step=2", "{}")).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(
        reply.json()["message"],
        "Can't find /checkout?step=2 on this server!"
    );
}

#[tokio::test]
async fn production_unmatched_get_serves_the_spa() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("index.html"), "<html>storefront</html>").expect("write entry");
    let config = fixtures::config_with_assets(Environment::Production, dir.path());

    for uri in ["/", "/account/orders", "/api/v1/bogus"] {
        let reply = send(pipeline_for(&config), get(uri)).await;
        assert_eq!(reply.status, StatusCode::OK, "{uri}");
        assert_eq!(reply.body, Bytes::from_static(b"<html>storefront</html>"), "{uri}");
    }
}

#[tokio::test]
async fn production_unmatched_post_is_404() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("index.html"), "<html></html>").expect("write entry");
    let config = fixtures::config_with_assets(Environment::Production, dir.path());

    let reply = send(pipeline_for(&config), post_json("/orders", "{}")).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["status"], "fail");
}

#[tokio::test]
async fn production_without_a_built_spa_is_a_fault() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = fixtures::config_with_assets(Environment::Production, dir.path());

    let reply = send(pipeline_for(&config), get("/account")).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json(),
        json!({"status": "error", "message": GENERIC_FAULT_MESSAGE})
    );
}

#[tokio::test]
async fn static_assets_are_served_before_the_api() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("app.js"), "console.log('shop')").expect("write asset");
    let config = fixtures::config_with_assets(Environment::Development, dir.path());

    let reply = send(pipeline_for(&config), get("/app.js")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, Bytes::from_static(b"console.log('shop')"));
}

#[tokio::test]
async fn large_documents_are_compressed() {
    let dir = tempfile::tempdir().expect("temp dir");
    let document = format!("<html>{}</html>", "<p>storefront</p>".repeat(200));
    std::fs::write(dir.path().join("index.html"), &document).expect("write entry");
    let config = fixtures::config_with_assets(Environment::Production, dir.path());

    let request = Request::builder()
        .uri("/products/42")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .expect("valid request");
    let reply = send(pipeline_for(&config), request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::CONTENT_ENCODING], "gzip");
    assert!(reply.body.len() < document.len());
}

#[tokio::test]
async fn repeated_query_keys_collapse_unless_whitelisted() {
    let reply = send(
        dev_pipeline(),
        get("/api/v1/product/echo?sort=price&sort=name&foo=1&foo=2"),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["query"]["sort"], json!(["price", "name"]));
    assert_eq!(body["query"]["foo"], "2");
}

#[tokio::test]
async fn repeated_form_keys_collapse_but_json_arrays_survive() {
    let reply = send(
        dev_pipeline(),
        post_form("/api/v1/product/echo", "foo=1&foo=2&sort=a&sort=b"),
    )
    .await;
    let body = reply.json();
    assert_eq!(body["body"]["foo"], "2");
    assert_eq!(body["body"]["sort"], json!(["a", "b"]));

    let reply = send(
        dev_pipeline(),
        post_json("/api/v1/product/echo", r#"{"foo":[1,2]}"#),
    )
    .await;
    assert_eq!(reply.json()["body"]["foo"], json!([1, 2]));
}

#[tokio::test(flavor = "multi_thread")]
async fn deeply_nested_form_keys_are_cut_off() {
    let form = format!("a{}=1", "[b]".repeat(30_000));
    let reply = send(dev_pipeline(), post_form("/api/v1/product/echo", &form)).await;
    assert_eq!(reply.status, StatusCode::OK);

    let body = reply.json();
    let innermost = &body["body"]["a"]["b"]["b"]["b"]["b"]["b"];
    let remainder = innermost.as_object().expect("literal remainder");
    assert_eq!(remainder.values().collect::<Vec<_>>(), vec!["1"]);
}

#[tokio::test]
async fn operator_keys_never_reach_the_router() {
    let reply = send(
        dev_pipeline(),
        post_json(
            "/api/v1/product/echo?price%5B%24gte%5D=5",
            r#"{"email":{"$gt":""},"password":"hunter2","role.admin":true}"#,
        ),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert_eq!(body["body"], json!({"email": {}, "password": "hunter2"}));
    assert_eq!(body["query"]["price"], json!({}));
}

#[tokio::test]
async fn markup_is_escaped() {
    let reply = send(
        dev_pipeline(),
        post_json(
            "/api/v1/product/echo?q=%3Cimg%3E",
            r#"{"name":"<script>alert(1)</script>"}"#,
        ),
    )
    .await;

    let body = reply.json();
    assert_eq!(body["body"]["name"], "&lt;script>alert(1)&lt;/script>");
    assert_eq!(body["query"]["q"], "&lt;img>");
}

#[tokio::test]
async fn plain_extractors_see_the_sanitized_body() {
    let reply = send(
        dev_pipeline(),
        post_json("/api/v1/product/raw", r#"{"$where": "1", "a": "<b>"}"#),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, Bytes::from_static(br#"{"a":"&lt;b>"}"#));
}

#[tokio::test]
async fn path_params_and_cookies_reach_handlers() {
    let request = Request::builder()
        .uri("/api/v1/product/items/%3Cscript%3E")
        .header(header::COOKIE, "jwt=abc.def; theme=dark")
        .body(Body::empty())
        .expect("valid request");
    let reply = send(dev_pipeline(), request).await;

    let body = reply.json();
    assert_eq!(body["params"]["id"], "&lt;script>");
    assert_eq!(body["cookies"]["jwt"], "abc.def");
    assert_eq!(body["cookies"]["theme"], "dark");
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let reply = send(dev_pipeline(), post_json("/api/v1/product/echo", "{\"name\":")).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = reply.json();
    assert_eq!(body["status"], "fail");
    assert!(
        body["message"]
            .as_str()
            .expect("message")
            .starts_with("Invalid JSON body")
    );
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let config = ServerConfig {
        body_limit_bytes: 16,
        ..fixtures::config(Environment::Development)
    };
    let router = fixtures::pipeline(&config, Arc::new(RecordingBilling::default()));

    let reply = send(
        router,
        post_json("/api/v1/product/echo", &format!("{{\"bio\":\"{}\"}}", "x".repeat(64))),
    )
    .await;

    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.json()["status"], "fail");
}

#[tokio::test]
async fn preflight_is_answered_with_credentials() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/product/echo")
        .header(header::ORIGIN, "https://shop.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .expect("valid request");
    let reply = send(dev_pipeline(), request).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://shop.example"
    );
    assert_eq!(reply.headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn simple_requests_reflect_the_origin() {
    let request = Request::builder()
        .uri("/api/v1/product/echo")
        .header(header::ORIGIN, "https://admin.shop.example")
        .body(Body::empty())
        .expect("valid request");
    let reply = send(dev_pipeline(), request).await;

    assert_eq!(
        reply.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://admin.shop.example"
    );
    assert_eq!(reply.headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn relaxed_security_headers_are_applied() {
    for uri in ["/api/v1/product/echo", "/api/v1/bogus"] {
        let reply = send(dev_pipeline(), get(uri)).await;
        assert_eq!(reply.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff", "{uri}");
        assert_eq!(reply.headers[header::REFERRER_POLICY], "no-referrer", "{uri}");
        assert!(!reply.headers.contains_key(header::CONTENT_SECURITY_POLICY), "{uri}");
        assert!(!reply.headers.contains_key(header::X_FRAME_OPTIONS), "{uri}");
    }
}

#[tokio::test]
async fn operational_errors_from_handlers_are_rendered() {
    let reply = send(dev_pipeline(), get("/api/v1/product/missing")).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(
        reply.json(),
        json!({"status": "fail", "message": "Can't find /api/v1/product/missing on this server!"})
    );
}

#[tokio::test]
async fn framework_rejections_use_the_error_shape() {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/api/v1/product/echo")
        .body(Body::empty())
        .expect("valid request");
    let reply = send(pipeline_for(&fixtures::config(Environment::Production)), request).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(reply.headers.contains_key(header::ALLOW));
    assert_eq!(
        reply.json(),
        json!({"status": "fail", "message": "Method Not Allowed"})
    );
    assert_eq!(reply.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/product/typed")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("not json"))
        .expect("valid request");
    let reply = send(dev_pipeline(), request).await;
    assert_eq!(reply.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = reply.json();
    assert_eq!(body["status"], "fail");
    assert!(
        body["message"]
            .as_str()
            .is_some_and(|message| message.contains("Content-Type")),
        "{body}"
    );
}

#[tokio::test]
async fn development_faults_include_detail() {
    let reply = send(dev_pipeline(), get("/api/v1/product/explode")).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = reply.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "product cache was not initialised");
    assert!(body["stack"].is_string());
}

#[tokio::test]
async fn production_faults_hide_detail() {
    let config = fixtures::config(Environment::Production);
    let reply = send(pipeline_for(&config), get("/api/v1/product/explode")).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json(),
        json!({"status": "error", "message": GENERIC_FAULT_MESSAGE})
    );
}

#[tokio::test]
async fn handler_panics_become_500() {
    let reply = send(dev_pipeline(), get("/api/v1/product/panic")).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json()["message"],
        "request handler panicked: product image index out of range"
    );
}

#[tokio::test(start_paused = true)]
async fn slow_requests_time_out() {
    let config = ServerConfig {
        timeout_seconds: TimeoutSeconds::new(1).expect("valid timeout"),
        ..fixtures::config(Environment::Development)
    };
    let router = fixtures::pipeline(&config, Arc::new(RecordingBilling::default()));

    let reply = send(router, get("/api/v1/product/stall")).await;

    assert_eq!(reply.status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(
        reply.json(),
        json!({"status": "fail", "message": "request did not complete within 1000 ms"})
    );
}

#[tokio::test]
async fn unconfigured_resources_are_unavailable() {
    let config = fixtures::config(Environment::Development);
    let router = Pipeline::builder(&config, Arc::new(RecordingBilling::default()))
        .routes(RouteTable::placeholders())
        .build()
        .into_router();

    let reply = send(router, get("/api/v1/users/me")).await;

    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        reply.json(),
        json!({"status": "error", "message": "the users service is not available"})
    );
}
