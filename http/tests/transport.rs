//! `ReqwestTransport` against a local mock server.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use courier_core::environment::{Cancellable, CompletionListener, Transport};
use courier_core::error::TransportError;
use courier_core::event::ExecutionEvent;
use courier_core::request::{Body, HttpMethod, Param, RequestSpec};
use courier_core::response::TransportResult;
use courier_core::wire::{HeaderMap, WireRequest};
use courier_http::{HttpTransportConfig, ReqwestTransport};
use courier_runtime::ExecutionRegistry;
use courier_testing::{TestEnvironment, fixtures, init_tracing};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn wire(method: HttpMethod, url: &str) -> WireRequest {
    WireRequest {
        url: Url::parse(url).unwrap(),
        method,
        headers: HeaderMap::new(),
        body: Vec::new(),
        content_type: None,
    }
}

fn transport() -> ReqwestTransport {
    ReqwestTransport::new(HttpTransportConfig::default()).unwrap()
}

async fn exchange(transport: &ReqwestTransport, request: WireRequest) -> TransportResult {
    let (listener, receiver) = CompletionListener::channel();
    let _handle = transport.send(request, listener);
    tokio::time::timeout(Duration::from_secs(5), receiver)
        .await
        .expect("transport should answer")
        .expect("listener should be completed")
}

#[tokio::test]
async fn get_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .insert_header("x-trace", "abc"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = exchange(
        &transport(),
        wire(HttpMethod::get(), &format!("{}/get", server.uri())),
    )
    .await
    .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"{}");
    assert!(
        response
            .headers
            .iter()
            .any(|(key, value)| key == "x-trace" && value == "abc")
    );
    let timing = response.timing.expect("transport measures timing");
    assert!(timing.total >= timing.request.unwrap_or_default());
}

#[tokio::test]
async fn post_sends_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(header("x-api-key", "secret"))
        .and(body_string(r#"{"name":"widget"}"#))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = wire(HttpMethod::post(), &format!("{}/items", server.uri()));
    request.headers.insert("X-Api-Key", "secret");
    request.body = br#"{"name":"widget"}"#.to_vec();
    request.content_type = Some("application/json".to_string());

    let response = exchange(&transport(), request).await.unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn error_status_is_a_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let response = exchange(&transport(), wire(HttpMethod::get(), &server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status, 503);
    assert_eq!(response.body, b"down");
}

#[tokio::test]
async fn configured_user_agent_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "courier-test"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport =
        ReqwestTransport::new(HttpTransportConfig::default().with_user_agent("courier-test"))
            .unwrap();
    let response = exchange(&transport, wire(HttpMethod::get(), &server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn redirects_can_be_left_unfollowed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;
    let url = format!("{}/old", server.uri());

    let following = exchange(&transport(), wire(HttpMethod::get(), &url))
        .await
        .unwrap();
    assert_eq!(following.status, 200);
    assert_eq!(following.body, b"moved");

    let manual = ReqwestTransport::new(HttpTransportConfig::default().with_follow_redirects(false))
        .unwrap();
    let response = exchange(&manual, wire(HttpMethod::get(), &url)).await.unwrap();
    assert_eq!(response.status, 302);
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(
        HttpTransportConfig::default().with_timeout(Duration::from_millis(100)),
    )
    .unwrap();
    let result = exchange(&transport, wire(HttpMethod::get(), &server.uri())).await;
    assert_eq!(result, Err(TransportError::Timeout));
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    let result = exchange(&transport(), wire(HttpMethod::get(), "http://127.0.0.1:1/")).await;
    assert!(matches!(result, Err(TransportError::Network(_))));
}

#[tokio::test]
async fn cancelling_drops_the_listener() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let (listener, receiver) = CompletionListener::channel();
    let handle = transport().send(wire(HttpMethod::get(), &server.uri()), listener);
    handle.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(1), receiver)
        .await
        .expect("cancellation should be prompt");
    assert!(outcome.is_err());
}

#[tokio::test]
async fn engine_round_trip_over_http() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get"))
        .and(query_param("q", "rust lang"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .append_header("set-cookie", "session=abc; Path=/; HttpOnly")
                .append_header("set-cookie", "theme=dark"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestEnvironment::new();
    let environment = harness
        .environment()
        .with_transport(Arc::new(transport()));
    let registry = ExecutionRegistry::new(environment);
    let spec = fixtures::get_request("r1", &format!("{}/get", server.uri()))
        .with_header(Param::new("Accept", "application/json"))
        .with_param(Param::new("q", "rust lang"));

    let mut started = registry.start(spec).await;
    let mut response = None;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_secs(5), started.events.recv()).await
    {
        if let ExecutionEvent::ResponseReceived { record, .. } = event {
            response = Some(record);
            break;
        }
    }

    let record = response.expect("response should be delivered");
    assert!(record.success);
    assert_eq!(record.status_code, 200);
    assert_eq!(record.size, 2);
    assert_eq!(record.cookies.len(), 2);
    assert_eq!(record.cookies[0].name, "session");
    assert!(record.cookies[0].http_only);
    assert_eq!(harness.history.len(), 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn engine_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"id":7}"#))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestEnvironment::new();
    let registry = ExecutionRegistry::new(
        harness
            .environment()
            .with_transport(Arc::new(transport())),
    );
    let spec = RequestSpec::new(
        "r1",
        fixtures::WORKSPACE,
        HttpMethod::post(),
        format!("{}/items", server.uri()),
    )
    .with_body(Body::Json(r#"{"id":7}"#.to_string()));

    let started = registry.start(spec).await;
    started
        .manager
        .wait_for_terminal(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(started.manager.response().await.unwrap().status_code, 201);
}
