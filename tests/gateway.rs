//! End-to-end tests: a running gateway over TCP in front of mock backends.

use std::fs;
use std::time::Duration;

use gatehouse::config::{RateLimitConfig, ServiceDefinition};

mod common;

#[tokio::test]
async fn upstream_errors_are_replaced_unless_forwarded() {
    let backend = common::local_addr();
    common::start_programmable_backend(backend, |_head| async {
        (500, "secret stack trace".to_string())
    })
    .await;

    let mut config = common::gateway_config(common::free_port());
    config.services.insert(
        "masked".into(),
        ServiceDefinition::reverse_proxy("/masked", format!("http://{backend}")),
    );
    config.services.insert(
        "raw".into(),
        ServiceDefinition {
            forward_errors: true,
            ..ServiceDefinition::reverse_proxy("/raw", format!("http://{backend}"))
        },
    );
    let gateway = common::TestGateway::start(config).await;
    let client = common::client();

    let masked = client.get(gateway.url("/masked/x")).send().await.unwrap();
    assert_eq!(masked.status(), 500);
    assert!(masked.headers()["content-type"].to_str().unwrap().starts_with("text/html"));
    let body = masked.text().await.unwrap();
    assert!(body.contains("Internal Server Error"));
    assert!(!body.contains("secret stack trace"));

    let raw = client.get(gateway.url("/raw/x")).send().await.unwrap();
    assert_eq!(raw.status(), 500);
    assert_eq!(raw.text().await.unwrap(), "secret stack trace");

    gateway.stop().await;
}

#[tokio::test]
async fn proxied_request_is_rewritten() {
    let backend = common::local_addr();
    common::start_programmable_backend(backend, |head| async move { (200, head) }).await;

    let mut config = common::gateway_config(common::free_port());
    config.services.insert(
        "api".into(),
        ServiceDefinition::reverse_proxy("/api", format!("http://{backend}/v1?key=abc")),
    );
    let gateway = common::TestGateway::start(config).await;

    let response = common::client()
        .get(gateway.url("/api/users?page=2"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "trace-me");

    let head = response.text().await.unwrap().to_ascii_lowercase();
    assert!(head.starts_with("get /v1/api/users?key=abc&page=2 http/1.1"), "{head}");
    assert!(head.contains(&format!("host: {backend}")));
    assert!(head.contains("x-forwarded-for: 127.0.0.1"));
    assert!(head.contains("x-forwarded-proto: http"));
    assert!(head.contains("via: http/1.1 gatehouse"));
    assert!(head.contains("x-request-id: trace-me"));

    gateway.stop().await;
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let dead = common::local_addr();
    let mut config = common::gateway_config(common::free_port());
    config.services.insert(
        "dead".into(),
        ServiceDefinition::reverse_proxy("/", format!("http://{dead}")),
    );
    let gateway = common::TestGateway::start(config).await;

    let response = common::client().get(gateway.url("/anything")).send().await.unwrap();
    assert_eq!(response.status(), 502);
    assert!(response.text().await.unwrap().contains("Bad Gateway"));

    gateway.stop().await;
}

#[tokio::test]
async fn rate_limit_rejects_fourth_request() {
    let backend = common::local_addr();
    common::start_mock_backend(backend, "ok").await;

    let mut config = common::gateway_config(common::free_port());
    config.rate_limiting = Some(RateLimitConfig {
        max_requests: 3,
        refill_interval_ms: 60_000,
    });
    config.services.insert(
        "api".into(),
        ServiceDefinition::reverse_proxy("/", format!("http://{backend}")),
    );
    let gateway = common::TestGateway::start(config).await;
    let client = common::client();

    for _ in 0..3 {
        let response = client.get(gateway.url("/")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }
    let response = client.get(gateway.url("/")).send().await.unwrap();
    assert_eq!(response.status(), 429);
    assert!(response.text().await.unwrap().contains("rate limited"));

    gateway.stop().await;
}

#[tokio::test]
async fn refill_tick_admits_again() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();

    let mut config = common::gateway_config(common::free_port());
    config.rate_limiting = Some(RateLimitConfig {
        max_requests: 1,
        refill_interval_ms: 200,
    });
    config
        .services
        .insert("site".into(), ServiceDefinition::static_files("/", dir.path()));
    let gateway = common::TestGateway::start(config).await;
    let client = common::client();

    assert_eq!(client.get(gateway.url("/a.txt")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(gateway.url("/a.txt")).send().await.unwrap().status(), 429);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.get(gateway.url("/a.txt")).send().await.unwrap().status(), 200);

    gateway.stop().await;
}

#[tokio::test]
async fn deny_and_allow_lists_apply_to_source_address() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    let port = common::free_port();
    let site = ServiceDefinition::static_files("/", dir.path());

    let mut denied = common::gateway_config(port);
    denied.blacklist = vec!["127.0.0.1".into()];
    denied.whitelist = vec!["127.0.0.1".into()];
    denied.services.insert("site".into(), site.clone());
    let mut gateway = common::TestGateway::start(denied).await;
    let client = common::client();

    let response = client.get(gateway.url("/a.txt")).send().await.unwrap();
    assert_eq!(response.status(), 403);
    assert!(response.text().await.unwrap().contains("Forbidden"));

    let mut stranger_only = common::gateway_config(port);
    stranger_only.whitelist = vec!["10.9.9.9".into()];
    stranger_only.services.insert("site".into(), site.clone());
    let generation = gateway.generation();
    gateway.push(stranger_only);
    gateway.wait_for_generation(generation).await;
    assert_eq!(client.get(gateway.url("/a.txt")).send().await.unwrap().status(), 403);

    let mut open = common::gateway_config(port);
    open.whitelist = vec!["127.0.0.1".into()];
    open.services.insert("site".into(), site);
    let generation = gateway.generation();
    gateway.push(open);
    gateway.wait_for_generation(generation).await;
    assert_eq!(client.get(gateway.url("/a.txt")).send().await.unwrap().status(), 200);

    gateway.stop().await;
}

#[tokio::test]
async fn static_traversal_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("public");
    fs::create_dir(&root).unwrap();
    fs::write(dir.path().join("secret.txt"), "top secret").unwrap();

    let mut config = common::gateway_config(common::free_port());
    config
        .services
        .insert("files".into(), ServiceDefinition::static_files("/files", &root));
    let gateway = common::TestGateway::start(config).await;

    for path in ["/files/../secret.txt", "/files/%2e%2e/secret.txt", "/files/../../etc/passwd"] {
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        let response = common::raw_request(gateway.addr, &request).await;
        assert!(response.starts_with("HTTP/1.1 404"), "{path}: {response}");
        assert!(!response.contains("top secret"));
        assert!(!response.contains("root:"));
    }

    gateway.stop().await;
}

#[tokio::test]
async fn reload_lets_in_flight_request_finish() {
    let backend = common::local_addr();
    common::start_programmable_backend(backend, |head| async move {
        if head.starts_with("GET /slow") {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            (200, "slow done".to_string())
        } else {
            (200, "fast".to_string())
        }
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("fresh.txt"), "fresh").unwrap();

    let port = common::free_port();
    let mut config = common::gateway_config(port);
    config.services.insert(
        "api".into(),
        ServiceDefinition::reverse_proxy("/", format!("http://{backend}")),
    );
    let mut gateway = common::TestGateway::start(config.clone()).await;
    let client = common::client();

    let slow_url = gateway.url("/slow");
    let in_flight = tokio::spawn({
        let client = client.clone();
        async move { client.get(slow_url).send().await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let generation = gateway.generation();
    config
        .services
        .insert("fresh".into(), ServiceDefinition::static_files("/fresh", dir.path()));
    gateway.push(config);

    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "slow done");

    gateway.wait_for_generation(generation).await;
    let response = client.get(gateway.url("/fresh/fresh.txt")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "fresh");

    gateway.stop().await;
}

#[tokio::test]
async fn broken_service_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();

    let mut config = common::gateway_config(common::free_port());
    config
        .services
        .insert("site".into(), ServiceDefinition::static_files("/site", dir.path()));
    config.services.insert(
        "broken".into(),
        ServiceDefinition::static_files("/broken", dir.path().join("missing")),
    );
    let gateway = common::TestGateway::start(config).await;
    let client = common::client();

    assert_eq!(client.get(gateway.url("/site/a.txt")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(gateway.url("/broken/a.txt")).send().await.unwrap().status(), 404);

    gateway.stop().await;
}
