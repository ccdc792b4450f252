// tests/server.rs
//! End-to-end exchanges between an interception agent and a host server
//! wired over a linked context pair

use bytes::Bytes;
use mirage::channel::Body;
use mirage::codec::StatusMessage;
use mirage::context::LinkedContext;
use mirage::lifecycle::InProcessLifecycle;
use mirage::server::Server;
use mirage::utils::config::{FallbackPolicy, InterceptConfig};
use mirage::{InterceptionAgent, MirageError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn wire_up(config: InterceptConfig) -> (InterceptionAgent, Server) {
    let (page, host) = LinkedContext::pair();
    let agent = InterceptionAgent::single(page, config, None).unwrap();
    let lifecycle = Arc::new(InProcessLifecycle::new(host.clone()));
    let server = Server::new(host, lifecycle);
    (agent, server)
}

fn get(url: &str) -> hyper::Request<Body> {
    hyper::Request::builder()
        .uri(url)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn listen_fetch_close_round_trip() {
    let (agent, server) = wire_up(InterceptConfig::default());
    server.on_request(|_request, response| async move {
        response.end(Some(Bytes::from_static(b"hello world"))).unwrap();
    });

    server.listen(443, Some("example.com")).await.unwrap();
    assert!(server.listening());
    assert!(agent.armed());
    assert_eq!(server.address().to_string(), "example.com:443");
    assert_eq!(agent.address(), Some(("example.com".to_string(), 443)));

    let response = agent.handle(get("https://example.com/")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.into_body().collect().await,
        Bytes::from_static(b"hello world")
    );

    server.close().await.unwrap();
    assert!(!server.listening());
    assert!(!agent.armed());

    // Disarmed, the same call bypasses toward the real network — which this
    // test environment does not have.
    let result = agent.handle(get("https://example.com/")).await;
    assert!(matches!(result, Err(MirageError::NetworkUnavailable)));
}

#[tokio::test]
async fn post_json_round_trip() {
    let (agent, server) = wire_up(InterceptConfig::default());

    let seen_body: Arc<Mutex<Option<Bytes>>> = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&seen_body);
    server.on_request(move |mut request, response| {
        let seen = Arc::clone(&seen);
        async move {
            let body = request.read_to_end().await;
            *seen.lock() = Some(body);
            response
                .write_head(200, None, Some(&[("Content-Type", "application/json")]))
                .unwrap();
            response
                .end(Some(Bytes::from_static(b"{\"yo\":\"nice\"}")))
                .unwrap();
        }
    });
    server.listen(443, Some("example.com")).await.unwrap();

    let request = hyper::Request::builder()
        .method("POST")
        .uri("https://example.com/fake.html")
        .header("Content-Type", "application/json")
        .body(Body::from_bytes(Bytes::from_static(
            b"{\"answer\":\"browser\"}",
        )))
        .unwrap();

    let response = agent.handle(request).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );

    let decoded: serde_json::Value =
        serde_json::from_slice(&response.into_body().collect().await).unwrap();
    assert_eq!(decoded, serde_json::json!({ "yo": "nice" }));

    assert_eq!(
        seen_body.lock().take().unwrap(),
        Bytes::from_static(b"{\"answer\":\"browser\"}")
    );

    server.close().await.unwrap();
}

#[tokio::test]
async fn default_response_without_handler_is_teapot() {
    let (agent, server) = wire_up(InterceptConfig::default());
    server.listen(443, Some("example.com")).await.unwrap();

    let response = agent.handle(get("https://example.com/")).await.unwrap();
    assert_eq!(response.status(), 418);
    assert_eq!(
        response.extensions().get::<StatusMessage>().unwrap().0,
        "I'm a teapot"
    );

    server.close().await.unwrap();
}

#[tokio::test]
async fn double_listen_is_a_recoverable_error() {
    let (agent, server) = wire_up(InterceptConfig::default());
    server.listen(443, Some("example.com")).await.unwrap();

    let result = server.listen(8080, Some("other.host")).await;
    assert!(matches!(result, Err(MirageError::AlreadyListening)));

    // Still serving on the original address.
    assert!(server.listening());
    assert_eq!(server.address().to_string(), "example.com:443");
    let response = agent.handle(get("https://example.com/")).await.unwrap();
    assert_eq!(response.status(), 418);

    server.close().await.unwrap();
}

#[tokio::test]
async fn connection_observer_sees_each_socket() {
    let (agent, server) = wire_up(InterceptConfig::default());

    let connections = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&connections);
    server.on_connection(move |socket| {
        assert_eq!(socket.remote_address(), "example.com");
        assert_eq!(socket.remote_port(), 443);
        seen.fetch_add(1, Ordering::SeqCst);
    });
    server.on_request(|_request, response| async move {
        response.end(None).unwrap();
    });
    server.listen(443, Some("example.com")).await.unwrap();

    for _ in 0..3 {
        agent.handle(get("https://example.com/")).await.unwrap();
    }
    assert_eq!(connections.load(Ordering::SeqCst), 3);

    server.close().await.unwrap();
}

#[tokio::test]
async fn concurrent_requests_keep_their_own_responses() {
    let (agent, server) = wire_up(InterceptConfig::default());

    server.on_request(|request, response| async move {
        // Answer the slow path later than the fast one so completions
        // interleave with issue order.
        let delay = if request.url().contains("slow") { 80 } else { 5 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        response
            .end(Some(Bytes::from(request.url().to_string())))
            .unwrap();
    });
    server.listen(443, Some("example.com")).await.unwrap();

    let agent = Arc::new(agent);
    let slow = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.handle(get("https://example.com/slow")).await })
    };
    let fast = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.handle(get("https://example.com/fast")).await })
    };

    let slow = slow.await.unwrap().unwrap();
    let fast = fast.await.unwrap().unwrap();
    assert_eq!(slow.into_body().collect().await, Bytes::from_static(b"/slow"));
    assert_eq!(fast.into_body().collect().await, Bytes::from_static(b"/fast"));
    assert_eq!(agent.pending_requests(), 0);

    server.close().await.unwrap();
}

#[tokio::test]
async fn timeout_returns_gateway_timeout_and_evicts() {
    let (page, host) = LinkedContext::pair();
    let agent = InterceptionAgent::single(
        page,
        InterceptConfig {
            proxy_timeout_ms: 60,
            fallback: FallbackPolicy::GatewayTimeout,
            ..InterceptConfig::default()
        },
        None,
    )
    .unwrap();
    let lifecycle = Arc::new(InProcessLifecycle::new(host.clone()));
    let server = Server::new(host, lifecycle);

    // A handler that never answers within the budget.
    server.on_request(|_request, response| async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = response.end(None);
    });
    server.listen(443, Some("example.com")).await.unwrap();

    let response = agent.handle(get("https://example.com/")).await.unwrap();
    assert_eq!(response.status(), 504);
    assert_eq!(agent.pending_requests(), 0);

    // The late answer arrives after eviction and is dropped, leaving no
    // pending state behind.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(agent.pending_requests(), 0);

    server.close().await.unwrap();
}

#[tokio::test]
async fn readiness_probe_is_answered_by_the_agent() {
    let (agent, server) = wire_up(InterceptConfig::default());
    server.listen(443, Some("example.com")).await.unwrap();

    let response = agent
        .handle(get("https://example.com/__status__"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.into_body().collect().await, Bytes::from_static(b"OK"));

    server.close().await.unwrap();
}

#[tokio::test]
async fn handler_that_never_ends_lets_the_caller_time_out() {
    let (page, host) = LinkedContext::pair();
    let agent = InterceptionAgent::single(
        page,
        InterceptConfig {
            proxy_timeout_ms: 60,
            fallback: FallbackPolicy::GatewayTimeout,
            ..InterceptConfig::default()
        },
        None,
    )
    .unwrap();
    let lifecycle = Arc::new(InProcessLifecycle::new(host.clone()));
    let server = Server::new(host, lifecycle);

    // The handler drops the response without ending it.
    server.on_request(|_request, _response| async move {});
    server.listen(443, Some("example.com")).await.unwrap();

    let response = agent.handle(get("https://example.com/")).await.unwrap();
    assert_eq!(response.status(), 504);

    server.close().await.unwrap();
}
