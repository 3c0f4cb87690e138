//! Integration tests for the graphpush-graphql crate: the demo schema driven
//! through the request router.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use {
    graphpush_graphql::{DemoEngine, EventBus, SessionContext, demo_engine},
    graphpush_server::{InboundEvent, LocalConnections, RequestOutcome, Router},
    serde_json::{Value, json},
    tokio::{
        sync::mpsc::UnboundedReceiver,
        time::{Duration, timeout},
    },
};

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    router: Arc<Router<DemoEngine, SessionContext>>,
    rx: UnboundedReceiver<String>,
}

fn harness() -> Harness {
    let conns = Arc::new(LocalConnections::new());
    let rx = conns.open("conn-1");
    let router = Router::new(demo_engine(EventBus::default()), conns)
        .with_context_builder(SessionContext);
    Harness {
        router: Arc::new(router),
        rx,
    }
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        frames.push(serde_json::from_str(&raw).unwrap());
    }
    frames
}

async fn recv(rx: &mut UnboundedReceiver<String>) -> Value {
    let raw = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame within timeout")
        .expect("connection open");
    serde_json::from_str(&raw).unwrap()
}

// ── Subscriptions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn counter_subscription_emits_expected_frames() {
    let mut h = harness();
    let body = json!({ "id": "x", "query": "subscription { counter }", "variables": {} });

    let response = h
        .router
        .handle(InboundEvent::frame("conn-1", body.to_string()))
        .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(drain(&mut h.rx), vec![
        json!({ "id": "x", "data": { "counter": 1 }, "errors": [], "done": false }),
        json!({ "id": "x", "data": { "counter": 2 }, "errors": [], "done": false }),
        json!({ "id": "x", "errors": [], "done": true }),
    ]);
}

#[tokio::test]
async fn failing_counter_ends_with_one_error_frame() {
    let mut h = harness();
    let body = json!({
        "id": "f",
        "query": "subscription { counter(from: 1, to: 10, intervalMs: 2, failAt: 3) }",
    });

    h.router
        .handle(InboundEvent::frame("conn-1", body.to_string()))
        .await;

    let frames = drain(&mut h.rx);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0]["data"]["counter"], 1);
    assert_eq!(frames[1]["data"]["counter"], 2);
    assert_eq!(frames[2]["done"], true);
    assert_eq!(frames[2]["errors"][0]["message"], "counter failed at 3");
    assert_eq!(frames.iter().filter(|f| f["done"] == true).count(), 1);
}

#[tokio::test]
async fn published_events_reach_matching_subscribers() {
    let mut h = harness();

    let sub = tokio::spawn({
        let router = Arc::clone(&h.router);
        let body = json!({
            "id": "ev",
            "query": "subscription { events(topic: \"news\") { topic payload } }",
        });
        async move {
            router
                .handle(InboundEvent::frame("conn-1", body.to_string()))
                .await
        }
    });
    timeout(Duration::from_secs(2), async {
        while !h.router.registry().is_live("conn-1", "ev") {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    // The subscriber is registered before the engine stream exists, so retry
    // until it is listening.
    let publish = |topic: &str| {
        json!({
            "query": "mutation ($t: String!, $p: JSON!) { publish(topic: $t, payload: $p) }",
            "variables": { "t": topic, "p": { "headline": "hi" } },
        })
        .to_string()
    };
    timeout(Duration::from_secs(2), async {
        loop {
            let response = h.router.handle(InboundEvent::http(publish("news"))).await;
            let body: Value = serde_json::from_str(&response.body).unwrap();
            if body["data"]["publish"] == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let frame = recv(&mut h.rx).await;
    assert_eq!(frame["id"], "ev");
    assert_eq!(frame["data"]["events"]["topic"], "news");
    assert_eq!(frame["data"]["events"]["payload"]["headline"], "hi");

    // Other topics are filtered out.
    h.router.handle(InboundEvent::http(publish("sports"))).await;

    let cancel = h
        .router
        .handle(InboundEvent::frame("conn-1", r#"{"type":"cancel","id":"ev"}"#))
        .await;
    assert_eq!(cancel.outcome, RequestOutcome::Cancelled { live: true });

    timeout(Duration::from_secs(2), sub).await.unwrap().unwrap();
    assert_eq!(drain(&mut h.rx), vec![json!({ "id": "ev", "errors": [], "done": true })]);
}

// ── Single results ───────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_field_is_rejected_without_data() {
    let mut h = harness();
    let response = h
        .router
        .handle(InboundEvent::frame("conn-1", r#"{"id":"v","query":"{ invalidField }"}"#))
        .await;

    assert_eq!(response.status_code, 400);
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert!(body.get("data").is_none());
    assert!(!body["errors"].as_array().unwrap().is_empty());
    assert_eq!(body["errors"][0]["extensions"]["code"], "VALIDATION_FAILED");

    let frames = drain(&mut h.rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["id"], "v");
    assert_eq!(frames[0]["done"], true);
}

#[tokio::test]
async fn invalid_mutation_never_runs_its_resolver() {
    let bus = EventBus::default();
    let mut listener = bus.subscribe();
    let router = Router::new(demo_engine(bus), Arc::new(LocalConnections::new()));

    let response = router
        .handle(InboundEvent::http(
            r#"{"query":"mutation { publish(topic: \"t\", payload: 1) invalidField }"}"#,
        ))
        .await;

    assert_eq!(response.status_code, 400);
    assert!(listener.try_recv().is_err());
}

#[tokio::test]
async fn http_query_returns_data_and_session_cookie() {
    let h = harness();
    let response = h
        .router
        .handle(InboundEvent::http(r#"{"query":"{ hello session }"}"#))
        .await;

    assert_eq!(response.status_code, 200);
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["data"]["hello"], "Hello, world!");
    let session = body["data"]["session"].as_str().unwrap();

    let (name, value) = response.headers.iter().next().unwrap();
    assert_eq!(name, "set-cookie");
    assert!(value.starts_with(&format!("session={session};")));
}

#[tokio::test]
async fn session_cookie_flows_into_resolvers() {
    let h = harness();
    let event = InboundEvent::http(r#"{"query":"{ session }"}"#)
        .with_header("Cookie", "theme=dark; session=abc");
    let response = h.router.handle(event).await;

    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["data"]["session"], "abc");
    assert!(response.headers.is_empty());
}

#[tokio::test]
async fn operation_name_selects_among_several() {
    let h = harness();
    let body = json!({
        "query": "query A { hello } query B { hello(name: \"b\") }",
        "operationName": "B",
    });
    let response = h.router.handle(InboundEvent::http(body.to_string())).await;
    let parsed: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(parsed["data"]["hello"], "Hello, b!");

    let missing = json!({ "query": "query A { hello } query B { hello }", "operationName": "C" });
    let response = h
        .router
        .handle(InboundEvent::http(missing.to_string()))
        .await;
    assert_eq!(response.status_code, 400);
    assert!(response.body.contains("Operation 'C' not found"));
}
