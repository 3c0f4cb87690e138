#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests: real sockets, real gateway, real client.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    graphpush_client::{Client, HttpClient, SubscriptionItem},
    graphpush_config::GraphpushConfig,
    graphpush_gateway::{GatewayState, build_gateway_app, demo_state},
    serde_json::{Value, json},
    tokio::{net::TcpListener, time::timeout},
    tokio_tungstenite::{connect_async, tungstenite::Message},
};

/// Spin up a test gateway on an ephemeral port, return the bound address.
async fn start_test_server(config: GraphpushConfig) -> (SocketAddr, Arc<GatewayState>) {
    let state = demo_state(&config);
    let app = build_gateway_app(Arc::clone(&state), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (addr, state)
}

async fn next_frame(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within timeout")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn health_endpoint_returns_json() {
    let (addr, _state) = start_test_server(GraphpushConfig::default()).await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["connections"], 0);
}

#[tokio::test]
async fn raw_frames_for_a_counter_subscription() {
    let (addr, _state) = start_test_server(GraphpushConfig::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let start = json!({ "id": "x", "query": "subscription { counter }", "variables": {} });
    ws.send(Message::Text(start.to_string().into())).await.unwrap();

    assert_eq!(
        next_frame(&mut ws).await,
        json!({ "id": "x", "data": { "counter": 1 }, "errors": [], "done": false })
    );
    assert_eq!(
        next_frame(&mut ws).await,
        json!({ "id": "x", "data": { "counter": 2 }, "errors": [], "done": false })
    );
    assert_eq!(
        next_frame(&mut ws).await,
        json!({ "id": "x", "errors": [], "done": true })
    );

    ws.close(None).await.ok();
}

#[tokio::test]
async fn client_multiplexes_over_one_socket() {
    let (addr, state) = start_test_server(GraphpushConfig::default()).await;
    let client = Client::websocket(format!("ws://{addr}/ws"));

    let mut a = client
        .subscribe("subscription { counter(from: 1, to: 4, intervalMs: 2) }", None)
        .await
        .unwrap();
    let mut b = client
        .subscribe("subscription { counter(from: 10, to: 12, intervalMs: 3) }", None)
        .await
        .unwrap();

    let collect = |items: Vec<SubscriptionItem>| -> Vec<i64> {
        items
            .into_iter()
            .map(|item| item.unwrap()["counter"].as_i64().unwrap())
            .collect()
    };
    let (items_a, items_b) = timeout(
        Duration::from_secs(5),
        futures::future::join((&mut a).collect::<Vec<_>>(), (&mut b).collect::<Vec<_>>()),
    )
    .await
    .unwrap();

    assert_eq!(collect(items_a), vec![1, 2, 3, 4]);
    assert_eq!(collect(items_b), vec![10, 11, 12]);
    assert_eq!(state.client_count(), 1);
}

#[tokio::test]
async fn closing_the_socket_releases_the_connection() {
    let (addr, state) = start_test_server(GraphpushConfig::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let start = json!({ "id": "ev", "query": "subscription { events { topic } }" });
    ws.send(Message::Text(start.to_string().into())).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while state.client_count() != 1 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    ws.close(None).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while state.client_count() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_sent_right_after_start_ends_with_one_terminal_frame() {
    let (addr, _state) = start_test_server(GraphpushConfig::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    const ROUNDS: usize = 50;
    for n in 0..ROUNDS {
        let id = format!("ev-{n}");
        let start = json!({ "id": id, "query": "subscription { events { topic } }" });
        let cancel = json!({ "type": "cancel", "id": id });
        ws.send(Message::Text(start.to_string().into())).await.unwrap();
        ws.send(Message::Text(cancel.to_string().into())).await.unwrap();
    }

    let mut done: HashMap<String, usize> = HashMap::new();
    while done.len() < ROUNDS {
        let frame = next_frame(&mut ws).await;
        assert_eq!(frame["done"], true, "unexpected frame {frame}");
        assert_eq!(frame["errors"], json!([]));
        *done
            .entry(frame["id"].as_str().unwrap().to_string())
            .or_default() += 1;
    }
    assert!(done.values().all(|&count| count == 1));

    // Nothing else follows.
    assert!(
        timeout(Duration::from_millis(100), ws.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn oversized_frame_is_rejected_and_connection_survives() {
    let mut config = GraphpushConfig::default();
    config.limits.max_payload_bytes = 256;
    let (addr, _state) = start_test_server(config).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let padding = "a".repeat(300);
    let big = json!({ "id": "big", "query": format!("{{ hello(name: \"{padding}\") }}") });
    ws.send(Message::Text(big.to_string().into())).await.unwrap();

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["done"], true);
    assert_eq!(frame["errors"][0]["extensions"]["code"], "INVALID_REQUEST");

    let small = json!({ "id": "ok", "query": "{ hello }" });
    ws.send(Message::Text(small.to_string().into())).await.unwrap();
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["id"], "ok");
    assert_eq!(frame["data"]["hello"], "Hello, world!");
}

#[tokio::test]
async fn http_query_keeps_its_session_cookie() {
    let (addr, _state) = start_test_server(GraphpushConfig::default()).await;
    let http = HttpClient::new(format!("http://{addr}/graphql")).unwrap();

    let first = http.query("{ session }", None).await.unwrap();
    let session = first["session"].as_str().unwrap().to_string();

    let second = http.query("{ session }", None).await.unwrap();
    assert_eq!(second["session"], session.as_str());
}

#[tokio::test]
async fn http_validation_failure_is_a_bad_request() {
    let (addr, _state) = start_test_server(GraphpushConfig::default()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/graphql"))
        .body(r#"{"query":"{ invalidField }"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["errors"].as_array().unwrap().is_empty());

    let err = HttpClient::new(format!("http://{addr}/graphql"))
        .unwrap()
        .query("{ invalidField }", None)
        .await
        .unwrap_err();
    assert!(!err.graphql_errors().is_empty());
}
