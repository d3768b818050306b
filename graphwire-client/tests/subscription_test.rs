//! Subscription tests against an in-process graphql-ws server

use futures::{SinkExt, StreamExt};
use graphwire_client::*;
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

type ServerStream = WebSocketStream<TcpStream>;

fn echo_protocol(
    request: &Request,
    mut response: Response,
) -> std::result::Result<Response, ErrorResponse> {
    if let Some(protocol) = request.headers().get("sec-websocket-protocol") {
        response
            .headers_mut()
            .insert("sec-websocket-protocol", protocol.clone());
    }
    Ok(response)
}

/// Accept one websocket connection and hand it to `handler`.
async fn serve<F, Fut>(handler: F) -> SocketAddr
where
    F: FnOnce(ServerStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = accept_hdr_async(tcp, echo_protocol).await.unwrap();
        handler(ws).await;
    });
    addr
}

async fn recv(ws: &mut ServerStream) -> Option<Value> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn send(ws: &mut ServerStream, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn acknowledge(ws: &mut ServerStream) -> Value {
    let init = recv(ws).await.unwrap();
    send(ws, json!({"type": "connection_ack"})).await;
    init
}

/// Read frames until the client terminates, then close.
async fn drain_until_terminate(ws: &mut ServerStream) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = recv(ws).await {
        let done = frame["type"] == "connection_terminate";
        frames.push(frame);
        if done {
            break;
        }
    }
    let _ = ws.close(None).await;
    frames
}

async fn recv_until(ws: &mut ServerStream, kind: &str) -> Option<Value> {
    while let Some(frame) = recv(ws).await {
        if frame["type"] == kind {
            return Some(frame);
        }
    }
    None
}

async fn connect(addr: SocketAddr) -> SubscriptionClient {
    SubscriptionClient::connect(&format!("ws://{addr}"), SubscriptionConfig::default())
        .await
        .unwrap()
}

async fn next(subscription: &mut Subscription) -> Option<SubscriptionPayload> {
    timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("subscription stalled")
}

#[tokio::test]
async fn test_connection_error_fails_connect() {
    let addr = serve(|mut ws| async move {
        recv(&mut ws).await;
        send(
            &mut ws,
            json!({"type": "connection_error", "payload": {"reason": "bad token"}}),
        )
        .await;
        let _ = ws.close(None).await;
    })
    .await;

    let err = SubscriptionClient::connect(&format!("ws://{addr}"), SubscriptionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphQLError::Handshake(_)));
    assert!(err.to_string().contains("bad token"));
}

#[tokio::test]
async fn test_unexpected_first_frame_is_not_acknowledged() {
    let addr = serve(|mut ws| async move {
        recv(&mut ws).await;
        send(&mut ws, json!({"type": "ka"})).await;
        let _ = ws.close(None).await;
    })
    .await;

    let err = SubscriptionClient::connect(&format!("ws://{addr}"), SubscriptionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphQLError::NotAcknowledged));
}

#[tokio::test]
async fn test_frames_after_complete_are_discarded() {
    let (report, reported) = oneshot::channel();
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        let start = recv(&mut ws).await.unwrap();
        let id = start["id"].clone();
        send(&mut ws, json!({"type": "data", "id": id, "payload": {"data": {"tick": 1}}})).await;
        send(&mut ws, json!({"type": "data", "id": id, "payload": {"data": {"tick": 2}}})).await;
        send(&mut ws, json!({"type": "complete", "id": id})).await;
        send(&mut ws, json!({"type": "data", "id": id, "payload": {"data": {"tick": 3}}})).await;
        drain_until_terminate(&mut ws).await;
        let _ = report.send(start);
    })
    .await;

    let client = connect(addr).await;
    let mut ticks = client
        .subscribe(&Operation::new("subscription { tick }"))
        .await
        .unwrap();

    assert_eq!(
        next(&mut ticks).await,
        Some(SubscriptionPayload::Data(json!({"data": {"tick": 1}})))
    );
    let second: Value = next(&mut ticks).await.unwrap().decode().unwrap();
    assert_eq!(second, json!({"tick": 2}));
    assert_eq!(next(&mut ticks).await, None);
    assert_eq!(ticks.state(), SubscriptionState::Completed);
    assert_eq!(client.active_subscriptions(), 0);

    client.close().await.unwrap();
    let start = reported.await.unwrap();
    assert_eq!(
        start,
        json!({
            "type": "start",
            "id": "0",
            "payload": {"query": "subscription { tick }", "variables": null}
        })
    );
}

#[tokio::test]
async fn test_close_ends_open_subscriptions() {
    let (report, reported) = oneshot::channel();
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        let frames = drain_until_terminate(&mut ws).await;
        let _ = report.send(frames);
    })
    .await;

    let client = connect(addr).await;
    let mut first = client.subscribe(&Operation::new("subscription { a }")).await.unwrap();
    let mut second = client.subscribe(&Operation::new("subscription { b }")).await.unwrap();
    assert_eq!(client.active_subscriptions(), 2);

    client.close().await.unwrap();
    assert!(client.is_closed());
    assert_eq!(client.last_error(), None);
    assert_eq!(next(&mut first).await, None);
    assert_eq!(next(&mut second).await, None);

    // already ended, nothing is sent
    client.unsubscribe(&first).await.unwrap();
    client.unsubscribe(&second).await.unwrap();
    client.close().await.unwrap();

    let kinds: Vec<_> = reported
        .await
        .unwrap()
        .into_iter()
        .map(|frame| frame["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, ["start", "start", "connection_terminate"]);

    let err = client
        .subscribe(&Operation::new("subscription { c }"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphQLError::ConnectionClosed));
}

#[tokio::test]
async fn test_subscription_ids_are_sequential() {
    let (report, reported) = oneshot::channel();
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        let frames = drain_until_terminate(&mut ws).await;
        let _ = report.send(frames);
    })
    .await;

    let client = connect(addr).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let subscription = client
            .subscribe(&Operation::new("subscription { tick }"))
            .await
            .unwrap();
        ids.push(subscription.id().to_string());
    }
    assert_eq!(ids, ["0", "1", "2"]);

    client.close().await.unwrap();
    let server_ids: Vec<_> = reported
        .await
        .unwrap()
        .into_iter()
        .filter(|frame| frame["type"] == "start")
        .map(|frame| frame["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(server_ids, ids);
}

#[tokio::test]
async fn test_unsubscribe_sends_stop() {
    let (report, reported) = oneshot::channel();
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        let frames = drain_until_terminate(&mut ws).await;
        let _ = report.send(frames);
    })
    .await;

    let client = connect(addr).await;
    let mut subscription = client
        .subscribe(&Operation::new("subscription { tick }"))
        .await
        .unwrap();

    client.unsubscribe(&subscription).await.unwrap();
    assert_eq!(next(&mut subscription).await, None);
    client.unsubscribe(&subscription).await.unwrap();
    client.close().await.unwrap();

    let frames = reported.await.unwrap();
    let stops: Vec<_> = frames.iter().filter(|f| f["type"] == "stop").collect();
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0]["id"], "0");
}

#[tokio::test]
async fn test_frames_for_unsubscribed_id_are_dropped() {
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        recv(&mut ws).await;
        recv(&mut ws).await;
        recv_until(&mut ws, "stop").await;
        send(&mut ws, json!({"type": "data", "id": "0", "payload": {"data": "stale"}})).await;
        send(&mut ws, json!({"type": "data", "id": "1", "payload": {"data": "fresh"}})).await;
        drain_until_terminate(&mut ws).await;
    })
    .await;

    let client = connect(addr).await;
    let mut stopped = client.subscribe(&Operation::new("subscription { a }")).await.unwrap();
    let mut live = client.subscribe(&Operation::new("subscription { b }")).await.unwrap();

    client.unsubscribe(&stopped).await.unwrap();
    assert_eq!(
        next(&mut live).await,
        Some(SubscriptionPayload::Data(json!({"data": "fresh"})))
    );
    assert_eq!(next(&mut stopped).await, None);
    assert_eq!(client.active_subscriptions(), 1);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_releases_full_buffer() {
    let (flooded, flood_sent) = oneshot::channel();
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        recv(&mut ws).await;
        recv(&mut ws).await;
        for n in 0..4 {
            send(&mut ws, json!({"type": "data", "id": "0", "payload": {"data": {"n": n}}})).await;
        }
        let _ = flooded.send(());
        recv_until(&mut ws, "stop").await;
        send(&mut ws, json!({"type": "data", "id": "0", "payload": {"data": "late"}})).await;
        send(&mut ws, json!({"type": "data", "id": "1", "payload": {"data": "b"}})).await;
        drain_until_terminate(&mut ws).await;
    })
    .await;

    let config = SubscriptionConfig {
        delivery_buffer: 1,
        ..SubscriptionConfig::default()
    };
    let client = SubscriptionClient::connect(&format!("ws://{addr}"), config)
        .await
        .unwrap();
    let mut slow = client.subscribe(&Operation::new("subscription { a }")).await.unwrap();
    let mut other = client.subscribe(&Operation::new("subscription { b }")).await.unwrap();

    // let dispatch fill the one-slot buffer and block on the next frame
    flood_sent.await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.unsubscribe(&slow).await.unwrap();
    assert_eq!(
        next(&mut other).await,
        Some(SubscriptionPayload::Data(json!({"data": "b"})))
    );

    let mut leftovers = Vec::new();
    while let Some(payload) = next(&mut slow).await {
        leftovers.push(payload);
    }
    assert!(leftovers.len() <= 1);
    assert!(!leftovers.contains(&SubscriptionPayload::Data(json!({"data": "late"}))));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_routing_by_id() {
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        recv(&mut ws).await;
        recv(&mut ws).await;
        send(&mut ws, json!({"type": "data", "id": "99", "payload": {"data": 0}})).await;
        send(&mut ws, json!({"type": "next", "id": "0", "payload": {"data": 0}})).await;
        send(&mut ws, json!({"type": "data", "id": "1", "payload": {"data": "b"}})).await;
        send(&mut ws, json!({"type": "ka"})).await;
        send(&mut ws, json!({"type": "data", "id": "0", "payload": {"data": "a"}})).await;
        send(
            &mut ws,
            json!({"type": "error", "id": "1", "payload": [{"message": "boom"}]}),
        )
        .await;
        drain_until_terminate(&mut ws).await;
    })
    .await;

    let client = connect(addr).await;
    let mut a = client.subscribe(&Operation::new("subscription { a }")).await.unwrap();
    let mut b = client.subscribe(&Operation::new("subscription { b }")).await.unwrap();

    assert_eq!(
        next(&mut a).await,
        Some(SubscriptionPayload::Data(json!({"data": "a"})))
    );
    assert_eq!(
        next(&mut b).await,
        Some(SubscriptionPayload::Data(json!({"data": "b"})))
    );

    let err = next(&mut b).await.unwrap().decode::<Value>().unwrap_err();
    assert!(err.is_graphql_error());
    assert!(err.to_string().contains("boom"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_abrupt_disconnect_records_error() {
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        recv(&mut ws).await;
        drop(ws);
    })
    .await;

    let client = connect(addr).await;
    let mut subscription = client
        .subscribe(&Operation::new("subscription { tick }"))
        .await
        .unwrap();

    assert_eq!(next(&mut subscription).await, None);
    assert!(client.is_closed());
    assert!(client.last_error().is_some());

    let err = client
        .subscribe(&Operation::new("subscription { tick }"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphQLError::ConnectionClosed));
}

#[tokio::test]
async fn test_subscription_stream() {
    let addr = serve(|mut ws| async move {
        acknowledge(&mut ws).await;
        let start = recv(&mut ws).await.unwrap();
        let id = start["id"].clone();
        for n in 0..3 {
            send(&mut ws, json!({"type": "data", "id": id, "payload": {"data": {"n": n}}})).await;
        }
        send(&mut ws, json!({"type": "complete", "id": id})).await;
        drain_until_terminate(&mut ws).await;
    })
    .await;

    let client = connect(addr).await;
    let subscription = client
        .subscribe(&Operation::new("subscription { n }"))
        .await
        .unwrap();

    let values: Vec<Value> = timeout(
        Duration::from_secs(5),
        subscription
            .map(|payload| payload.decode::<Value>().unwrap()["n"].clone())
            .collect(),
    )
    .await
    .unwrap();
    assert_eq!(values, [json!(0), json!(1), json!(2)]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_client_derives_websocket_endpoint() {
    let (report, reported) = oneshot::channel();
    let addr = serve(|mut ws| async move {
        let init = acknowledge(&mut ws).await;
        let _ = report.send(init);
        drain_until_terminate(&mut ws).await;
    })
    .await;

    let config = GraphQLClientConfig::builder()
        .endpoint(format!("http://{addr}/graphql"))
        .init_payload(json!({"token": "abc"}))
        .build();
    let client = GraphQLClient::with_config(config).unwrap();

    let connection = client.subscription_client().await.unwrap();
    assert_eq!(
        reported.await.unwrap(),
        json!({"type": "connection_init", "payload": {"token": "abc"}})
    );
    connection.close().await.unwrap();
}
