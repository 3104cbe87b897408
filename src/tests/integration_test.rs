use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message as WsMessage;
use tower::ServiceExt;

use super::test_services;
use crate::app::Context;
use crate::durable::{LogConsumer, StepOutcome};
use crate::persistence::MessageStore;
use crate::pipeline::{IngestPipeline, MessageRecord};
use crate::transport::message::SendMessageResponse;
use crate::transport::{router, serve_websocket};

async fn get_json(app: &axum::Router, uri: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn post_message(app: &axum::Router, body: serde_json::Value) -> SendMessageResponse {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/send-message")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn integration_http_submit_persists_caches_and_logs() {
    let (services, _dir) = test_services().await;
    let app = router(services.ctx.clone());

    let accepted = post_message(
        &app,
        json!({ "senderId": 1, "receiverId": 2, "content": "hi" }),
    )
    .await;
    assert!(accepted.persisted && accepted.cached && accepted.appended);
    assert!(accepted.errors.is_empty());

    // persisted row
    let row = services
        .store
        .get(&accepted.message_id)
        .await
        .unwrap()
        .expect("row should exist");
    assert_eq!((row.sender_id, row.receiver_id), (1, 2));
    assert_eq!(row.content, "hi");

    // cache window via the read endpoint
    let cached: Vec<MessageRecord> =
        serde_json::from_value(get_json(&app, "/messages").await).unwrap();
    assert_eq!(cached, vec![row.clone()]);

    // exactly one log entry carrying the same record
    let mut consumer = services
        .log
        .consumer("inspect", Duration::from_millis(20))
        .unwrap();
    let entry = consumer.fetch_next().await.unwrap();
    assert_eq!(entry.offset, 0);
    assert_eq!(MessageRecord::from_slice(&entry.value).unwrap(), row);
    assert_eq!(services.log.len(), 1);
}

#[tokio::test]
async fn integration_consumer_commits_after_http_submit() {
    let (services, _dir) = test_services().await;
    let app = router(services.ctx.clone());
    post_message(&app, json!({ "sender_id": 3, "receiver_id": 4, "content": "queued" })).await;

    let mut consumer = services.consumer_loop().unwrap();
    assert_eq!(consumer.committed(), None);
    assert_eq!(consumer.step().await.unwrap(), StepOutcome::Committed(0));
    assert_eq!(consumer.committed(), Some(0));
    // reconciliation found the row already there
    assert_eq!(services.store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn integration_empty_content_does_not_stall_consumer() {
    let (services, _dir) = test_services().await;
    let app = router(services.ctx.clone());
    let empty = post_message(&app, json!({ "sender_id": 1, "receiver_id": 2, "content": "" })).await;
    assert!(empty.appended);
    post_message(&app, json!({ "sender_id": 1, "receiver_id": 2, "content": "next" })).await;

    let mut consumer = services.consumer_loop().unwrap();
    assert_eq!(consumer.step().await.unwrap(), StepOutcome::Committed(0));
    assert_eq!(consumer.step().await.unwrap(), StepOutcome::Committed(1));
    assert_eq!(consumer.committed(), Some(1));
}

#[tokio::test]
async fn integration_cached_message_expires_from_read_endpoint() {
    let (services, _dir) = test_services().await;
    // same backends, shorter cache window than the whole-second setting allows
    let settings = &services.ctx.settings;
    let ctx = Context {
        pipeline: IngestPipeline::new(
            services.store.clone(),
            services.cache.clone(),
            Arc::new(services.log.clone()),
            Duration::from_millis(150),
            settings.cache.key_prefix.clone(),
            settings.log.partition_key.clone(),
        ),
        ..services.ctx.clone()
    };
    let app = router(ctx);

    post_message(&app, json!({ "sender_id": 1, "receiver_id": 2, "content": "brief" })).await;
    assert_eq!(get_json(&app, "/messages").await.as_array().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(get_json(&app, "/messages").await.as_array().unwrap().is_empty());
    // the store is the system of record and keeps it
    assert_eq!(services.store.len().await.unwrap(), 1);
}

async fn wait_for_connections(services: &crate::app::Services, expected: usize) {
    for _ in 0..100 {
        if services.ctx.hub.connection_count().await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {expected} connections");
}

#[tokio::test]
async fn integration_two_connections_relay_raw_frames() {
    let (services, _dir) = test_services().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_websocket(listener, services.ctx.clone()));

    let url = format!("ws://{addr}");
    let (mut ws_a, _) = connect_async(url.as_str()).await.expect("client A connect");
    let (mut ws_b, _) = connect_async(url.as_str()).await.expect("client B connect");
    wait_for_connections(&services, 2).await;

    let raw = r#"{ "sender_id": 1,  "receiver_id": 2, "content": "hi" }"#;
    ws_a.send(WsMessage::text(raw)).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), ws_b.next())
        .await
        .expect("B should receive within the window")
        .unwrap()
        .unwrap();
    assert_eq!(received, WsMessage::text(raw));

    // A is not echoed its own message
    let echoed = tokio::time::timeout(Duration::from_millis(300), ws_a.next()).await;
    assert!(echoed.is_err());

    assert_eq!(services.store.len().await.unwrap(), 1);
    assert_eq!(services.log.len(), 1);
}
