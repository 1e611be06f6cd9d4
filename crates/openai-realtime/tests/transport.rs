use futures_util::{SinkExt, StreamExt};
use openai_realtime::{RealtimeApi, RealtimeError};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

/// Accepts one websocket, reports every text frame it receives, then replies
/// with the scripted frames once the first client frame arrives.
async fn spawn_backend(
    replies: Vec<Value>,
    close_after_reply: bool,
) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut replied = false;
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let event: Value = serde_json::from_str(text.as_str()).unwrap();
                let _ = seen_tx.send(event);
                if !replied {
                    replied = true;
                    for reply in &replies {
                        ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                    }
                    if close_after_reply {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            }
        }
    });

    (format!("ws://{}/v1/realtime", addr), seen_rx)
}

#[tokio::test]
async fn test_send_before_connect_is_a_connection_error() {
    let api = RealtimeApi::with_url("ws://127.0.0.1:9/v1/realtime", None);
    assert!(!api.is_connected());
    let err = api.send("response.create", json!({})).unwrap_err();
    assert!(matches!(err, RealtimeError::Connection(_)));
    assert!(!api.disconnect().await);
}

#[tokio::test]
async fn test_connect_failure_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = RealtimeApi::with_url(format!("ws://{}/v1/realtime", addr), None);
    let err = api.connect("test-model").await.unwrap_err();
    assert!(matches!(err, RealtimeError::Connection(_)));
    assert!(!api.is_connected());
}

#[tokio::test]
async fn test_send_frames_and_dispatches_inbound_events() {
    let (url, mut seen) = spawn_backend(
        vec![json!({"type": "session.created", "event_id": "event_1", "session": {}})],
        false,
    )
    .await;
    let api = RealtimeApi::with_url(url, None);
    api.connect("test-model").await.unwrap();
    assert!(api.is_connected());

    let created = api.bus().wait_for_next("session.created", WAIT);
    let local = api.bus().wait_for_next("client.session.update", WAIT);

    let sent = api
        .send("session.update", json!({"session": {"voice": "alloy"}}))
        .unwrap();
    let event_id = sent["event_id"].as_str().unwrap().to_owned();
    assert!(event_id.starts_with("evt_"));
    assert_eq!(event_id.len(), 21);

    let received = seen.recv().await.unwrap();
    assert_eq!(received["type"], "session.update");
    assert_eq!(received["event_id"], event_id.as_str());
    assert_eq!(received["session"]["voice"], "alloy");

    assert_eq!(local.await.unwrap()["event_id"], event_id.as_str());
    assert_eq!(created.await.unwrap()["event_id"], "event_1");

    let closed = api.bus().wait_for_next("close", WAIT);
    assert!(api.disconnect().await);
    assert_eq!(closed.await, Some(json!({"error": false})));
    assert!(!api.is_connected());
    assert!(!api.disconnect().await);
}

#[tokio::test]
async fn test_validation_and_duplicate_connect() {
    let (url, _seen) = spawn_backend(vec![], false).await;
    let api = RealtimeApi::with_url(url, None);
    api.connect("test-model").await.unwrap();

    let err = api.send("input_audio_buffer.append", json!(["audio"])).unwrap_err();
    assert!(matches!(err, RealtimeError::Validation(_)));

    let err = api.connect("test-model").await.unwrap_err();
    assert!(matches!(err, RealtimeError::Connection(_)));

    api.disconnect().await;
}

#[tokio::test]
async fn test_remote_close_dispatches_error_close() {
    let (url, _seen) = spawn_backend(
        vec![json!({"type": "error", "event_id": "event_9", "error": {"message": "bye"}})],
        true,
    )
    .await;
    let api = RealtimeApi::with_url(url, None);
    api.connect("test-model").await.unwrap();

    let error = api.bus().wait_for_next("error", WAIT);
    let closed = api.bus().wait_for_next("close", WAIT);
    api.send("response.create", Value::Null).unwrap();

    assert_eq!(error.await.unwrap()["error"]["message"], "bye");
    assert_eq!(closed.await, Some(json!({"error": true})));
    assert!(!api.is_connected());
    assert!(matches!(
        api.send("response.create", Value::Null),
        Err(RealtimeError::Connection(_))
    ));
}
