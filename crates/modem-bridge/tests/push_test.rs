//! Integration tests for the push channel.

mod common;

use common::{connect, sms_block, ScriptedTransport};
use modem_bridge::push::{self, ControlFrame, PushFrame};
use modem_bridge::{ModemService, StreamEvent};
use modem_cli_protocol::TEXT_FORMAT;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const PATIENCE: Duration = Duration::from_secs(1);

struct Client {
    inbound: mpsc::Sender<String>,
    outbound: mpsc::UnboundedReceiver<PushFrame>,
    server: JoinHandle<()>,
}

impl Client {
    async fn send(&self, message: &str) {
        self.inbound.send(message.to_string()).await.unwrap();
    }

    async fn next(&mut self) -> Option<PushFrame> {
        timeout(PATIENCE, self.outbound.recv()).await.unwrap()
    }
}

async fn open(transport: &Arc<ScriptedTransport>, api_key: Option<&str>) -> Client {
    let service = ModemService::new(connect(transport).await);
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let api_key = api_key.map(str::to_string);

    let server = tokio::spawn(async move {
        push::serve(&service, api_key, inbound_rx, outbound_tx).await;
    });

    Client {
        inbound: inbound_tx,
        outbound: outbound_rx,
        server,
    }
}

fn sms_index(frame: Option<PushFrame>) -> u32 {
    match frame {
        Some(PushFrame::Sms(sms)) => sms.index,
        other => panic!("expected an SMS frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_key_streams_immediately() {
    let transport = ScriptedTransport::healthy();
    let feed = transport.script_stream();
    let mut client = open(&transport, None).await;

    feed.send(StreamEvent::Data(sms_block(0, TEXT_FORMAT, "Hello"))).unwrap();
    feed.send(StreamEvent::Data(sms_block(1, TEXT_FORMAT, "test"))).unwrap();

    let frame = client.next().await;
    let json = frame.as_ref().unwrap().to_json().unwrap();
    assert_eq!(sms_index(frame), 0);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["index"], 0);
    assert_eq!(value["type"], "LE_SMS_TYPE_RX");
    assert_eq!(value["timestamp"], "2026-01-08T20:47:12.000Z");
    assert_eq!(value["textLength"], 5);
}

#[tokio::test]
async fn test_correct_key_authenticates_then_streams() {
    let transport = ScriptedTransport::healthy();
    let feed = transport.script_stream();
    let mut client = open(&transport, Some("secret")).await;

    assert_eq!(client.next().await, Some(ControlFrame::auth_required().into()));
    // Nothing is monitored before authentication.
    assert!(transport.executed_after_connect().is_empty());

    client.send(r#"{"type":"auth","apiKey":"secret"}"#).await;
    assert_eq!(client.next().await, Some(ControlFrame::auth_success().into()));

    feed.send(StreamEvent::Data(sms_block(3, TEXT_FORMAT, "after auth"))).unwrap();
    drop(feed);
    assert_eq!(sms_index(client.next().await), 3);
}

#[tokio::test]
async fn test_wrong_key_closes() {
    let transport = ScriptedTransport::healthy();
    let mut client = open(&transport, Some("secret")).await;

    assert_eq!(client.next().await, Some(ControlFrame::auth_required().into()));
    client.send(r#"{"type":"auth","apiKey":"nope"}"#).await;
    assert_eq!(client.next().await, Some(ControlFrame::auth_failed().into()));
    assert_eq!(client.next().await, None);

    timeout(PATIENCE, client.server).await.unwrap().unwrap();
    assert!(transport.executed_after_connect().is_empty());
}

#[tokio::test]
async fn test_malformed_auth_closes() {
    let transport = ScriptedTransport::healthy();
    let mut client = open(&transport, Some("secret")).await;

    client.next().await;
    client.send("{not json").await;
    assert_eq!(
        client.next().await,
        Some(ControlFrame::error("Invalid authentication message format").into())
    );
    assert_eq!(client.next().await, None);
}

#[tokio::test]
async fn test_monitor_failure_reported_as_error_frame() {
    let transport = ScriptedTransport::healthy();
    let feed = transport.script_stream();
    let mut client = open(&transport, None).await;

    feed.send(StreamEvent::Error("cm: monitor aborted".to_string())).unwrap();
    match client.next().await {
        Some(PushFrame::Control(ControlFrame::Error { message })) => {
            assert!(message.starts_with("SMS monitoring error"));
            assert!(message.contains("monitor aborted"));
        }
        other => panic!("expected error frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_close_stops_monitor() {
    let transport = ScriptedTransport::healthy();
    let feed = transport.script_stream();
    let client = open(&transport, None).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(client.inbound);

    timeout(PATIENCE, client.server).await.unwrap().unwrap();
    timeout(PATIENCE, feed.closed()).await.unwrap();
}
