//! Push channel for live SMS delivery.
//!
//! A push subscriber is a long-lived text connection (a WebSocket upstream, or
//! stdin/stdout for the CLI). When an API key is configured the subscriber
//! must authenticate before anything is pushed:
//!
//! ```text
//! server ──► {"type":"auth_required","message":"..."}
//! client ──► {"type":"auth","apiKey":"..."}
//! server ──► {"type":"auth_success","message":"..."}   then one SMS object per message
//!        or  {"type":"auth_failed","message":"..."}    then close
//! ```
//!
//! Without an API key the subscriber is authenticated on open.

use crate::monitor::{MonitorEvent, MonitorSubscription};
use crate::service::ModemService;
use modem_cli_protocol::SmsRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Message sent with `auth_required`.
pub const AUTH_REQUIRED_MESSAGE: &str = r#"Please authenticate by sending: { "type": "auth", "apiKey": "YOUR_KEY" }"#;

/// Control frame of the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// The subscriber must send an `auth` message first.
    AuthRequired { message: String },
    /// The API key matched; SMS objects follow.
    AuthSuccess { message: String },
    /// The API key was wrong; the connection closes.
    AuthFailed { message: String },
    /// Malformed input or a monitoring failure.
    Error { message: String },
}

impl ControlFrame {
    /// `auth_required` with the instructions text.
    pub fn auth_required() -> Self {
        ControlFrame::AuthRequired {
            message: AUTH_REQUIRED_MESSAGE.to_string(),
        }
    }

    /// `auth_success` acknowledgement.
    pub fn auth_success() -> Self {
        ControlFrame::AuthSuccess {
            message: "Authentication successful".to_string(),
        }
    }

    /// `auth_failed` for a wrong key.
    pub fn auth_failed() -> Self {
        ControlFrame::AuthFailed {
            message: "Invalid API key".to_string(),
        }
    }

    /// `error` carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        ControlFrame::Error { message: message.into() }
    }
}

/// Anything written to a push subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PushFrame {
    /// Handshake or error notice.
    Control(ControlFrame),
    /// One SMS, rendered as its record object.
    Sms(SmsRecord),
}

impl PushFrame {
    /// Render as one line of JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<ControlFrame> for PushFrame {
    fn from(frame: ControlFrame) -> Self {
        PushFrame::Control(frame)
    }
}

/// Outcome of one handshake step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Frames to send, in order.
    pub frames: Vec<ControlFrame>,
    /// Monitoring should start now.
    pub start_monitor: bool,
    /// The connection should be closed after sending `frames`.
    pub close: bool,
}

/// Per-subscriber handshake state.
#[derive(Debug, Clone)]
pub struct PushSubscriber {
    api_key: Option<String>,
    authenticated: bool,
}

impl PushSubscriber {
    /// A subscriber that must present `api_key`, or none if `None`.
    pub fn new(api_key: Option<String>) -> Self {
        let authenticated = api_key.is_none();
        PushSubscriber { api_key, authenticated }
    }

    /// Whether SMS objects may be pushed to this subscriber.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Handle a newly opened connection.
    pub fn open(&mut self) -> Reply {
        if self.authenticated {
            Reply {
                start_monitor: true,
                ..Reply::default()
            }
        } else {
            Reply {
                frames: vec![ControlFrame::auth_required()],
                ..Reply::default()
            }
        }
    }

    /// Handle an inbound message. Messages after authentication are ignored.
    pub fn on_message(&mut self, message: &str) -> Reply {
        if self.authenticated {
            return Reply::default();
        }

        let value: serde_json::Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(e) => {
                error!("Error parsing auth message: {}", e);
                return Reply {
                    frames: vec![ControlFrame::error("Invalid authentication message format")],
                    close: true,
                    ..Reply::default()
                };
            }
        };

        let is_auth = value.get("type").and_then(|v| v.as_str()) == Some("auth");
        let presented = value.get("apiKey").and_then(|v| v.as_str());

        if is_auth && presented.is_some() && presented == self.api_key.as_deref() {
            self.authenticated = true;
            info!("Push subscriber authenticated");
            Reply {
                frames: vec![ControlFrame::auth_success()],
                start_monitor: true,
                close: false,
            }
        } else {
            warn!("Push subscriber failed authentication");
            Reply {
                frames: vec![ControlFrame::auth_failed()],
                close: true,
                ..Reply::default()
            }
        }
    }
}

/// Serve one push subscriber until its connection closes.
///
/// `inbound` carries the subscriber's messages and closes with the
/// connection; frames for the subscriber go to `outbound`.
pub async fn serve(
    service: &ModemService,
    api_key: Option<String>,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::UnboundedSender<PushFrame>,
) {
    let mut subscriber = PushSubscriber::new(api_key);
    let mut monitor: Option<MonitorSubscription> = None;

    info!("Push connection opened");
    let reply = subscriber.open();
    if !apply(service, reply, &mut monitor, &outbound) {
        return;
    }

    loop {
        tokio::select! {
            message = inbound.recv() => match message {
                Some(message) => {
                    let reply = subscriber.on_message(&message);
                    if !apply(service, reply, &mut monitor, &outbound) {
                        break;
                    }
                }
                None => break,
            },

            event = next_event(&mut monitor) => match event {
                Some(MonitorEvent::Sms(sms)) => {
                    if outbound.send(PushFrame::Sms(sms)).is_err() {
                        break;
                    }
                }
                Some(MonitorEvent::Failed(message)) => {
                    monitor = None;
                    let frame = ControlFrame::error(format!("SMS monitoring error: {}", message));
                    if outbound.send(frame.into()).is_err() {
                        break;
                    }
                }
                None => monitor = None,
            },

            _ = outbound.closed() => break,
        }
    }

    info!("Push connection closed");
}

/// Send a reply's frames and act on it. Returns false when the connection should end.
fn apply(
    service: &ModemService,
    reply: Reply,
    monitor: &mut Option<MonitorSubscription>,
    outbound: &mpsc::UnboundedSender<PushFrame>,
) -> bool {
    for frame in reply.frames {
        if outbound.send(frame.into()).is_err() {
            return false;
        }
    }
    if reply.close {
        return false;
    }
    if reply.start_monitor && monitor.is_none() {
        *monitor = Some(service.monitor());
    }
    true
}

async fn next_event(monitor: &mut Option<MonitorSubscription>) -> Option<MonitorEvent> {
    match monitor {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
