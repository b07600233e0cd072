//! Live SMS monitoring.
//!
//! A [`MonitorSession`] runs `sms monitor` through the channel, re-frames the
//! streamed output into records and delivers each completed SMS to its single
//! subscriber. Every subscriber gets its own session and its own remote
//! `sms monitor` process.
//!
//! ```text
//! Idle ──start──► Streaming ──remote closed / subscriber gone──► Closed
//!                     └──────────── stream error ─────────────► Failed
//! ```

use crate::channel::RemoteCommandChannel;
use modem_cli_protocol::{FrameAssembler, ModemCommand, SmsRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Lifecycle of a monitor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Not started.
    Idle,
    /// `sms monitor` is running.
    Streaming,
    /// Ended normally.
    Closed,
    /// Ended by a stream error.
    Failed,
}

/// Notification delivered to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A newly completed message.
    Sms(SmsRecord),
    /// The stream failed; no further events follow.
    Failed(String),
}

/// One `sms monitor` invocation feeding one subscriber.
pub struct MonitorSession {
    channel: RemoteCommandChannel,
    assembler: FrameAssembler,
    state: MonitorState,
}

impl MonitorSession {
    /// Create an idle session.
    pub fn new(channel: RemoteCommandChannel) -> Self {
        MonitorSession {
            channel,
            assembler: FrameAssembler::new(),
            state: MonitorState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Text buffered while waiting for the next header.
    pub fn pending(&self) -> &str {
        self.assembler.pending()
    }

    /// Run the session on its own task and return the subscriber side.
    ///
    /// The queue between the two is unbounded; a slow subscriber makes it grow.
    pub fn spawn(mut self) -> MonitorSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move { self.run(tx).await });
        MonitorSubscription { events: rx, task }
    }

    /// Drive the stream until it ends or the subscriber goes away.
    pub async fn run(&mut self, subscriber: mpsc::UnboundedSender<MonitorEvent>) -> MonitorState {
        self.state = MonitorState::Streaming;

        let command = ModemCommand::SmsMonitor.to_command_string();
        let mut chunks = match self.channel.stream(&command).await {
            Ok(chunks) => chunks,
            Err(e) => return self.fail(&subscriber, e.to_string()),
        };

        loop {
            tokio::select! {
                biased;

                _ = subscriber.closed() => {
                    info!("Monitor subscriber went away");
                    self.state = MonitorState::Closed;
                    return self.state;
                }

                next = chunks.next() => match next {
                    Some(Ok(chunk)) => {
                        let records = self.assembler.push(&chunk);
                        if !self.deliver(&subscriber, records) {
                            self.state = MonitorState::Closed;
                            return self.state;
                        }
                    }
                    Some(Err(e)) => return self.fail(&subscriber, e.to_string()),
                    None => {
                        let records = self.assembler.finish();
                        self.deliver(&subscriber, records);
                        self.state = MonitorState::Closed;
                        return self.state;
                    }
                },
            }
        }
    }

    /// Send records in order. Returns false once the subscriber is gone.
    fn deliver(&self, subscriber: &mpsc::UnboundedSender<MonitorEvent>, records: Vec<SmsRecord>) -> bool {
        for sms in records {
            if self.channel.sensitive_logs() {
                info!("Delivering SMS {} from {}", sms.index, sms.sender);
            } else {
                info!("Delivering SMS {}", sms.index);
            }
            if subscriber.send(MonitorEvent::Sms(sms)).is_err() {
                return false;
            }
        }
        true
    }

    fn fail(&mut self, subscriber: &mpsc::UnboundedSender<MonitorEvent>, message: String) -> MonitorState {
        warn!("SMS monitor error: {}", message);
        let _ = subscriber.send(MonitorEvent::Failed(message));
        self.state = MonitorState::Failed;
        self.state
    }
}

/// Subscriber side of a spawned [`MonitorSession`].
///
/// Dropping it ends the session and stops the remote command.
pub struct MonitorSubscription {
    events: mpsc::UnboundedReceiver<MonitorEvent>,
    task: JoinHandle<MonitorState>,
}

impl MonitorSubscription {
    /// Wait for the next notification. `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        self.events.recv().await
    }

    /// Stop listening and wait for the session's final state.
    pub async fn close(mut self) -> MonitorState {
        self.events.close();
        // Unread notifications keep the queue alive; drain them.
        while self.events.recv().await.is_some() {}
        match (&mut self.task).await {
            Ok(state) => state,
            Err(_) => MonitorState::Failed,
        }
    }
}

impl Drop for MonitorSubscription {
    fn drop(&mut self) {
        self.events.close();
    }
}
