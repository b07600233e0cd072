//! Scripted in-memory shell transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use modem_bridge::{
    ChannelError, ChannelOptions, ChannelResult, ExecOutput, LossHandler, RemoteCommandChannel, SessionEnd,
    ShellTransport, StreamEvent,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const HOST: &str = "bridge.test";

/// Transport that answers commands from a script instead of a real shell.
///
/// Responses are matched by substring against the full bridge host command;
/// the most recently added match wins. Unmatched commands succeed silently.
pub struct ScriptedTransport {
    responses: Mutex<Vec<(String, ExecOutput)>>,
    executed: Mutex<Vec<String>>,
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<StreamEvent>>>,
    open_error: Mutex<Option<String>>,
    end: Mutex<Option<SessionEnd>>,
    closed: Notify,
}

impl ScriptedTransport {
    /// A transport whose probes all answer correctly.
    pub fn healthy() -> Arc<Self> {
        let transport = ScriptedTransport {
            responses: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            streams: Mutex::new(VecDeque::new()),
            open_error: Mutex::new(None),
            end: Mutex::new(None),
            closed: Notify::new(),
        };
        transport.respond("connection_test", stdout("connection_test\n"));
        transport.respond("echo device_ready", stdout("device_ready\n"));
        Arc::new(transport)
    }

    /// Answer commands containing `pattern` with `output`.
    pub fn respond(&self, pattern: &str, output: ExecOutput) {
        self.responses.lock().unwrap().push((pattern.to_string(), output));
    }

    /// Make the handshake fail.
    pub fn fail_open(&self, reason: &str) {
        *self.open_error.lock().unwrap() = Some(reason.to_string());
    }

    /// Queue a stream for the next streaming command; returns its feeding end.
    pub fn script_stream(&self) -> mpsc::UnboundedSender<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(rx);
        tx
    }

    /// Simulate the session dropping.
    pub fn drop_session(&self, end: SessionEnd) {
        *self.end.lock().unwrap() = Some(end);
        self.closed.notify_one();
    }

    /// Every command issued so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Commands issued after the connect sequence.
    pub fn executed_after_connect(&self) -> Vec<String> {
        self.executed().into_iter().skip(3).collect()
    }
}

#[async_trait]
impl ShellTransport for ScriptedTransport {
    async fn open(&self) -> ChannelResult<()> {
        match self.open_error.lock().unwrap().clone() {
            Some(reason) => Err(ChannelError::Connection {
                host: HOST.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn exec(&self, command: &str) -> ChannelResult<ExecOutput> {
        self.executed.lock().unwrap().push(command.to_string());
        let responses = self.responses.lock().unwrap();
        let output = responses
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| stdout(""));
        Ok(output)
    }

    async fn exec_streaming(&self, command: &str) -> ChannelResult<mpsc::UnboundedReceiver<StreamEvent>> {
        self.executed.lock().unwrap().push(command.to_string());
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChannelError::Stream("no scripted stream".to_string()))
    }

    async fn wait_closed(&self) -> SessionEnd {
        self.closed.notified().await;
        self.end
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| SessionEnd::Disconnected("closed".to_string()))
    }

    fn host(&self) -> &str {
        HOST
    }
}

/// Successful output.
pub fn stdout(text: &str) -> ExecOutput {
    ExecOutput {
        stdout: text.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

/// Output with an error-channel message.
pub fn stderr(text: &str) -> ExecOutput {
    ExecOutput {
        stdout: String::new(),
        stderr: text.to_string(),
        exit_code: Some(1),
    }
}

/// Loss handler that counts its invocations.
pub fn counting_handler() -> (LossHandler, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let handler: LossHandler = Arc::new(move |_err: &ChannelError| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    (handler, count)
}

/// Loss handler that ignores the loss.
pub fn ignore_loss() -> LossHandler {
    Arc::new(|_err: &ChannelError| {})
}

/// Connect a channel over a scripted transport with default options.
pub async fn connect(transport: &Arc<ScriptedTransport>) -> RemoteCommandChannel {
    connect_with(transport, ChannelOptions::default()).await
}

pub async fn connect_with(transport: &Arc<ScriptedTransport>, options: ChannelOptions) -> RemoteCommandChannel {
    RemoteCommandChannel::connect(transport.clone(), options, ignore_loss())
        .await
        .expect("scripted connect succeeds")
}

/// Wait until `count` reaches `expected`, or give up after one second.
pub async fn wait_for_count(count: &AtomicUsize, expected: usize) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if count.load(Ordering::SeqCst) >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    count.load(Ordering::SeqCst) >= expected
}

/// One `sms list` style block.
pub fn sms_block(index: u32, format: &str, text: &str) -> String {
    format!(
        "--[ {}]---------------------------------------------------------------\n \
         Type:                         LE_SMS_TYPE_RX\n \
         Sender:                       +1234567890\n \
         Timestamp:                    26/01/08,21:47:12+04\n \
         Format:                       {}\n \
         Text ({}):                    {}\n",
        index,
        format,
        text.len(),
        text
    )
}
