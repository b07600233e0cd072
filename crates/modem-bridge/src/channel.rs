//! Remote command channel to the modem.
//!
//! The modem is two shell hops away: a bridge host with the modem attached over
//! USB, then the modem's own embedded shell. This module owns the single
//! persistent session to the bridge host and turns it into one logical
//! "run on device" operation:
//!
//! ```text
//! caller ── run("sms list") ──► bridge host: ssh -y root@$(cat /var/run/topipv6) '<cm> sms list'
//!                                                   └──► modem shell: <cm> sms list
//! ```
//!
//! Losing the session is fatal. Nothing the modem says afterwards can be
//! trusted, so the watchdog hands the loss to a [`LossHandler`] whose
//! production form exits the process. There is no reconnect.

use crate::chunk::{ChunkStream, StreamEvent};
use crate::error::{ChannelError, ChannelResult};
use async_trait::async_trait;
use modem_cli_protocol::{redact_for_log, ModemCommand};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Probe run on the bridge host during connect.
pub const FIRST_HOP_PROBE: &str = "echo 'connection_test'";
/// Sentinel the bridge host probe must print.
pub const FIRST_HOP_SENTINEL: &str = "connection_test";
/// Probe run in the modem shell during connect.
pub const DEVICE_PROBE: &str = "echo device_ready";
/// Sentinel the modem shell probe must print.
pub const DEVICE_SENTINEL: &str = "device_ready";
/// Exit status ssh reserves for its own failures.
pub const SSH_FAILURE_EXIT: i32 = 255;

// ============================================================================
// Transport
// ============================================================================

/// Output of a finished command on the bridge host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output.
    pub stdout: String,
    /// Error channel output.
    pub stderr: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
}

impl ExecOutput {
    /// Whether the command exited 0 and printed `sentinel`.
    pub fn answered(&self, sentinel: &str) -> bool {
        self.exit_code == Some(0) && self.stdout.contains(sentinel)
    }

    /// Whether the shell hop itself failed: killed by a signal, or ssh's own exit status 255.
    pub fn hop_failed(&self) -> bool {
        matches!(self.exit_code, None | Some(SSH_FAILURE_EXIT))
    }

    /// Why the command failed, if it did.
    ///
    /// Error-channel output fails a command. So does a failed hop, even when it printed nothing.
    pub fn failure(&self) -> Option<String> {
        if !self.stderr.is_empty() {
            Some(self.stderr.clone())
        } else if self.hop_failed() {
            Some(match self.exit_code {
                Some(code) => format!("remote shell exited with status {} and no diagnostics", code),
                None => "remote shell was terminated by a signal".to_string(),
            })
        } else {
            None
        }
    }
}

/// How a session left the connected state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Closed by the remote end or by an idle timeout.
    Disconnected(String),
    /// Torn down by a transport error.
    Failed(String),
}

impl SessionEnd {
    /// State the session is in after this end.
    pub fn state(&self) -> SessionState {
        match self {
            SessionEnd::Disconnected(_) => SessionState::Disconnected,
            SessionEnd::Failed(_) => SessionState::Failed,
        }
    }

    /// Human readable reason.
    pub fn reason(&self) -> &str {
        match self {
            SessionEnd::Disconnected(reason) | SessionEnd::Failed(reason) => reason,
        }
    }
}

/// A persistent authenticated shell session on the bridge host.
///
/// Commands passed to a transport are complete shell command lines for the
/// bridge host; routing through the modem shell happens above this trait.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    /// Perform the handshake and open the session.
    async fn open(&self) -> ChannelResult<()>;

    /// Run a command to completion.
    async fn exec(&self, command: &str) -> ChannelResult<ExecOutput>;

    /// Start a command and deliver its output as it arrives.
    ///
    /// The returned receiver yields `Data` chunks in order, an `Error` on the
    /// first error-channel output, and closes when the process closes its
    /// output. Dropping the receiver stops the remote process.
    async fn exec_streaming(&self, command: &str) -> ChannelResult<mpsc::UnboundedReceiver<StreamEvent>>;

    /// Resolve once the session is no longer usable.
    async fn wait_closed(&self) -> SessionEnd;

    /// Host name for diagnostics.
    fn host(&self) -> &str;
}

// ============================================================================
// Session state
// ============================================================================

/// Connectivity of the shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Commands may be issued.
    Connected,
    /// The session was closed.
    Disconnected,
    /// The session broke.
    Failed,
}

/// Atomic session flag, the only mutable state shared between callers.
#[derive(Debug)]
struct SessionFlag(AtomicU8);

impl SessionFlag {
    fn connected() -> Self {
        SessionFlag(AtomicU8::new(0))
    }

    fn get(&self) -> SessionState {
        match self.0.load(Ordering::Acquire) {
            0 => SessionState::Connected,
            1 => SessionState::Disconnected,
            _ => SessionState::Failed,
        }
    }

    fn set(&self, state: SessionState) {
        let value = match state {
            SessionState::Connected => 0,
            SessionState::Disconnected => 1,
            SessionState::Failed => 2,
        };
        self.0.store(value, Ordering::Release);
    }
}

/// Called once when the session leaves [`SessionState::Connected`].
pub type LossHandler = Arc<dyn Fn(&ChannelError) + Send + Sync>;

/// Loss handler that terminates the process.
pub fn exit_on_loss() -> LossHandler {
    Arc::new(|err: &ChannelError| {
        error!("{}", err);
        error!("The bridge cannot operate without its shell session. Exiting...");
        std::process::exit(1);
    })
}

// ============================================================================
// Device hop
// ============================================================================

/// Location of the modem shell and its `cm` tool, as seen from the bridge host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHop {
    /// File on the bridge host holding the modem's IPv6 address.
    pub address_file: String,
    /// Path of the `cm` tool on the modem.
    pub cm_path: String,
}

impl Default for DeviceHop {
    fn default() -> Self {
        DeviceHop {
            address_file: "/var/run/topipv6".to_string(),
            cm_path: "/legato/systems/current/bin/cm".to_string(),
        }
    }
}

impl DeviceHop {
    /// Bridge host command that runs `script` in the modem shell.
    pub fn shell(&self, script: &str) -> String {
        format!("ssh -y root@$(cat {}) {}", self.address_file, single_quote(script))
    }

    /// Bridge host command that runs `cm <command>` in the modem shell.
    pub fn cm(&self, command: &str) -> String {
        self.shell(&format!("{} {}", self.cm_path, command))
    }
}

/// Quote `text` as one single-quoted word for the bridge host shell.
///
/// The modem shell receives `text` unchanged.
pub fn single_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

// ============================================================================
// Channel
// ============================================================================

/// Options for [`RemoteCommandChannel::connect`].
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Interface on the bridge host that reaches the modem.
    pub interface: String,
    /// Where the modem shell lives.
    pub hop: DeviceHop,
    /// Log `sms send` arguments instead of redacting them.
    pub sensitive_logs: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions {
            interface: "usb0".to_string(),
            hop: DeviceHop::default(),
            sensitive_logs: false,
        }
    }
}

/// Handle to the connected session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct RemoteCommandChannel {
    transport: Arc<dyn ShellTransport>,
    hop: DeviceHop,
    session: Arc<SessionFlag>,
    sensitive_logs: bool,
}

impl RemoteCommandChannel {
    /// Open the session, verify both hops and bring up the modem interface.
    ///
    /// 1. handshake with the bridge host
    /// 2. `echo 'connection_test'` on the bridge host
    /// 3. `ifconfig <interface> up` on the bridge host
    /// 4. `echo device_ready` in the modem shell
    ///
    /// Once connected, `on_loss` is invoked if the session ever drops.
    pub async fn connect(
        transport: Arc<dyn ShellTransport>,
        options: ChannelOptions,
        on_loss: LossHandler,
    ) -> ChannelResult<Self> {
        info!("Setting up shell session to {}...", transport.host());
        transport.open().await?;

        info!("Verifying shell session...");
        let probe = transport.exec(FIRST_HOP_PROBE).await.map_err(|e| {
            ChannelError::DeviceUnreachable(format!("bridge host probe failed: {}", e))
        })?;
        if !probe.answered(FIRST_HOP_SENTINEL) {
            error!("Shell connected but the bridge host is not responding correctly");
            return Err(ChannelError::DeviceUnreachable(
                "bridge host did not answer the liveness probe".to_string(),
            ));
        }

        let channel = RemoteCommandChannel {
            transport,
            hop: options.hop,
            session: Arc::new(SessionFlag::connected()),
            sensitive_logs: options.sensitive_logs,
        };

        channel.bring_interface_up(&options.interface).await?;

        info!("Verifying nested shell to the modem...");
        let probe = channel
            .transport
            .exec(&channel.hop.shell(DEVICE_PROBE))
            .await
            .map_err(|e| ChannelError::DeviceUnreachable(format!("modem probe failed: {}", e)))?;
        if !probe.answered(DEVICE_SENTINEL) {
            error!("Nested shell to the modem is not responding correctly");
            return Err(ChannelError::DeviceUnreachable(
                "modem shell did not answer the liveness probe".to_string(),
            ));
        }

        channel.spawn_watchdog(on_loss);
        info!("Shell session established and {} is up", options.interface);
        Ok(channel)
    }

    /// Run `ifconfig <name> up` on the bridge host.
    ///
    /// Any error-channel output or a failed hop fails the call.
    pub async fn bring_interface_up(&self, name: &str) -> ChannelResult<()> {
        self.ensure_connected()?;

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
            return Err(ChannelError::Interface {
                name: name.to_string(),
                stderr: "invalid interface name".to_string(),
            });
        }

        info!("Bringing up {} interface...", name);
        let output = self.transport.exec(&format!("ifconfig {} up", name)).await?;
        if let Some(stderr) = output.failure() {
            error!("Failed to bring up {} interface: {}", name, stderr.trim_end());
            return Err(ChannelError::Interface {
                name: name.to_string(),
                stderr,
            });
        }
        Ok(())
    }

    /// Run a `cm` command on the modem and return its output.
    ///
    /// Any error-channel output, or a failed hop, fails the call with [`ChannelError::Command`].
    pub async fn run(&self, command: &str) -> ChannelResult<String> {
        self.ensure_connected()?;

        let shown = redact_for_log(command, self.sensitive_logs);
        info!("Executing modem command: {}", shown);

        let output = self.transport.exec(&self.hop.cm(command)).await?;
        if let Some(stderr) = output.failure() {
            error!("Error executing command {:?}: {}", shown, stderr.trim_end());
            return Err(ChannelError::Command {
                command: shown.into_owned(),
                stderr,
            });
        }

        debug!("Command {:?} executed successfully", shown);
        Ok(output.stdout)
    }

    /// Render and run a typed command.
    pub async fn run_command(&self, command: &ModemCommand) -> ChannelResult<String> {
        self.run(&command.to_command_string()).await
    }

    /// Start a `cm` command on the modem and stream its output.
    pub async fn stream(&self, command: &str) -> ChannelResult<ChunkStream> {
        self.ensure_connected()?;

        let shown = redact_for_log(command, self.sensitive_logs).into_owned();
        info!("Executing streaming modem command: {}", shown);

        let events = self.transport.exec_streaming(&self.hop.cm(command)).await?;
        Ok(ChunkStream::new(events, shown))
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.get()
    }

    /// Whether `sms send` arguments are logged.
    pub fn sensitive_logs(&self) -> bool {
        self.sensitive_logs
    }

    fn ensure_connected(&self) -> ChannelResult<()> {
        match self.session.get() {
            SessionState::Connected => Ok(()),
            state => Err(ChannelError::ChannelLost(format!("session is {:?}", state))),
        }
    }

    /// Watch the transport and report the first loss of the session.
    fn spawn_watchdog(&self, on_loss: LossHandler) {
        let transport = self.transport.clone();
        let session = self.session.clone();

        tokio::spawn(async move {
            let end = transport.wait_closed().await;
            session.set(end.state());
            error!("Shell session to {} ended: {}", transport.host(), end.reason());
            on_loss(&ChannelError::ChannelLost(end.reason().to_string()));
        });
    }
}
