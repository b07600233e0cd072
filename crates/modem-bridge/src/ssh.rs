//! OpenSSH transport.
//!
//! The persistent session is an OpenSSH control master (`ssh -M -N`) bound to
//! a local control socket. Every command is a short-lived `ssh -S <socket>`
//! client multiplexed over the master, so only the master authenticates and
//! its exit is the loss of the session.

use crate::channel::{ExecOutput, SessionEnd, ShellTransport};
use crate::chunk::{StreamEvent, Utf8Decoder};
use crate::error::{ChannelError, ChannelResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Interval between control socket checks while the master comes up.
const MASTER_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read size for streamed standard output.
const STREAM_READ_SIZE: usize = 4096;

/// How long to wait for error output once a streaming command closed its standard output.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection parameters for the bridge host.
#[derive(Debug, Clone)]
pub struct SshTarget {
    /// Bridge host name or address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Password, fed to `sshpass -e` when set.
    pub password: Option<String>,
    /// Private key for key-based login.
    pub identity_file: Option<PathBuf>,
    /// Time allowed for the handshake.
    pub connect_timeout: Duration,
}

impl SshTarget {
    fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// [`ShellTransport`] over an OpenSSH control master.
pub struct SshTransport {
    target: SshTarget,
    program: PathBuf,
    control_path: PathBuf,
    master: Mutex<Option<Child>>,
}

impl SshTransport {
    /// Create a transport. Nothing is started until [`ShellTransport::open`].
    pub fn new(target: SshTarget) -> Self {
        let control_path = std::env::temp_dir().join(format!("modem-bridge-{}.sock", std::process::id()));
        SshTransport {
            target,
            program: PathBuf::from("ssh"),
            control_path,
            master: Mutex::new(None),
        }
    }

    /// Use `program` instead of the `ssh` found on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Options shared by the master and every multiplexed client.
    fn base_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-p".to_string(),
            self.target.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.target.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ]
    }

    fn master_command(&self) -> Command {
        let mut cmd = match &self.target.password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(&self.program).env("SSHPASS", password);
                cmd
            }
            None => {
                let mut cmd = Command::new(&self.program);
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };

        cmd.args(["-M", "-N", "-o", "ControlPersist=no"])
            .args(["-o", "ServerAliveInterval=15", "-o", "ServerAliveCountMax=3"])
            .args(self.base_args());
        if let Some(identity) = &self.target.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Client command multiplexed over the master.
    fn client_command(&self, remote: &str) -> Command {
        // LogLevel=ERROR keeps ssh's own fatal diagnostics on the error channel.
        let mut cmd = Command::new(&self.program);
        cmd.args(["-T", "-o", "BatchMode=yes", "-o", "LogLevel=ERROR"])
            .args(self.base_args())
            .arg(self.target.destination())
            .arg("--")
            .arg(remote)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Whether the control socket answers `ssh -O check`.
    async fn master_ready(&self) -> bool {
        let status = Command::new(&self.program)
            .args(["-S"])
            .arg(&self.control_path)
            .args(["-O", "check"])
            .arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        matches!(status, Ok(s) if s.success())
    }

    fn connection_error(&self, reason: impl Into<String>) -> ChannelError {
        ChannelError::Connection {
            host: self.target.host.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ShellTransport for SshTransport {
    async fn open(&self) -> ChannelResult<()> {
        let mut guard = self.master.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut child = self
            .master_command()
            .spawn()
            .map_err(|e| self.connection_error(format!("failed to start ssh: {}", e)))?;

        let deadline = Instant::now() + self.target.connect_timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                return Err(self.connection_error(format!("ssh exited with {}: {}", status, stderr.trim())));
            }
            if self.master_ready().await {
                break;
            }
            if Instant::now() >= deadline {
                return Err(self.connection_error("timed out waiting for the control master"));
            }
            tokio::time::sleep(MASTER_POLL_INTERVAL).await;
        }

        debug!("Control master up at {}", self.control_path.display());
        if let Some(pipe) = child.stderr.take() {
            tokio::spawn(forward_master_stderr(pipe));
        }
        *guard = Some(child);
        Ok(())
    }

    async fn exec(&self, command: &str) -> ChannelResult<ExecOutput> {
        let output = self
            .client_command(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn exec_streaming(&self, command: &str) -> ChannelResult<mpsc::UnboundedReceiver<StreamEvent>> {
        let mut child = self
            .client_command(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (mut stdout, mut stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => return Err(ChannelError::Stream("streaming command has no output pipes".to_string())),
        };

        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut decoder = Utf8Decoder::new();
            let mut out_buf = vec![0u8; STREAM_READ_SIZE];
            let mut err_buf = vec![0u8; 1024];
            let mut stderr_open = true;

            loop {
                tokio::select! {
                    biased;

                    read = stderr.read(&mut err_buf), if stderr_open => match read {
                        Ok(0) | Err(_) => stderr_open = false,
                        Ok(n) => {
                            let message = String::from_utf8_lossy(&err_buf[..n]).into_owned();
                            let _ = tx.send(StreamEvent::Error(message));
                            break;
                        }
                    },
                    read = stdout.read(&mut out_buf) => match read {
                        Ok(0) => {
                            let rest = decoder.finish();
                            if !rest.is_empty() {
                                let _ = tx.send(StreamEvent::Data(rest));
                            }
                            // An error written just before exit may still be unread.
                            if stderr_open {
                                let message = drain_to_string(&mut stderr).await;
                                if !message.is_empty() {
                                    let _ = tx.send(StreamEvent::Error(message));
                                }
                            }
                            break;
                        }
                        Ok(n) => {
                            let text = decoder.decode(&out_buf[..n]);
                            if !text.is_empty() && tx.send(StreamEvent::Data(text)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(StreamEvent::Error(e.to_string()));
                            break;
                        }
                    },
                    _ = tx.closed() => break,
                }
            }

            // Stops the remote command when the consumer went away early.
            if let Err(e) = child.kill().await {
                debug!("streaming command already exited: {}", e);
            }
        });

        Ok(rx)
    }

    async fn wait_closed(&self) -> SessionEnd {
        let child = self.master.lock().await.take();
        let Some(mut child) = child else {
            return SessionEnd::Failed("session was never opened".to_string());
        };

        match child.wait().await {
            Ok(status) if status.success() => SessionEnd::Disconnected("control master closed".to_string()),
            Ok(status) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                warn!("Control master exited with {}", status);
                SessionEnd::Failed(format!("control master exited with {}: {}", status, stderr.trim()))
            }
            Err(e) => SessionEnd::Failed(e.to_string()),
        }
    }

    fn host(&self) -> &str {
        &self.target.host
    }
}

/// Read the rest of `pipe`, giving up after [`STDERR_DRAIN_TIMEOUT`].
async fn drain_to_string<R: AsyncRead + Unpin>(pipe: &mut R) -> String {
    let mut bytes = Vec::new();
    let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, pipe.read_to_end(&mut bytes)).await;
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Log the control master's diagnostics so its pipe never fills up.
async fn forward_master_stderr(pipe: ChildStderr) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!("ssh master: {}", line);
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.control_path);
    }
}
