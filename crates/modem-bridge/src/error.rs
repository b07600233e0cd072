//! Error types for the bridge runtime.

use modem_cli_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised by the remote command channel and the services built on it.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The shell session could not be established.
    #[error("failed to connect to {host}: {reason}")]
    Connection {
        /// Bridge host that was dialed.
        host: String,
        /// What went wrong during the handshake.
        reason: String,
    },

    /// A liveness probe did not answer with its sentinel.
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    /// The network interface towards the modem could not be brought up.
    #[error("failed to bring up interface {name}: {stderr}")]
    Interface {
        /// Interface name.
        name: String,
        /// Diagnostic output of the remote invocation.
        stderr: String,
    },

    /// A single remote command reported an error.
    #[error("command {command:?} failed: {stderr}")]
    Command {
        /// The command line, redacted when sensitive.
        command: String,
        /// Diagnostic output of the remote invocation.
        stderr: String,
    },

    /// A streaming command reported an error mid-stream.
    #[error("stream failed: {0}")]
    Stream(String),

    /// The shell session left the connected state.
    #[error("remote shell session lost: {0}")]
    ChannelLost(String),

    /// Validation or parse failure from the protocol layer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Local I/O failure (spawning the transport, reading pipes).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    /// Whether this error means the shared session can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChannelError::Connection { .. }
                | ChannelError::DeviceUnreachable(_)
                | ChannelError::ChannelLost(_)
        )
    }

    /// Whether this error is a rejection of user input.
    pub fn is_validation(&self) -> bool {
        matches!(self, ChannelError::Protocol(ProtocolError::Validation(_)))
    }
}

/// Result type alias for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
