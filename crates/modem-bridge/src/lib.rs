//! Modem Bridge Runtime
//!
//! Runs the `cm` CLI of a USB-attached cellular modem from a remote machine
//! and turns it into typed SIM and SMS operations.
//!
//! # Architecture
//!
//! ```text
//! ModemService / PushSubscriber
//!        │
//!        ▼
//! RemoteCommandChannel ──► ShellTransport (SshTransport) ──► bridge host ──► modem shell
//!        │
//!        └── MonitorSession: sms monitor chunks ──► FrameAssembler ──► SmsRecord
//! ```
//!
//! There is exactly one shell session per process. If it drops, the process
//! exits; callers never see a half-working channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use modem_bridge::{exit_on_loss, BridgeConfig, ModemService, RemoteCommandChannel, SshTransport};
//! use std::sync::Arc;
//!
//! let config = BridgeConfig::load("bridge.yaml")?;
//! let transport = Arc::new(SshTransport::new(config.ssh_target()));
//! let channel = RemoteCommandChannel::connect(transport, config.channel_options(), exit_on_loss()).await?;
//!
//! let service = ModemService::new(channel);
//! for sms in service.list_messages().await? {
//!     println!("{}: {}", sms.sender, sms.text);
//! }
//! ```

pub mod channel;
pub mod chunk;
pub mod config;
pub mod error;
pub mod monitor;
pub mod push;
pub mod service;
pub mod ssh;

pub use channel::{
    exit_on_loss, ChannelOptions, DeviceHop, ExecOutput, LossHandler, RemoteCommandChannel, SessionEnd,
    SessionState, ShellTransport,
};
pub use chunk::{ChunkStream, StreamEvent, Utf8Decoder};
pub use config::{BridgeConfig, ConfigError};
pub use error::{ChannelError, ChannelResult};
pub use monitor::{MonitorEvent, MonitorSession, MonitorState, MonitorSubscription};
pub use push::{ControlFrame, PushFrame, PushSubscriber, Reply};
pub use service::ModemService;
pub use ssh::{SshTarget, SshTransport};
