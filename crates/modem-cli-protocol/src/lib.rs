//! Modem `cm` CLI Protocol
//!
//! This crate provides types and utilities for talking to a cellular modem
//! through the `cm` command-line tool of its embedded Legato shell. The modem
//! has no structured API: every command prints free-form text, and this crate
//! turns that text back into typed records.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → modem): fixed command lines such as `sms list` or
//!   `sms send <number> "<text>"`, executed by a remote shell
//! - **Key/value output**: `sim info` prints `Key: Value` lines
//! - **Record blocks**: SMS listings are split into blocks, each opened by a
//!   header marker such as `--[ 2]----------`
//! - **Streams**: `sms monitor` never exits and prints a new block whenever a
//!   message arrives, in arbitrarily sized pieces
//!
//! # Input Safety
//!
//! User-supplied phone numbers and message bodies are substituted into a
//! command line that a shell will interpret. [`sanitize_phone_number`] and
//! [`sanitize_message_body`] are the only escaping layer; [`ModemCommand`]
//! applies them whenever it renders a command.
//!
//! # Example
//!
//! ```rust,ignore
//! use modem_cli_protocol::{FrameAssembler, ModemCommand};
//!
//! let line = ModemCommand::SmsMonitor.to_command_string();
//!
//! let mut assembler = FrameAssembler::new();
//! for chunk in chunks {
//!     for sms in assembler.push(&chunk) {
//!         println!("{}: {}", sms.sender, sms.text);
//!     }
//! }
//! ```

mod commands;
mod error;
mod frame;
mod records;
mod responses;
mod sanitize;
mod timestamp;

pub use commands::*;
pub use error::*;
pub use frame::*;
pub use records::*;
pub use responses::*;
pub use sanitize::*;
pub use timestamp::*;
