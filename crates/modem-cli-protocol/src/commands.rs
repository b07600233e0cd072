//! Commands that can be sent to the modem `cm` tool.
//!
//! The surface is deliberately small: SIM information and SMS management.
//! User values only ever enter a command line through [`ModemCommand::SmsSend`]
//! and [`ModemCommand::SmsGet`], and both are rendered from sanitized or
//! numeric input.

use crate::sanitize::{sanitize_message_body, sanitize_phone_number};
use std::borrow::Cow;

/// Prefix of the one command whose arguments are sensitive.
pub const SEND_PREFIX: &str = "sms send ";

/// Commands understood by the modem CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemCommand {
    /// Print SIM card information.
    SimInfo,

    /// List every stored SMS.
    SmsList,

    /// Print a single stored SMS.
    SmsGet {
        /// Storage index of the message.
        index: u32,
    },

    /// Print the number of stored SMS.
    SmsCount,

    /// Delete every stored SMS.
    SmsClear,

    /// Send a text message. Both fields are raw user input.
    SmsSend {
        /// Destination number.
        number: String,
        /// Message body.
        content: String,
    },

    /// Print incoming messages as they arrive. Never exits on its own.
    SmsMonitor,
}

impl ModemCommand {
    /// Get the command line, with user input sanitized.
    pub fn to_command_string(&self) -> String {
        match self {
            ModemCommand::SimInfo => "sim info".to_string(),
            ModemCommand::SmsList => "sms list".to_string(),
            ModemCommand::SmsGet { index } => format!("sms get {}", index),
            ModemCommand::SmsCount => "sms count".to_string(),
            ModemCommand::SmsClear => "sms clear".to_string(),
            ModemCommand::SmsSend { number, content } => format!(
                "{}{} \"{}\"",
                SEND_PREFIX,
                sanitize_phone_number(number),
                sanitize_message_body(content)
            ),
            ModemCommand::SmsMonitor => "sms monitor".to_string(),
        }
    }

    /// Whether the command produces an open-ended stream of output.
    pub fn is_streaming(&self) -> bool {
        matches!(self, ModemCommand::SmsMonitor)
    }
}

/// Form of a command line that is safe to write to logs.
///
/// `sms send` arguments (number and body) are replaced with `[REDACTED]`
/// unless `sensitive` logging was explicitly enabled.
pub fn redact_for_log(command: &str, sensitive: bool) -> Cow<'_, str> {
    if !sensitive && command.starts_with(SEND_PREFIX) {
        Cow::Owned(format!("{}[REDACTED]", SEND_PREFIX))
    } else {
        Cow::Borrowed(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_commands() {
        assert_eq!(ModemCommand::SimInfo.to_command_string(), "sim info");
        assert_eq!(ModemCommand::SmsList.to_command_string(), "sms list");
        assert_eq!(ModemCommand::SmsCount.to_command_string(), "sms count");
        assert_eq!(ModemCommand::SmsClear.to_command_string(), "sms clear");
        assert_eq!(ModemCommand::SmsMonitor.to_command_string(), "sms monitor");
        assert_eq!(ModemCommand::SmsGet { index: 12 }.to_command_string(), "sms get 12");
    }

    #[test]
    fn test_send_is_sanitized() {
        let cmd = ModemCommand::SmsSend {
            number: "+33 6 12; reboot".to_string(),
            content: "Pay $5 to \"Bob\" `now`".to_string(),
        };
        assert_eq!(
            cmd.to_command_string(),
            "sms send +33 6 12  \"Pay \\$5 to \\\"Bob\\\" \\`now\\`\""
        );
    }

    #[test]
    fn test_streaming_flag() {
        assert!(ModemCommand::SmsMonitor.is_streaming());
        assert!(!ModemCommand::SmsList.is_streaming());
    }

    #[test]
    fn test_redaction() {
        let line = "sms send +123 \"secret\"";
        assert_eq!(redact_for_log(line, false), "sms send [REDACTED]");
        assert_eq!(redact_for_log(line, true), line);
        assert_eq!(redact_for_log("sms list", false), "sms list");
        assert_eq!(redact_for_log("sms sender", false), "sms sender");
    }
}
