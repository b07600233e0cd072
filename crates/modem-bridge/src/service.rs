//! SIM and SMS operations on top of the command channel.
//!
//! These are the operations the upstream API exposes; each one is a single
//! `cm` invocation followed by parsing of its output.

use crate::channel::RemoteCommandChannel;
use crate::error::ChannelResult;
use crate::monitor::{MonitorSession, MonitorSubscription};
use modem_cli_protocol::{
    parse_removed_sms_count, parse_sim_info, parse_sms_count, parse_sms_list, validate_outbound,
    ModemCommand, SimInfoRecord, SmsRecord,
};
use tracing::info;

/// Typed access to the modem.
#[derive(Clone)]
pub struct ModemService {
    channel: RemoteCommandChannel,
}

impl ModemService {
    /// Create a service over a connected channel.
    pub fn new(channel: RemoteCommandChannel) -> Self {
        ModemService { channel }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &RemoteCommandChannel {
        &self.channel
    }

    /// SIM card information.
    pub async fn sim_info(&self) -> ChannelResult<SimInfoRecord> {
        let output = self.channel.run_command(&ModemCommand::SimInfo).await?;
        Ok(parse_sim_info(&output)?)
    }

    /// Every stored text message, in modem order.
    pub async fn list_messages(&self) -> ChannelResult<Vec<SmsRecord>> {
        let output = self.channel.run_command(&ModemCommand::SmsList).await?;
        Ok(parse_sms_list(&output))
    }

    /// Number of stored messages as reported by the modem.
    pub async fn message_count(&self) -> ChannelResult<u32> {
        let output = self.channel.run_command(&ModemCommand::SmsCount).await?;
        Ok(parse_sms_count(&output))
    }

    /// The most recently received message, if any.
    pub async fn latest_message(&self) -> ChannelResult<Option<SmsRecord>> {
        let messages = self.list_messages().await?;
        Ok(latest(messages))
    }

    /// The message stored at `index`, if it exists and is a text message.
    pub async fn message(&self, index: u32) -> ChannelResult<Option<SmsRecord>> {
        let output = self.channel.run_command(&ModemCommand::SmsGet { index }).await?;
        Ok(parse_sms_list(&output).into_iter().next())
    }

    /// Delete every stored message. Returns how many were removed.
    pub async fn clear_messages(&self) -> ChannelResult<u32> {
        let output = self.channel.run_command(&ModemCommand::SmsClear).await?;
        let removed = parse_removed_sms_count(&output);
        info!("Removed {} stored SMS", removed);
        Ok(removed)
    }

    /// Send a text message.
    ///
    /// Input is validated before any command is built; a rejected number or
    /// body never reaches the modem.
    pub async fn send_message(&self, number: &str, content: &str) -> ChannelResult<()> {
        validate_outbound(number, content)?;

        let command = ModemCommand::SmsSend {
            number: number.to_string(),
            content: content.to_string(),
        };
        self.channel.run_command(&command).await?;
        Ok(())
    }

    /// Start a monitor session for one subscriber.
    pub fn monitor(&self) -> MonitorSubscription {
        MonitorSession::new(self.channel.clone()).spawn()
    }
}

/// Latest message by timestamp; the higher index wins a tie.
fn latest(messages: Vec<SmsRecord>) -> Option<SmsRecord> {
    messages
        .into_iter()
        .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.index.cmp(&b.index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use modem_cli_protocol::TEXT_FORMAT;

    fn sms(index: u32, hour: u32) -> SmsRecord {
        SmsRecord {
            index,
            sms_type: "LE_SMS_TYPE_RX".to_string(),
            sender: "+1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 8, hour, 0, 0).unwrap(),
            format: TEXT_FORMAT.to_string(),
            text: "x".to_string(),
            text_length: 1,
        }
    }

    #[test]
    fn test_latest_by_timestamp() {
        let picked = latest(vec![sms(0, 9), sms(4, 12), sms(2, 10)]).unwrap();
        assert_eq!(picked.index, 4);
    }

    #[test]
    fn test_latest_tie_prefers_higher_index() {
        let picked = latest(vec![sms(5, 9), sms(1, 9)]).unwrap();
        assert_eq!(picked.index, 5);
    }

    #[test]
    fn test_latest_empty() {
        assert!(latest(Vec::new()).is_none());
    }
}
