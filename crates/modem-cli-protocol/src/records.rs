//! Records reconstructed from modem CLI output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `Format:` value of a plain text SMS. Blocks in any other format are dropped.
pub const TEXT_FORMAT: &str = "LE_SMS_FORMAT_TEXT";

/// SIM card information from `sim info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimInfoRecord {
    /// SIM type (e.g. `EMBEDDED`).
    #[serde(rename = "type")]
    pub sim_type: String,
    /// Integrated circuit card identifier.
    pub iccid: String,
    /// Name of the home network operator.
    pub home_network_operator: String,
    /// eUICC identifier.
    pub eid: String,
    /// International mobile subscriber identity.
    pub imsi: String,
    /// Phone number assigned to the SIM.
    pub phone_number: String,
}

/// One stored or incoming text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRecord {
    /// Storage index assigned by the modem. Not necessarily contiguous.
    pub index: u32,
    /// Message type (e.g. `LE_SMS_TYPE_RX`).
    #[serde(rename = "type")]
    pub sms_type: String,
    /// Originating address.
    pub sender: String,
    /// Service centre timestamp as an absolute instant.
    #[serde(with = "utc_millis")]
    pub timestamp: DateTime<Utc>,
    /// Message format, always [`TEXT_FORMAT`] for parsed records.
    pub format: String,
    /// Message body.
    pub text: String,
    /// Length reported by the modem in the `Text (<n>):` line.
    pub text_length: u32,
}

/// A record parsed from modem output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum Record {
    /// SIM card information.
    SimInfo(SimInfoRecord),
    /// A text message.
    Sms(SmsRecord),
}

impl From<SimInfoRecord> for Record {
    fn from(info: SimInfoRecord) -> Self {
        Record::SimInfo(info)
    }
}

impl From<SmsRecord> for Record {
    fn from(sms: SmsRecord) -> Self {
        Record::Sms(sms)
    }
}

/// Renders timestamps as `2026-01-08T20:47:12.000Z`.
mod utc_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
