//! Parsing of one-shot command output.
//!
//! - `sim info`: `Key: Value` lines
//! - `sms count`: a bare integer
//! - `sms clear`: `Removed N SMS messages.` or `No stored SMS.`

use crate::error::{ProtocolError, ProtocolResult};
use crate::records::SimInfoRecord;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn removed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Removed (\d+) SMS").expect("removed pattern is valid"))
}

/// Split `Key: Value` lines at the first colon. Lines without a colon are ignored.
pub fn parse_key_values(output: &str) -> HashMap<&str, &str> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}

/// Parse `sim info` output.
///
/// ```text
/// Type:                 EXTERNAL_SLOT_1
/// ICCID:                89330000000000000000
/// Home Network Operator: Orange F
/// EID:
/// IMSI:                 208010000000000
/// Phone Number:         +33600000000
/// ```
pub fn parse_sim_info(output: &str) -> ProtocolResult<SimInfoRecord> {
    let fields = parse_key_values(output);
    let field = |name: &'static str| -> ProtocolResult<String> {
        fields
            .get(name)
            .map(|v| v.to_string())
            .ok_or(ProtocolError::MissingField(name))
    };

    Ok(SimInfoRecord {
        sim_type: field("Type")?,
        iccid: field("ICCID")?,
        home_network_operator: field("Home Network Operator")?,
        eid: field("EID")?,
        imsi: field("IMSI")?,
        phone_number: field("Phone Number")?,
    })
}

/// Number of messages deleted by `sms clear`. Anything unrecognized counts as 0.
pub fn parse_removed_sms_count(output: &str) -> u32 {
    removed_pattern()
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Number of stored messages from `sms count`. Anything unrecognized counts as 0.
pub fn parse_sms_count(output: &str) -> u32 {
    output.trim().parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIM_INFO: &str = "\
Type:                   EXTERNAL_SLOT_1
ICCID:                  89330000000000000000
Home Network Operator:  Orange F
EID:
IMSI:                   208010000000000
Phone Number:           +33600000000
";

    #[test]
    fn test_parse_sim_info() {
        let info = parse_sim_info(SIM_INFO).unwrap();
        assert_eq!(info.sim_type, "EXTERNAL_SLOT_1");
        assert_eq!(info.iccid, "89330000000000000000");
        assert_eq!(info.home_network_operator, "Orange F");
        assert_eq!(info.eid, "");
        assert_eq!(info.imsi, "208010000000000");
        assert_eq!(info.phone_number, "+33600000000");
    }

    #[test]
    fn test_parse_sim_info_missing_field() {
        let output = SIM_INFO.replace("IMSI:                   208010000000000\n", "");
        assert_eq!(parse_sim_info(&output), Err(ProtocolError::MissingField("IMSI")));
    }

    #[test]
    fn test_removed_count() {
        assert_eq!(parse_removed_sms_count("Removed 3 SMS messages."), 3);
        assert_eq!(parse_removed_sms_count("Removed 1 SMS messages."), 1);
        assert_eq!(parse_removed_sms_count("Removed 15 SMS messages."), 15);
        assert_eq!(parse_removed_sms_count("Removed 0 SMS messages."), 0);
    }

    #[test]
    fn test_removed_count_unrecognized() {
        for output in [
            "No stored SMS.",
            "Error occurred",
            "Invalid response",
            "",
            "Removed SMS messages.",
            "3 messages removed",
        ] {
            assert_eq!(parse_removed_sms_count(output), 0, "output {:?}", output);
        }
    }

    #[test]
    fn test_sms_count() {
        assert_eq!(parse_sms_count("4\n"), 4);
        assert_eq!(parse_sms_count("  0 "), 0);
        assert_eq!(parse_sms_count("not a number"), 0);
    }
}
