//! Record block framing for `sms list`, `sms get` and `sms monitor` output.
//!
//! SMS output is a sequence of blocks, each opened by a header marker:
//!
//! ```text
//! --[ 2]---------------------------------------------------------------
//!  Type:                         LE_SMS_TYPE_RX
//!  Sender:                       +1234567890
//!  Timestamp:                    26/01/08,21:47:12+04
//!  Format:                       LE_SMS_FORMAT_TEXT
//!  Text (15):                    Test message 123
//! ```
//!
//! A block ends where the next header starts. For a finished command the last
//! block ends with the output; for a stream it is only known to be complete
//! once the following header has been seen, which is what [`FrameAssembler`]
//! tracks.

use crate::error::{ProtocolError, ProtocolResult};
use crate::records::{SmsRecord, TEXT_FORMAT};
use crate::timestamp::decode_timestamp;
use regex::Regex;
use std::sync::OnceLock;

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"--\[\s*(\d+)\s*\]-+").expect("header pattern is valid"))
}

fn text_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^Text \((\d+)\):\s*(.*)").expect("text pattern is valid"))
}

/// One header-delimited block of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordBlock<'a> {
    /// Index from the header marker, as printed.
    pub index: &'a str,
    /// Everything between this header and the next one.
    pub body: &'a str,
}

/// Split output into header-delimited blocks.
///
/// Text before the first header is not part of any block. The last block
/// runs to the end of `text`.
pub fn split_blocks(text: &str) -> Vec<RecordBlock<'_>> {
    let headers: Vec<_> = header_pattern().captures_iter(text).collect();
    let mut blocks = Vec::with_capacity(headers.len());

    for (i, caps) in headers.iter().enumerate() {
        let (Some(marker), Some(index)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        blocks.push(RecordBlock {
            index: index.as_str(),
            body: &text[marker.end()..end],
        });
    }

    blocks
}

/// Byte offset of the last header marker in `text`, if any.
pub fn last_header_start(text: &str) -> Option<usize> {
    header_pattern().find_iter(text).last().map(|m| m.start())
}

/// Parse one block into an SMS.
///
/// Returns `Ok(None)` for blocks in a format other than [`TEXT_FORMAT`] and
/// an error when a required field is missing or malformed.
pub fn parse_block(block: &RecordBlock<'_>) -> ProtocolResult<Option<SmsRecord>> {
    let index: u32 = block
        .index
        .parse()
        .map_err(|_| ProtocolError::ParseError(format!("invalid block index {:?}", block.index)))?;

    let mut sms_type = None;
    let mut sender = None;
    let mut raw_timestamp = None;
    let mut format = None;
    let mut text = None;

    for line in block.body.lines() {
        let line = line.trim();

        if let Some(value) = line.strip_prefix("Type:") {
            sms_type = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("Sender:") {
            sender = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("Timestamp:") {
            raw_timestamp = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("Format:") {
            format = Some(value.trim());
        } else if let Some(caps) = text_line_pattern().captures(line) {
            // Digits that overflow u32 leave the field unset.
            if let Ok(length) = caps[1].parse::<u32>() {
                text = Some((length, caps.get(2).map_or("", |m| m.as_str())));
            }
        }
    }

    if format != Some(TEXT_FORMAT) {
        return Ok(None);
    }

    let sms_type = sms_type.ok_or(ProtocolError::MissingField("Type"))?;
    let sender = sender.ok_or(ProtocolError::MissingField("Sender"))?;
    let raw_timestamp = raw_timestamp.ok_or(ProtocolError::MissingField("Timestamp"))?;
    let timestamp = decode_timestamp(raw_timestamp)
        .ok_or_else(|| ProtocolError::InvalidTimestamp(raw_timestamp.to_string()))?;
    let (text_length, text) = text.ok_or(ProtocolError::MissingField("Text"))?;

    Ok(Some(SmsRecord {
        index,
        sms_type: sms_type.to_string(),
        sender: sender.to_string(),
        timestamp,
        format: TEXT_FORMAT.to_string(),
        text: text.to_string(),
        text_length,
    }))
}

/// Parse complete `sms list` / `sms get` output.
///
/// Blocks that fail validation are logged and skipped; non-text blocks are
/// dropped silently. Records come back in block order.
pub fn parse_sms_list(output: &str) -> Vec<SmsRecord> {
    let mut records = Vec::new();

    for block in split_blocks(output) {
        match parse_block(&block) {
            Ok(Some(sms)) => records.push(sms),
            Ok(None) => {}
            Err(e) => log::warn!("skipping SMS block {}: {}", block.index, e),
        }
    }

    records
}

/// Incremental framer for streamed SMS output.
///
/// Chunks are appended to an internal buffer. A block is only parsed once a
/// later header proves it closed; the still-open tail stays buffered until
/// more data arrives or [`FrameAssembler::finish`] is called.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    /// Text that has not been proven closed by a following header.
    buffer: String,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        FrameAssembler { buffer: String::new() }
    }

    /// Append a chunk and return the SMS records of every block it closed.
    pub fn push(&mut self, chunk: &str) -> Vec<SmsRecord> {
        self.buffer.push_str(chunk);

        let cut = match last_header_start(&self.buffer) {
            Some(start) if start > 0 => start,
            _ => return Vec::new(),
        };

        let closed: String = self.buffer.drain(..cut).collect();
        parse_sms_list(&closed)
    }

    /// Signal end of stream: parse and return whatever is still buffered.
    pub fn finish(&mut self) -> Vec<SmsRecord> {
        let rest = std::mem::take(&mut self.buffer);
        parse_sms_list(&rest)
    }

    /// Text retained while waiting for the next header.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
