//! Chunked output of streaming commands.

use crate::error::{ChannelError, ChannelResult};
use bytes::BytesMut;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Event produced by a streaming invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text written to standard output.
    Data(String),
    /// Text written to the error channel, or a transport failure.
    Error(String),
}

/// Sequence of text chunks from one streaming command.
///
/// Ends with `None` when the remote process closes its output. The first
/// error report fails the stream; nothing is yielded after it.
pub struct ChunkStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    label: String,
    done: bool,
}

impl ChunkStream {
    /// Wrap a receiver of stream events. `label` is the loggable command line.
    pub fn new(events: mpsc::UnboundedReceiver<StreamEvent>, label: impl Into<String>) -> Self {
        ChunkStream {
            events,
            label: label.into(),
            done: false,
        }
    }

    /// Wait for the next chunk.
    pub async fn next(&mut self) -> Option<ChannelResult<String>> {
        if self.done {
            return None;
        }

        match self.events.recv().await {
            Some(StreamEvent::Data(chunk)) => Some(Ok(chunk)),
            Some(StreamEvent::Error(message)) => {
                warn!("Error in streaming command {:?}: {}", self.label, message.trim_end());
                self.done = true;
                self.events.close();
                Some(Err(ChannelError::Stream(message)))
            }
            None => {
                info!("Stream closed for command {:?}", self.label);
                self.done = true;
                None
            }
        }
    }

    /// Loggable form of the command behind this stream.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Incremental UTF-8 decoder for pipe reads.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive. Invalid sequences are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: BytesMut,
}

impl Utf8Decoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Utf8Decoder { pending: BytesMut::new() }
    }

    /// Decode as much of the buffered input as forms complete characters.
    pub fn decode(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);

        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // An incomplete sequence at the very end: keep it for the next read.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => incomplete_tail_start(&self.pending),
        };

        let ready = self.pending.split_to(complete);
        String::from_utf8_lossy(&ready).into_owned()
    }

    /// Flush whatever is left, replacing a dangling partial character.
    pub fn finish(&mut self) -> String {
        let rest = self.pending.split();
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Start of a trailing partial UTF-8 sequence, or the buffer length if there is none.
fn incomplete_tail_start(bytes: &[u8]) -> usize {
    // A UTF-8 sequence is at most 4 bytes, so only the last 3 can start an unfinished one.
    for back in 1..=bytes.len().min(3) {
        let i = bytes.len() - back;
        let byte = bytes[i];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { i } else { bytes.len() };
    }
    bytes.len()
}
