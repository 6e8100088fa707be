//! Line-oriented event-stream reading.
//!
//! Only lines starting with `data:` carry payloads; everything else
//! (comments, `event:` and `id:` fields, blank separators) is skipped.
//! A `[DONE]` payload ends the stream.

use std::ops::ControlFlow;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// End-of-stream marker used by OpenAI-compatible APIs.
pub const DONE_MARKER: &str = "[DONE]";

/// A meaningful line of an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLine<'a> {
    Data(&'a str),
    Done,
}

/// Classify one line. Returns `None` for lines without a data payload.
pub fn parse_line(line: &str) -> Option<StreamLine<'_>> {
    let payload = line.trim_end_matches('\r').strip_prefix("data:")?.trim();
    if payload.is_empty() {
        None
    } else if payload == DONE_MARKER {
        Some(StreamLine::Done)
    } else {
        Some(StreamLine::Data(payload))
    }
}

/// Splits a byte stream into complete lines.
///
/// Works on raw bytes so multi-byte characters split across network
/// chunks are reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Feed every data payload of `response` to `on_data` until the stream
/// ends, a `[DONE]` marker arrives, or `on_data` breaks.
///
/// Cancellation is checked between network reads.
pub async fn read_data_lines<F>(
    response: reqwest::Response,
    cancel: &CancellationToken,
    mut on_data: F,
) -> Result<(), ProviderError>
where
    F: FnMut(&str) -> Result<ControlFlow<()>, ProviderError>,
{
    let mut stream = response.bytes_stream();
    let mut buffer = LineBuffer::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            chunk = stream.next() => chunk,
        };

        let finished = chunk.is_none();
        let lines = match chunk {
            Some(bytes) => buffer.push(&bytes?),
            None => buffer.finish().into_iter().collect(),
        };

        for line in &lines {
            match parse_line(line) {
                Some(StreamLine::Done) => return Ok(()),
                Some(StreamLine::Data(payload)) => {
                    if on_data(payload)?.is_break() {
                        return Ok(());
                    }
                }
                None => {}
            }
        }

        if finished {
            return Ok(());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
