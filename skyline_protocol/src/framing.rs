// Channel-prefixed line framing.
//
// The simulation server publishes its events through a logging handler that
// writes one record per line in the form `<channel>:<json>`, e.g.
//
//   buildings:{"id": 0, "event": "added_tenant", "tenant": {"id": 7, "type": "Hospital"}}
//
// The channel is everything before the first `:`; the payload is the rest of
// the line, left as raw JSON text. This module only splits lines. Turning a
// payload into a typed message is `message.rs`'s job, which keeps framing
// usable for channels the mirror does not understand (they are skipped
// later, not rejected here).
//
// `MAX_LINE_SIZE` (16 MB) bounds a single record. The `setup` bootstrap,
// which carries the whole population, is the largest expected line.

use std::io::{self, BufRead, Read};

use thiserror::Error;

/// Maximum accepted line length in bytes, excluding the line terminator.
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// One framed record: a channel name and its undecoded JSON payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub channel: String,
    pub payload: String,
}

impl Frame {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Render the frame as a wire line (without the trailing newline).
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.channel, self.payload)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("line has no channel separator")]
    MissingSeparator,
    #[error("line has an empty or malformed channel name")]
    BadChannel,
    #[error("channel `{0}` carries an empty payload")]
    EmptyPayload(String),
    #[error("line too large: {0} bytes (max {MAX_LINE_SIZE})")]
    TooLarge(usize),
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// Split one line into a `Frame`. Trailing `\r`/`\n` are ignored.
pub fn decode_line(line: &str) -> Result<Frame, FrameError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.len() > MAX_LINE_SIZE {
        return Err(FrameError::TooLarge(line.len()));
    }
    let (channel, payload) = line.split_once(':').ok_or(FrameError::MissingSeparator)?;
    let channel = channel.trim();
    if channel.is_empty()
        || !channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '/')
    {
        return Err(FrameError::BadChannel);
    }
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload(channel.to_owned()));
    }
    Ok(Frame::new(channel, payload))
}

/// Iterator over the frames of a line-oriented stream.
///
/// Blank lines are skipped. A bad line yields an `Err` item and iteration
/// continues with the next line; only end of stream stops it.
pub struct FrameReader<R> {
    reader: R,
    buf: String,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            let limit = (MAX_LINE_SIZE + 2) as u64;
            let read = match self.reader.by_ref().take(limit).read_line(&mut self.buf) {
                Ok(n) => n,
                Err(e) => return Some(Err(FrameError::Io(e))),
            };
            if read == 0 {
                return None;
            }
            if !self.buf.ends_with('\n') && read as u64 == limit {
                // Discard the rest of the oversized line before reporting it.
                let mut sink = Vec::new();
                if let Err(e) = self.reader.read_until(b'\n', &mut sink) {
                    return Some(Err(FrameError::Io(e)));
                }
                return Some(Err(FrameError::TooLarge(read + sink.len())));
            }
            if self.buf.trim().is_empty() {
                continue;
            }
            return Some(decode_line(&self.buf));
        }
    }
}
