//! RFC 3164 (BSD syslog) lines: `<PRI>Mmm dd hh:mm:ss host message`.

use chrono::{Datelike, Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use super::{deliver, Codec, Decoder, Encoder, FrameReader, NotifyTarget};
use crate::buffer::Buffer;
use crate::error::Result;

const MAX_SEVERITY: u8 = 7;
const MAX_FACILITY: u8 = 23;

/// Highest valid priority value (`facility * 8 + severity`)
pub const MAX_PRI: u8 = MAX_FACILITY * 8 + MAX_SEVERITY;

/// Priority assumed when a line carries none (user.notice)
pub const DEFAULT_PRI: u8 = 13;

/// Width of `Mmm dd hh:mm:ss`
const TIMESTAMP_LEN: usize = 15;

/// Longest `<PRI>` prefix, brackets included
const MAX_PRI_LEN: usize = 5;

/// One decoded syslog line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyslogMessage {
    /// The line as received, without the newline
    pub raw: String,
    pub priority: u8,
    pub facility: u8,
    pub severity: u8,
    /// Timestamp in the decoder's current year; `None` when absent or unparseable
    pub timestamp: Option<NaiveDateTime>,
    pub host: Option<String>,
    pub message: String,
}

impl SyslogMessage {
    fn with_priority(raw: String, priority: u8) -> Self {
        Self {
            raw,
            priority,
            facility: priority / 8,
            severity: priority % 8,
            timestamp: None,
            host: None,
            message: String::new(),
        }
    }
}

/// Newline-framed RFC 3164 decoder. Lines whose priority prefix is broken are
/// logged and dropped; decoding resumes at the next line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyslogCodec;

impl SyslogCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct SyslogDecoder {
    frames: FrameReader,
    target: Option<NotifyTarget>,
    year: i32,
}

impl Decoder for SyslogDecoder {
    type Output = SyslogMessage;

    fn decode(&mut self, buffer: &mut Buffer) -> Result<Option<SyslogMessage>> {
        while let Some(line) = self.frames.next_frame(buffer)? {
            if line.is_empty() {
                continue;
            }
            let Some(message) = parse_line(&line, self.year) else {
                continue;
            };
            if let Some(message) = deliver(self.target.as_ref(), message)? {
                return Ok(Some(message));
            }
        }
        if !self.frames.pending().is_empty() {
            debug!(pending = self.frames.pending().len(), "Partial syslog line buffered");
        }
        Ok(None)
    }

    fn finish(&mut self) -> Result<Option<SyslogMessage>> {
        let Some(line) = self.frames.take_pending() else {
            return Ok(None);
        };
        match parse_line(&line, self.year) {
            Some(message) => deliver(self.target.as_ref(), message),
            None => Ok(None),
        }
    }
}

fn parse_line(line: &[u8], year: i32) -> Option<SyslogMessage> {
    let mut buf = Buffer::wrap(line);
    buf.flip();
    let text = buf.as_string();

    let mut priority = DEFAULT_PRI;
    let mut start = 0;
    if buf.first() == Some(b'<') {
        let parsed = buf
            .index_of(b'>')
            .filter(|&close| close < MAX_PRI_LEN)
            .and_then(|close| Some((close, buf.parse_int(1, close)?)));
        let Some((close, value)) = parsed else {
            warn!(line = %text, "Malformed syslog priority, line dropped");
            return None;
        };
        // An out-of-range priority falls back to the default
        if (0..=i64::from(MAX_PRI)).contains(&value) {
            priority = u8::try_from(value).unwrap_or(DEFAULT_PRI);
        }
        start = close + 1;
    }

    let mut msg = SyslogMessage::with_priority(text.clone(), priority);
    msg.timestamp = parse_timestamp(&mut buf, start, year);
    if msg.timestamp.is_some() {
        start += TIMESTAMP_LEN + 1;
        let rest = text.get(start..).unwrap_or_default();
        match rest.split_once(' ') {
            Some((host, message)) => {
                msg.host = Some(host.to_string());
                msg.message = message.to_string();
            }
            None => msg.host = Some(rest.to_string()),
        }
    } else {
        msg.message = text.get(start..).unwrap_or_default().to_string();
    }
    Some(msg)
}

/// Parse `Mmm dd hh:mm:ss` at `start`. The cursors are rolled back afterwards
/// whether or not the parse succeeded.
fn parse_timestamp(buf: &mut Buffer, start: usize, year: i32) -> Option<NaiveDateTime> {
    buf.snapshot();
    let parsed = buf
        .set_position(start)
        .ok()
        .and_then(|b| b.read_bytes(TIMESTAMP_LEN).ok())
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(|window| {
            let mut parts = window.split_whitespace();
            let (month, day, time) = (parts.next()?, parts.next()?, parts.next()?);
            NaiveDateTime::parse_from_str(
                &format!("{} {} {} {}", year, month, day, time),
                "%Y %b %d %H:%M:%S",
            )
            .ok()
        });
    buf.reset();
    parsed
}

struct SyslogEncoder;

impl Encoder for SyslogEncoder {
    type Input = SyslogMessage;

    /// Render `<PRI>[timestamp host ]message\n`
    fn encode(&mut self, value: &SyslogMessage) -> Result<Option<Buffer>> {
        let mut line = format!("<{}>", value.priority);
        if let Some(ts) = value.timestamp {
            line.push_str(&ts.format("%b %e %H:%M:%S ").to_string());
            if let Some(host) = &value.host {
                line.push_str(host);
                line.push(' ');
            }
        }
        line.push_str(&value.message);
        line.push('\n');
        let mut buf = Buffer::wrap(line);
        buf.flip();
        Ok(Some(buf))
    }
}

impl Codec for SyslogCodec {
    type Input = SyslogMessage;
    type Output = SyslogMessage;

    fn decoder(&self, target: Option<NotifyTarget>) -> Box<dyn Decoder<Output = SyslogMessage>> {
        Box::new(SyslogDecoder {
            frames: FrameReader::new(b'\n', false),
            target,
            year: Local::now().year(),
        })
    }

    fn encoder(&self) -> Box<dyn Encoder<Input = SyslogMessage>> {
        Box::new(SyslogEncoder)
    }
}
