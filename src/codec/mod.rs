//! # Codec Module
//!
//! Conversions between raw [`Buffer`]s and typed values, for transport code
//! sitting in front of a [`Reactor`].
//!
//! A [`Codec`] hands out stateful [`Decoder`]s and [`Encoder`]s. A decoder is
//! fed buffers as bytes arrive and may be given a notify target:
//!
//! - without a target, each `decode` call returns at most one value and leaves
//!   the rest of the buffer for the next call;
//! - with a target, every complete value in the buffer is published with
//!   [`Reactor::notify`] and `decode` returns `None`.
//!
//! In both modes a partial trailing frame is kept inside the decoder until
//! the bytes that complete it arrive. At end of input, [`Decoder::finish`]
//! decodes that held-back frame as if it had been terminated.
//!
//! | Codec | Values | Framing | Malformed input |
//! |-------|--------|---------|-----------------|
//! | [`DelimitedCodec`] | `String` | delimiter byte | n/a |
//! | [`JsonCodec`] | any serde type | whole buffer | `Codec` error |
//! | [`SyslogCodec`] | [`SyslogMessage`] | `\n` | line dropped |

mod delimited;
mod json;
mod syslog;

pub use delimited::DelimitedCodec;
pub use json::JsonCodec;
pub use syslog::{SyslogCodec, SyslogMessage, DEFAULT_PRI, MAX_PRI};

use std::any::Any;
use std::mem;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::event::Event;
use crate::reactor::Reactor;
use crate::selector::Key;

/// Where a decoder publishes values instead of returning them
pub type NotifyTarget = (Key, Reactor);

/// Stateful byte-to-value conversion
pub trait Decoder: Send {
    type Output;

    /// Consume bytes from `buffer`. `None` means more input is needed, or the
    /// decoded values went to the notify target.
    fn decode(&mut self, buffer: &mut Buffer) -> Result<Option<Self::Output>>;

    /// Input is exhausted: decode whatever partial frame is still held back.
    fn finish(&mut self) -> Result<Option<Self::Output>> {
        Ok(None)
    }
}

/// Value-to-byte conversion
pub trait Encoder: Send {
    type Input;

    /// A read-mode buffer holding the encoded value, or `None` when this codec
    /// does not encode
    fn encode(&mut self, value: &Self::Input) -> Result<Option<Buffer>>;
}

pub trait Codec: Send + Sync {
    type Input;
    type Output;

    fn decoder(&self, target: Option<NotifyTarget>) -> Box<dyn Decoder<Output = Self::Output>>;

    fn encoder(&self) -> Box<dyn Encoder<Input = Self::Input>>;
}

/// Return `value`, or publish it when there is a target
pub(crate) fn deliver<T>(target: Option<&NotifyTarget>, value: T) -> Result<Option<T>>
where
    T: Any + Send + Sync,
{
    match target {
        Some((key, reactor)) => {
            reactor.notify(key.clone(), Event::wrap(value))?;
            Ok(None)
        }
        None => Ok(Some(value)),
    }
}

/// Cuts delimiter-terminated frames out of successive buffers, carrying a
/// partial trailing frame over to the next call.
#[derive(Debug, Clone)]
pub(crate) struct FrameReader {
    delimiter: u8,
    include_delimiter: bool,
    remainder: Vec<u8>,
}

impl FrameReader {
    pub(crate) fn new(delimiter: u8, include_delimiter: bool) -> Self {
        Self {
            delimiter,
            include_delimiter,
            remainder: Vec::new(),
        }
    }

    /// Bytes of an unfinished frame waiting for its delimiter
    pub(crate) fn pending(&self) -> &[u8] {
        &self.remainder
    }

    /// Hand out the unterminated trailing frame, if any, leaving the reader empty
    pub(crate) fn take_pending(&mut self) -> Option<Vec<u8>> {
        (!self.remainder.is_empty()).then(|| mem::take(&mut self.remainder))
    }

    /// Next complete frame. Consumes the frame and its delimiter from `buffer`;
    /// a trailing partial frame is consumed into the remainder.
    pub(crate) fn next_frame(&mut self, buffer: &mut Buffer) -> Result<Option<Vec<u8>>> {
        if !buffer.is_reading() {
            buffer.flip();
        }
        let (frame, resume_at) = {
            let mut split = buffer.split(self.delimiter, self.include_delimiter);
            let Some(view) = split.next() else {
                return Ok(None);
            };
            if !view.is_terminated() {
                self.remainder.extend_from_slice(view.as_bytes());
                (None, split.cursor())
            } else {
                let mut frame = mem::take(&mut self.remainder);
                frame.extend_from_slice(view.as_bytes());
                (Some(frame), split.cursor())
            }
        };
        buffer.set_position(resume_at)?;
        Ok(frame)
    }
}
