use super::{deliver, Codec, Decoder, Encoder, FrameReader, NotifyTarget};
use crate::buffer::Buffer;
use crate::error::Result;

/// Text frames separated by a delimiter byte (newline by default)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimitedCodec {
    delimiter: u8,
    strip_delimiter: bool,
}

impl Default for DelimitedCodec {
    fn default() -> Self {
        Self::new(b'\n', true)
    }
}

impl DelimitedCodec {
    /// With `strip_delimiter`, decoded frames exclude the delimiter
    #[must_use]
    pub fn new(delimiter: u8, strip_delimiter: bool) -> Self {
        Self {
            delimiter,
            strip_delimiter,
        }
    }

    #[must_use]
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

struct DelimitedDecoder {
    frames: FrameReader,
    target: Option<NotifyTarget>,
}

impl Decoder for DelimitedDecoder {
    type Output = String;

    fn decode(&mut self, buffer: &mut Buffer) -> Result<Option<String>> {
        while let Some(frame) = self.frames.next_frame(buffer)? {
            let line = String::from_utf8_lossy(&frame).into_owned();
            if let Some(line) = deliver(self.target.as_ref(), line)? {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    fn finish(&mut self) -> Result<Option<String>> {
        let Some(frame) = self.frames.take_pending() else {
            return Ok(None);
        };
        deliver(self.target.as_ref(), String::from_utf8_lossy(&frame).into_owned())
    }
}

struct DelimitedEncoder {
    delimiter: u8,
}

impl Encoder for DelimitedEncoder {
    type Input = String;

    fn encode(&mut self, value: &String) -> Result<Option<Buffer>> {
        let mut buf = Buffer::with_capacity(value.len() + 1, false);
        buf.append(value)?.append_byte(self.delimiter)?;
        buf.flip();
        Ok(Some(buf))
    }
}

impl Codec for DelimitedCodec {
    type Input = String;
    type Output = String;

    fn decoder(&self, target: Option<NotifyTarget>) -> Box<dyn Decoder<Output = String>> {
        Box::new(DelimitedDecoder {
            frames: FrameReader::new(self.delimiter, !self.strip_delimiter),
            target,
        })
    }

    fn encoder(&self) -> Box<dyn Encoder<Input = String>> {
        Box::new(DelimitedEncoder {
            delimiter: self.delimiter,
        })
    }
}
