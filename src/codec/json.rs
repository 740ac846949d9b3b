use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use super::{deliver, Codec, Decoder, Encoder, NotifyTarget};
use crate::buffer::Buffer;
use crate::error::{ReactorError, Result};

/// One JSON document per buffer, decoded into `In` and encoded from `Out`.
///
/// JSON has no framing to resynchronize on, so a malformed document is a
/// [`ReactorError::Codec`] error. The bytes are consumed either way.
pub struct JsonCodec<In = serde_json::Value, Out = serde_json::Value> {
    _types: PhantomData<fn() -> (In, Out)>,
}

impl<In, Out> JsonCodec<In, Out> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<In, Out> Default for JsonCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> fmt::Debug for JsonCodec<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

struct JsonDecoder<T> {
    target: Option<NotifyTarget>,
    _type: PhantomData<fn() -> T>,
}

impl<T> Decoder for JsonDecoder<T>
where
    T: DeserializeOwned + Any + Send + Sync,
{
    type Output = T;

    fn decode(&mut self, buffer: &mut Buffer) -> Result<Option<T>> {
        if !buffer.is_reading() {
            buffer.flip();
        }
        if buffer.is_empty() {
            return Ok(None);
        }
        let parsed = serde_json::from_slice::<T>(buffer.as_bytes());
        buffer.skip(buffer.remaining());
        let value = parsed.map_err(|e| ReactorError::codec(format!("malformed JSON: {}", e)))?;
        deliver(self.target.as_ref(), value)
    }
}

struct JsonEncoder<T> {
    _type: PhantomData<fn(T)>,
}

impl<T: Serialize> Encoder for JsonEncoder<T> {
    type Input = T;

    fn encode(&mut self, value: &T) -> Result<Option<Buffer>> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ReactorError::codec(format!("cannot encode JSON: {}", e)))?;
        let mut buf = Buffer::wrap(bytes);
        buf.flip();
        Ok(Some(buf))
    }
}

impl<In, Out> Codec for JsonCodec<In, Out>
where
    In: DeserializeOwned + Any + Send + Sync,
    Out: Serialize + 'static,
{
    type Input = Out;
    type Output = In;

    fn decoder(&self, target: Option<NotifyTarget>) -> Box<dyn Decoder<Output = In>> {
        Box::new(JsonDecoder {
            target,
            _type: PhantomData,
        })
    }

    fn encoder(&self) -> Box<dyn Encoder<Input = Out>> {
        Box::new(JsonEncoder {
            _type: PhantomData,
        })
    }
}
