use crate::core::errors::ExchangeError;
use crate::core::kernel::endpoint::symbol_from_stream;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::marker::PhantomData;

/// Turns the payload of one data frame into a typed event
///
/// Control frames (ping, pong, close) never reach a decoder; they are
/// handled by the session itself.
pub trait FrameDecoder: Send + Sync + 'static {
    /// The event type handed to the caller's handler
    type Event: Send + 'static;

    /// Decode one text or binary frame
    ///
    /// # Returns
    /// - `Ok(Some(event))` - Successfully decoded event
    /// - `Ok(None)` - Frame was recognised and deliberately skipped
    /// - `Err(error)` - Frame could not be decoded; the session stays open
    fn decode(&self, payload: &[u8]) -> Result<Option<Self::Event>, ExchangeError>;
}

/// Events that carry the symbol they refer to
///
/// Combined streams do not always repeat the symbol inside the payload, so the
/// demultiplexer restores it from the stream name.
pub trait SymbolEvent {
    fn set_symbol(&mut self, symbol: String);
}

/// Decoder for raw single-stream frames: the frame body is the event
pub struct JsonDecoder<T> {
    _event: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _event: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameDecoder for JsonDecoder<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Event = T;

    fn decode(&self, payload: &[u8]) -> Result<Option<T>, ExchangeError> {
        serde_json::from_slice(payload).map(Some).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to parse stream event: {}", e))
        })
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    stream: String,
    data: Value,
}

/// Decoder for combined streams: unwraps `{"stream": ..., "data": ...}`
/// and forces the event symbol from the stream name
pub struct CombinedDecoder<T> {
    _event: PhantomData<fn() -> T>,
}

impl<T> CombinedDecoder<T> {
    pub fn new() -> Self {
        Self {
            _event: PhantomData,
        }
    }
}

impl<T> Default for CombinedDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameDecoder for CombinedDecoder<T>
where
    T: DeserializeOwned + SymbolEvent + Send + 'static,
{
    type Event = T;

    fn decode(&self, payload: &[u8]) -> Result<Option<T>, ExchangeError> {
        let envelope: Envelope = serde_json::from_slice(payload).map_err(|e| {
            ExchangeError::DeserializationError(format!(
                "Failed to parse combined stream envelope: {}",
                e
            ))
        })?;

        let mut event: T = serde_json::from_value(envelope.data).map_err(|e| {
            ExchangeError::DeserializationError(format!(
                "Failed to parse data of stream '{}': {}",
                envelope.stream, e
            ))
        })?;

        if let Some(symbol) = symbol_from_stream(&envelope.stream) {
            event.set_symbol(symbol);
        }
        Ok(Some(event))
    }
}
