//! Message buffer for accumulating partial reads.
//!
//! The reading counterpart of the writer task: splits a byte stream back
//! into length-prefixed envelopes. Uses `bytes::BytesMut` so extracted
//! envelopes share the read buffer instead of being copied.
//!
//! # Example
//!
//! ```
//! use hubwire_server::protocol::MessageBuffer;
//!
//! let mut buffer = MessageBuffer::new();
//!
//! // [0, 0, 0, 1] prefix + a MsgPack nil
//! let messages = buffer.push(&[0, 0, 0, 1, 0xc0]).unwrap();
//! assert_eq!(messages.len(), 1);
//! assert_eq!(&messages[0][..], &[0xc0]);
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{decode_length_prefix, DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_SIZE};
use crate::error::{HubError, Result};

#[derive(Debug, Clone, Copy)]
enum State {
    /// Need the 4-byte length prefix.
    WaitingForLength,
    /// Prefix consumed, need `remaining` envelope bytes.
    WaitingForBody { remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete envelopes.
pub struct MessageBuffer {
    buffer: BytesMut,
    state: State,
    max_message_size: u32,
}

impl MessageBuffer {
    /// Create a new message buffer with default settings.
    ///
    /// Default capacity: 64KB, max message: 4MB.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a new message buffer with a custom max message size.
    pub fn with_max_message_size(max_message_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete envelopes.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a length prefix exceeds the maximum.
    /// The buffer should be discarded after an error.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one()? {
            messages.push(message);
        }

        Ok(messages)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    let Some(length) = decode_length_prefix(&self.buffer) else {
                        return Ok(None);
                    };

                    if length > self.max_message_size {
                        return Err(HubError::Protocol(format!(
                            "Message size {} exceeds maximum {}",
                            length, self.max_message_size
                        )));
                    }

                    let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                    self.state = State::WaitingForBody { remaining: length };
                }

                State::WaitingForBody { remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForLength;
                    return Ok(Some(body));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
