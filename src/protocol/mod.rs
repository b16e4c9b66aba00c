//! Protocol module - response envelopes and stream framing.
//!
//! - MsgPack response envelopes (3-element success, 4-element error)
//! - Pooled buffers for building them
//! - 4-byte length prefix and a buffer for splitting the stream back up

pub mod buffer_pool;
mod message_buffer;
mod response;
mod wire_format;

pub use buffer_pool::PooledBuffer;
pub use message_buffer::MessageBuffer;
pub use response::{build_error, build_nil_success, build_success, ResponseFrame};
pub use wire_format::{
    decode_length_prefix, encode_length_prefix, ABSOLUTE_MAX_MESSAGE_SIZE,
    DEFAULT_MAX_MESSAGE_SIZE, ERROR_FRAME_LEN, FIRE_AND_FORGET_ID, LENGTH_PREFIX_SIZE,
    SUCCESS_FRAME_LEN,
};
