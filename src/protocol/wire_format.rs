//! Stream-level wire format.
//!
//! Each response envelope travels on the duplex stream as one message:
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ Length       │ Envelope (MsgPack array)     │
//! │ 4 bytes      │ `length` bytes               │
//! │ uint32 BE    │                              │
//! └──────────────┴──────────────────────────────┘
//! ```

use crate::error::{HubError, Result};

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum envelope size accepted by [`MessageBuffer`](super::MessageBuffer) (4 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 4 * 1024 * 1024;

/// Absolute maximum envelope size (~2 GB, max i32).
pub const ABSOLUTE_MAX_MESSAGE_SIZE: u32 = 2_147_483_647;

/// Invocation id reserved for calls that expect no response.
pub const FIRE_AND_FORGET_ID: i32 = -1;

/// Number of elements in a success envelope.
pub const SUCCESS_FRAME_LEN: usize = 3;

/// Number of elements in an error envelope.
pub const ERROR_FRAME_LEN: usize = 4;

/// Encode a message length prefix (Big Endian).
///
/// # Example
///
/// ```
/// use hubwire_server::protocol::encode_length_prefix;
///
/// assert_eq!(encode_length_prefix(5).unwrap(), [0, 0, 0, 5]);
/// ```
///
/// # Errors
///
/// Returns a protocol error if `len` exceeds [`ABSOLUTE_MAX_MESSAGE_SIZE`].
pub fn encode_length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    if len > ABSOLUTE_MAX_MESSAGE_SIZE as usize {
        return Err(HubError::Protocol(format!(
            "Message size {} exceeds absolute maximum {}",
            len, ABSOLUTE_MAX_MESSAGE_SIZE
        )));
    }
    Ok((len as u32).to_be_bytes())
}

/// Decode a message length prefix.
///
/// Returns `None` if buffer is too short.
pub fn decode_length_prefix(buf: &[u8]) -> Option<u32> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix))
}
