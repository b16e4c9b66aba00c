//! Response envelopes.
//!
//! Every response is a single MsgPack array. Clients tell success from error
//! by the array length alone:
//!
//! ```text
//! success: [invocation_id, method_id, result | nil]
//! error:   [invocation_id, status_code, detail, error_detail | nil]
//! ```
//!
//! The build functions rent a pooled buffer, serialize the whole envelope
//! into it, and return an owned copy. The rented buffer is released on every
//! path, including serialization failure.
//!
//! # Example
//!
//! ```
//! use hubwire_server::protocol::{build_success, ResponseFrame};
//!
//! let bytes = build_success(42, 7, "pong").unwrap();
//! assert_eq!(&bytes[..], &[0x93, 42, 7, 0xa4, b'p', b'o', b'n', b'g']);
//!
//! let frame: ResponseFrame<String> = ResponseFrame::decode(&bytes).unwrap();
//! assert_eq!(
//!     frame,
//!     ResponseFrame::Success { invocation_id: 42, method_id: 7, value: "pong".to_string() }
//! );
//! ```

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::buffer_pool;
use super::wire_format::{ERROR_FRAME_LEN, SUCCESS_FRAME_LEN};
use crate::codec::MsgPackCodec;
use crate::error::Result;

/// Build a success envelope carrying `value`.
///
/// # Errors
///
/// Returns `MsgPackEncode` if `value` cannot be serialized.
pub fn build_success<T: Serialize + ?Sized>(
    invocation_id: i32,
    method_id: i32,
    value: &T,
) -> Result<Bytes> {
    let mut buf = buffer_pool::rent();
    MsgPackCodec::encode_into(&mut buf, &(invocation_id, method_id, value))?;
    Ok(buf.to_bytes())
}

/// Build a success envelope whose result is nil.
pub fn build_nil_success(invocation_id: i32, method_id: i32) -> Result<Bytes> {
    build_success(invocation_id, method_id, &())
}

/// Build an error envelope.
///
/// `error_detail` is written as a MsgPack string when present, nil otherwise.
pub fn build_error(
    invocation_id: i32,
    status_code: i32,
    detail: &str,
    error_detail: Option<&str>,
) -> Result<Bytes> {
    let mut buf = buffer_pool::rent();
    MsgPackCodec::encode_into(
        &mut buf,
        &(invocation_id, status_code, detail, error_detail),
    )?;
    Ok(buf.to_bytes())
}

/// A decoded response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFrame<T> {
    /// `[invocation_id, method_id, value]`
    Success {
        invocation_id: i32,
        method_id: i32,
        value: T,
    },
    /// `[invocation_id, status_code, detail, error_detail]`
    Error {
        invocation_id: i32,
        status_code: i32,
        detail: String,
        error_detail: Option<String>,
    },
}

impl<T: DeserializeOwned> ResponseFrame<T> {
    /// Decode an envelope.
    ///
    /// # Errors
    ///
    /// Returns `MsgPackDecode` if the bytes are not a 3- or 4-element array
    /// of the expected shape.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }
}

impl<T> ResponseFrame<T> {
    /// Correlation id of the request this frame answers.
    pub fn invocation_id(&self) -> i32 {
        match self {
            Self::Success { invocation_id, .. } | Self::Error { invocation_id, .. } => {
                *invocation_id
            }
        }
    }

    /// Check if this is an error envelope.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ResponseFrame<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(FrameVisitor(PhantomData))
    }
}

struct FrameVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for FrameVisitor<T> {
    type Value = ResponseFrame<T>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "a response envelope of {} or {} elements",
            SUCCESS_FRAME_LEN, ERROR_FRAME_LEN
        )
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let len = seq
            .size_hint()
            .ok_or_else(|| de::Error::custom("response envelope length is unknown"))?;

        match len {
            SUCCESS_FRAME_LEN => Ok(ResponseFrame::Success {
                invocation_id: next(&mut seq, 0, &self)?,
                method_id: next(&mut seq, 1, &self)?,
                value: next(&mut seq, 2, &self)?,
            }),
            ERROR_FRAME_LEN => Ok(ResponseFrame::Error {
                invocation_id: next(&mut seq, 0, &self)?,
                status_code: next(&mut seq, 1, &self)?,
                detail: next(&mut seq, 2, &self)?,
                error_detail: next(&mut seq, 3, &self)?,
            }),
            n => Err(de::Error::invalid_length(n, &self)),
        }
    }
}

fn next<'de, A, E, V>(seq: &mut A, index: usize, expected: &V) -> std::result::Result<E, A::Error>
where
    A: SeqAccess<'de>,
    E: Deserialize<'de>,
    V: Visitor<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, expected))
}
