//! MsgPack codec using `rmp-serde`.
//!
//! Structs are always written with the named encoding (struct-as-map), so
//! clients that decode into dynamic objects see field names rather than
//! positional arrays. Tuples and sequences stay arrays, which is what the
//! response envelopes rely on.
//!
//! # Example
//!
//! ```
//! use hubwire_server::codec::MsgPackCodec;
//!
//! // Request arguments arrive as a MsgPack array.
//! let args = MsgPackCodec::encode(&("ChatHub", 3u8)).unwrap();
//! let (hub, room): (String, u8) = MsgPackCodec::decode(&args).unwrap();
//! assert_eq!((hub.as_str(), room), ("ChatHub", 3));
//! ```

use crate::error::Result;

/// Serializer for request arguments and response values.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Serialize `value` into a new buffer.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Append the encoding of `value` to `buf`.
    ///
    /// On error `buf` may hold a partial encoding; callers that reuse the
    /// buffer must clear it.
    #[inline]
    pub fn encode_into<T: serde::Serialize + ?Sized>(buf: &mut Vec<u8>, value: &T) -> Result<()> {
        rmp_serde::encode::write_named(buf, value)?;
        Ok(())
    }

    /// Deserialize one complete value; trailing bytes are ignored.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Seat {
        row: u32,
        holder: String,
        vip: bool,
    }

    #[test]
    fn test_named_struct_survives_decode() {
        let seat = Seat {
            row: 12,
            holder: "ada".to_string(),
            vip: true,
        };

        let bytes = MsgPackCodec::encode(&seat).unwrap();
        assert_eq!(MsgPackCodec::decode::<Seat>(&bytes).unwrap(), seat);
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = vec![0x93];
        MsgPackCodec::encode_into(&mut buf, &1i32).unwrap();
        MsgPackCodec::encode_into(&mut buf, &2i32).unwrap();
        MsgPackCodec::encode_into(&mut buf, "x").unwrap();

        assert_eq!(buf, vec![0x93, 0x01, 0x02, 0xa1, b'x']);
        let decoded: (i32, i32, String) = MsgPackCodec::decode(&buf).unwrap();
        assert_eq!(decoded, (1, 2, "x".to_string()));
    }

    #[test]
    fn test_structs_are_maps() {
        let seat = Seat {
            row: 1,
            holder: String::new(),
            vip: false,
        };

        // fixmap 3, then the "row" key
        let bytes = MsgPackCodec::encode(&seat).unwrap();
        assert_eq!(&bytes[..5], &[0x83, 0xa3, b'r', b'o', b'w']);
    }

    #[test]
    fn test_tuples_use_array_format() {
        let encoded = MsgPackCodec::encode(&(42i32, 7i32, "pong")).unwrap();
        assert_eq!(encoded[0], 0x93);
    }

    #[test]
    fn test_compact_integers() {
        assert_eq!(MsgPackCodec::encode(&5i32).unwrap(), vec![0x05]);
        assert_eq!(MsgPackCodec::encode(&-1i32).unwrap(), vec![0xff]);
        assert_eq!(MsgPackCodec::encode(&200i32).unwrap(), vec![0xcc, 0xc8]);
        assert_eq!(MsgPackCodec::encode(&-200i32).unwrap(), vec![0xd1, 0xff, 0x38]);
    }

    #[test]
    fn test_unit_and_none_are_nil() {
        assert_eq!(MsgPackCodec::encode(&()).unwrap(), vec![0xc0]);
        assert_eq!(MsgPackCodec::encode(&None::<String>).unwrap(), vec![0xc0]);
    }

    #[test]
    fn test_truncated_input_is_decode_error() {
        let bytes = MsgPackCodec::encode(&(1i32, "abcdef")).unwrap();
        let result: Result<(i32, String)> = MsgPackCodec::decode(&bytes[..4]);
        assert!(matches!(result, Err(crate::HubError::MsgPackDecode(_))));
    }

    #[test]
    fn test_raw_bytes_use_bin_format() {
        let payload = serde_bytes::Bytes::new(&[0xde, 0xad]);
        assert_eq!(MsgPackCodec::encode(&payload).unwrap(), vec![0xc4, 0x02, 0xde, 0xad]);

        let back: serde_bytes::ByteBuf = MsgPackCodec::decode(&[0xc4, 0x01, 0x07]).unwrap();
        assert_eq!(back.into_vec(), vec![0x07]);
    }
}
