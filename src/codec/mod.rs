//! Codec module - serialization of response payloads.
//!
//! [`MsgPackCodec`] wraps `rmp-serde`. It is a marker struct with static
//! methods rather than a trait object, so the concrete result type stays
//! known at every call site.
//!
//! # Example
//!
//! ```
//! use hubwire_server::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
