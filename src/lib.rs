//! # hubwire-server
//!
//! Response framing for a multiplexed, bidirectional streaming RPC channel.
//!
//! Many method invocations share one duplex stream. Each invocation gets an
//! [`InvocationContext`]; when its result is ready the [`ResponseEncoder`]
//! serializes it into a MsgPack envelope and queues it on the connection's
//! writer task.
//!
//! ## Wire format
//!
//! - Success: `[invocation_id, method_id, result | nil]`
//! - Error: `[invocation_id, status_code, detail, error_detail | nil]`
//! - On the stream: 4-byte Big Endian length prefix, then the envelope
//!
//! Invocation id `-1` marks a fire-and-forget call; no success envelope is
//! ever written for it.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hubwire_server::hub::{DuplexConnection, InvocationContext, ResponseEncoder};
//! use hubwire_server::writer::spawn_writer_task_default;
//!
//! let (writer, _task) = spawn_writer_task_default(write_half);
//! let connection = Arc::new(DuplexConnection::new(writer));
//!
//! let ctx = InvocationContext::builder(connection.clone(), 42, 7)
//!     .path("GameHub/Ping")
//!     .build();
//! ResponseEncoder::write_response(&ctx, async { "pong" }).await?;
//! ```

pub mod codec;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod status;
pub mod writer;

pub use error::{HubError, Result};
pub use hub::{InvocationContext, InvocationResult, ResponseEncoder};
