//! Hub module - one invocation's context and its response.
//!
//! Provides:
//! - [`InvocationContext`] - ids, request, items and connection for one call
//! - [`ResponseEncoder`] - writes the success, nil or error envelope
//! - [`InvocationResult`] / [`InvocationError`] - the outcome picked by the dispatcher
//! - [`StreamingServiceContext`] / [`DuplexConnection`] - the outbound side of a connection
//!
//! # Example
//!
//! ```ignore
//! use hubwire_server::hub::{EncoderOptions, InvocationResult, ResponseEncoder};
//!
//! let result: InvocationResult<String> = run_method(&ctx).await.into();
//! ResponseEncoder::write_result(&ctx, result, &EncoderOptions::default())?;
//! ```

mod connection;
mod context;
mod encoder;
mod result;

pub use connection::{DuplexConnection, StreamingServiceContext};
pub use context::{InvocationContext, InvocationContextBuilder, ItemValue, Items};
pub use encoder::{EncoderOptions, FireAndForgetErrors, ResponseEncoder, NIL_RESPONSE_TYPE};
pub use result::{error_report, BoxError, InvocationError, InvocationResult};
