//! Response encoding for one invocation.
//!
//! [`ResponseEncoder`] turns an invocation's outcome into exactly one
//! envelope and queues it on the owning connection:
//!
//! - [`write_response`](ResponseEncoder::write_response) - `[id, method_id, value]`
//! - [`write_response_nil`](ResponseEncoder::write_response_nil) - `[id, method_id, nil]`
//! - [`write_error`](ResponseEncoder::write_error) - `[id, status, detail, text | nil]`
//! - [`write_result`](ResponseEncoder::write_result) - routes an [`InvocationResult`]
//!
//! Success envelopes are never written for fire-and-forget calls
//! (`invocation_id == -1`). Error envelopes are always built by
//! `write_error`; whether a fire-and-forget call reports its errors is the
//! [`FireAndForgetErrors`] policy applied by `write_result`.
//!
//! # Example
//!
//! ```ignore
//! async fn on_ping(ctx: &InvocationContext) -> Result<()> {
//!     ResponseEncoder::write_response(ctx, async { "pong" }).await
//! }
//! ```

use std::any::type_name;
use std::error::Error;
use std::future::Future;

use bytes::Bytes;
use serde::Serialize;

use super::context::InvocationContext;
use super::result::{error_report, InvocationResult};
use crate::error::Result;
use crate::protocol::{build_error, build_nil_success, build_success};
use crate::status;

/// `response_type` recorded for nil responses.
pub const NIL_RESPONSE_TYPE: &str = "nil";

/// What to do with errors from fire-and-forget calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FireAndForgetErrors {
    /// Send the error envelope with invocation id `-1`.
    #[default]
    Emit,
    /// Drop the error; the caller never learns of it.
    Suppress,
}

/// Dispatcher-level encoding policy.
#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    /// Send the failure's full text (message and cause chain) as the fourth
    /// element of error envelopes.
    pub include_stack_trace: bool,
    /// Error policy for fire-and-forget calls.
    pub fire_and_forget_errors: FireAndForgetErrors,
}

impl EncoderOptions {
    pub fn include_stack_trace(mut self, include: bool) -> Self {
        self.include_stack_trace = include;
        self
    }

    pub fn fire_and_forget_errors(mut self, policy: FireAndForgetErrors) -> Self {
        self.fire_and_forget_errors = policy;
        self
    }
}

/// Builds and queues response envelopes.
pub struct ResponseEncoder;

impl ResponseEncoder {
    /// Await `value` and write a success envelope carrying it.
    ///
    /// `value` is always driven to completion. For fire-and-forget calls the
    /// result is then discarded without building an envelope. Dropping the
    /// returned future before `value` completes writes nothing.
    ///
    /// # Errors
    ///
    /// `MsgPackEncode` if the value cannot be serialized; `Backpressure` or
    /// `ConnectionClosed` if the envelope cannot be queued. Nothing is
    /// written in either case.
    pub async fn write_response<T, F>(ctx: &InvocationContext, value: F) -> Result<()>
    where
        T: Serialize,
        F: Future<Output = T>,
    {
        let value = value.await;

        if ctx.is_fire_and_forget() {
            tracing::trace!(path = %ctx.path(), "Fire-and-forget call, skipping response");
            return Ok(());
        }

        Self::send_value(ctx, &value)
    }

    /// Await `completion` and write a success envelope with a nil result.
    pub async fn write_response_nil<F>(ctx: &InvocationContext, completion: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        completion.await;

        if ctx.is_fire_and_forget() {
            tracing::trace!(path = %ctx.path(), "Fire-and-forget call, skipping response");
            return Ok(());
        }

        Self::send_nil(ctx)
    }

    /// Write an error envelope.
    ///
    /// The fourth element is the full text of `source` when
    /// `include_stack_trace` is set and `source` is present, nil otherwise.
    /// Runs for fire-and-forget calls too.
    pub fn write_error(
        ctx: &InvocationContext,
        status_code: i32,
        detail: &str,
        source: Option<&(dyn Error + 'static)>,
        include_stack_trace: bool,
    ) -> Result<()> {
        let error_detail = match source {
            Some(e) if include_stack_trace => Some(error_report(e)),
            _ => None,
        };

        let frame = build_error(
            ctx.invocation_id(),
            status_code,
            detail,
            error_detail.as_deref(),
        )?;

        tracing::debug!(
            connection_id = %ctx.connection_id(),
            invocation_id = ctx.invocation_id(),
            path = %ctx.path(),
            status = status::name(status_code),
            detail,
            "Queueing error response"
        );

        Self::submit(ctx, frame, None)
    }

    /// Write whichever envelope `result` calls for.
    ///
    /// The value is already available, so this never suspends.
    pub fn write_result<T: Serialize>(
        ctx: &InvocationContext,
        result: InvocationResult<T>,
        options: &EncoderOptions,
    ) -> Result<()> {
        match result {
            InvocationResult::Success(_) | InvocationResult::VoidSuccess
                if ctx.is_fire_and_forget() =>
            {
                tracing::trace!(path = %ctx.path(), "Fire-and-forget call, skipping response");
                Ok(())
            }
            InvocationResult::Success(value) => Self::send_value(ctx, &value),
            InvocationResult::VoidSuccess => Self::send_nil(ctx),
            InvocationResult::Failure(e)
                if ctx.is_fire_and_forget()
                    && options.fire_and_forget_errors == FireAndForgetErrors::Suppress =>
            {
                tracing::debug!(
                    path = %ctx.path(),
                    status = status::name(e.status_code),
                    "Suppressing error for fire-and-forget call: {}",
                    e.detail
                );
                Ok(())
            }
            InvocationResult::Failure(e) => Self::write_error(
                ctx,
                e.status_code,
                &e.detail,
                e.source_error(),
                options.include_stack_trace,
            ),
        }
    }

    fn send_value<T: Serialize>(ctx: &InvocationContext, value: &T) -> Result<()> {
        let frame = build_success(ctx.invocation_id(), ctx.method_id(), value)?;
        Self::submit(ctx, frame, Some(type_name::<T>()))
    }

    fn send_nil(ctx: &InvocationContext) -> Result<()> {
        let frame = build_nil_success(ctx.invocation_id(), ctx.method_id())?;
        Self::submit(ctx, frame, Some(NIL_RESPONSE_TYPE))
    }

    fn submit(
        ctx: &InvocationContext,
        frame: Bytes,
        response_type: Option<&'static str>,
    ) -> Result<()> {
        let size = frame.len();

        if let Err(e) = ctx.service_context().queue_response_write(frame) {
            tracing::warn!(
                connection_id = %ctx.connection_id(),
                invocation_id = ctx.invocation_id(),
                path = %ctx.path(),
                "Failed to queue response: {}",
                e
            );
            return Err(e);
        }

        ctx.record_response(size, response_type);

        tracing::debug!(
            connection_id = %ctx.connection_id(),
            invocation_id = ctx.invocation_id(),
            path = %ctx.path(),
            size,
            response_type = response_type.unwrap_or("error"),
            elapsed_ms = ctx.elapsed().num_milliseconds(),
            "Queued response"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use crate::hub::{InvocationError, StreamingServiceContext};
    use crate::protocol::ResponseFrame;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingStream {
        frames: Mutex<Vec<Bytes>>,
        closed: bool,
    }

    impl RecordingStream {
        fn frames(&self) -> Vec<Bytes> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl StreamingServiceContext for RecordingStream {
        fn connection_id(&self) -> Uuid {
            Uuid::nil()
        }

        fn queue_response_write(&self, frame: Bytes) -> Result<()> {
            if self.closed {
                return Err(HubError::ConnectionClosed);
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn setup(invocation_id: i32, method_id: i32) -> (Arc<RecordingStream>, InvocationContext) {
        let stream = Arc::new(RecordingStream::default());
        let ctx = InvocationContext::builder(stream.clone(), invocation_id, method_id)
            .path("GameHub/Move")
            .build();
        (stream, ctx)
    }

    #[tokio::test]
    async fn test_write_response_pong() {
        let (stream, ctx) = setup(42, 7);

        ResponseEncoder::write_response(&ctx, async { "pong" }).await.unwrap();

        let frames = stream.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &[0x93, 42, 7, 0xa4, b'p', b'o', b'n', b'g']);
        assert_eq!(ctx.response_size(), Some(8));
        assert_eq!(ctx.response_type(), Some(type_name::<&str>()));
    }

    #[tokio::test]
    async fn test_write_response_nil() {
        let (stream, ctx) = setup(42, 7);

        ResponseEncoder::write_response_nil(&ctx, async {}).await.unwrap();

        assert_eq!(&stream.frames()[0][..], &[0x93, 42, 7, 0xc0]);
        assert_eq!(ctx.response_size(), Some(4));
        assert_eq!(ctx.response_type(), Some(NIL_RESPONSE_TYPE));
    }

    #[tokio::test]
    async fn test_fire_and_forget_writes_nothing() {
        let (stream, ctx) = setup(-1, 7);

        ResponseEncoder::write_response(&ctx, async { "ignored" }).await.unwrap();
        ResponseEncoder::write_response_nil(&ctx, async {}).await.unwrap();
        ResponseEncoder::write_result(&ctx, InvocationResult::Success(1), &EncoderOptions::default())
            .unwrap();
        ResponseEncoder::write_result::<()>(
            &ctx,
            InvocationResult::VoidSuccess,
            &EncoderOptions::default(),
        )
        .unwrap();

        assert!(stream.frames().is_empty());
        assert_eq!(ctx.response_size(), None);
    }

    #[tokio::test]
    async fn test_fire_and_forget_still_runs_method() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (stream, ctx) = setup(-1, 7);
        let calls = AtomicUsize::new(0);
        let send_message = async {
            tokio::task::yield_now().await;
            calls.fetch_add(1, Ordering::SeqCst);
            "sent"
        };

        ResponseEncoder::write_response(&ctx, send_message).await.unwrap();
        ResponseEncoder::write_response_nil(&ctx, async {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(stream.frames().is_empty());
        assert_eq!(ctx.response_size(), None);
    }

    #[tokio::test]
    async fn test_cancelled_result_writes_nothing() {
        let (stream, ctx) = setup(9, 1);
        let (_tx, rx) = tokio::sync::oneshot::channel::<i32>();

        let pending = ResponseEncoder::write_response(&ctx, async move { rx.await.unwrap_or(0) });
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;

        assert!(timed_out.is_err());
        assert!(stream.frames().is_empty());
        assert_eq!(ctx.response_size(), None);
    }

    #[test]
    fn test_write_error_with_stack_trace() {
        let (stream, ctx) = setup(5, 7);
        let failure = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");

        let source: &(dyn Error + 'static) = &failure;

        ResponseEncoder::write_error(&ctx, status::INTERNAL, "internal error", Some(source), true)
            .unwrap();

        let frame: ResponseFrame<()> = ResponseFrame::decode(&stream.frames()[0]).unwrap();
        assert_eq!(
            frame,
            ResponseFrame::Error {
                invocation_id: 5,
                status_code: 13,
                detail: "internal error".to_string(),
                error_detail: Some("disk on fire".to_string()),
            }
        );
        assert_eq!(ctx.response_size(), Some(stream.frames()[0].len()));
        assert_eq!(ctx.response_type(), None);
    }

    #[test]
    fn test_write_error_without_stack_trace_is_nil() {
        let failure = std::io::Error::new(std::io::ErrorKind::Other, "secret");

        for source in [Some(&failure as &(dyn Error + 'static)), None] {
            let (stream, ctx) = setup(5, 7);
            ResponseEncoder::write_error(&ctx, status::INTERNAL, "internal error", source, false)
                .unwrap();

            let bytes = &stream.frames()[0];
            assert_eq!(bytes[0], 0x94);
            assert_eq!(*bytes.last().unwrap(), 0xc0);
        }
    }

    #[test]
    fn test_write_error_stack_trace_without_source_is_nil() {
        let (stream, ctx) = setup(5, 7);
        ResponseEncoder::write_error(&ctx, status::UNKNOWN, "boom", None, true).unwrap();

        let frame: ResponseFrame<()> = ResponseFrame::decode(&stream.frames()[0]).unwrap();
        assert!(matches!(frame, ResponseFrame::Error { error_detail: None, .. }));
    }

    #[test]
    fn test_write_error_runs_for_fire_and_forget() {
        let (stream, ctx) = setup(-1, 7);
        ResponseEncoder::write_error(&ctx, status::INTERNAL, "x", None, false).unwrap();

        let frame: ResponseFrame<()> = ResponseFrame::decode(&stream.frames()[0]).unwrap();
        assert_eq!(frame.invocation_id(), -1);
    }

    #[test]
    fn test_write_result_failure_policy() {
        let failure = || InvocationError::internal("internal error", "db down");

        let (stream, ctx) = setup(-1, 7);
        let suppress = EncoderOptions::default().fire_and_forget_errors(FireAndForgetErrors::Suppress);
        ResponseEncoder::write_result::<()>(&ctx, failure().into(), &suppress).unwrap();
        assert!(stream.frames().is_empty());

        let (stream, ctx) = setup(-1, 7);
        ResponseEncoder::write_result::<()>(&ctx, failure().into(), &EncoderOptions::default())
            .unwrap();
        assert_eq!(stream.frames().len(), 1);

        // Suppression only applies to fire-and-forget calls.
        let (stream, ctx) = setup(3, 7);
        ResponseEncoder::write_result::<()>(&ctx, failure().into(), &suppress).unwrap();
        assert_eq!(stream.frames().len(), 1);
    }

    #[test]
    fn test_write_result_includes_source_text() {
        let (stream, ctx) = setup(3, 7);
        let options = EncoderOptions::default().include_stack_trace(true);

        ResponseEncoder::write_result::<()>(
            &ctx,
            InvocationError::internal("internal error", "db down").into(),
            &options,
        )
        .unwrap();

        let frame: ResponseFrame<()> = ResponseFrame::decode(&stream.frames()[0]).unwrap();
        assert_eq!(
            frame,
            ResponseFrame::Error {
                invocation_id: 3,
                status_code: status::INTERNAL,
                detail: "internal error".to_string(),
                error_detail: Some("db down".to_string()),
            }
        );
    }

    #[test]
    fn test_write_result_success_and_void() {
        let (stream, ctx) = setup(1, 2);
        ResponseEncoder::write_result(&ctx, InvocationResult::Success(vec![1u8, 2]), &EncoderOptions::default())
            .unwrap();
        assert_eq!(&stream.frames()[0][..], &[0x93, 1, 2, 0x92, 1, 2]);

        let (stream, ctx) = setup(1, 2);
        ResponseEncoder::write_result::<String>(&ctx, InvocationResult::VoidSuccess, &EncoderOptions::default())
            .unwrap();
        assert_eq!(&stream.frames()[0][..], &[0x93, 1, 2, 0xc0]);
    }

    #[tokio::test]
    async fn test_serialization_failure_propagates() {
        struct Unserializable;

        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("no wire form"))
            }
        }

        let (stream, ctx) = setup(4, 1);
        let result = ResponseEncoder::write_response(&ctx, async { Unserializable }).await;

        assert!(matches!(result, Err(HubError::MsgPackEncode(_))));
        assert!(stream.frames().is_empty());
        assert_eq!(ctx.response_size(), None);

        // The dispatcher reports it as an error instead.
        ResponseEncoder::write_error(&ctx, status::INTERNAL, "serialization failed", None, false)
            .unwrap();
        assert_eq!(stream.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_failure_propagates() {
        let stream = Arc::new(RecordingStream {
            closed: true,
            ..Default::default()
        });
        let ctx = InvocationContext::builder(stream, 1, 1).build();

        let result = ResponseEncoder::write_response(&ctx, async { 1 }).await;

        assert!(matches!(result, Err(HubError::ConnectionClosed)));
        assert_eq!(ctx.response_size(), None);
    }
}
