//! Echo Hub - a tiny dispatcher writing responses onto one duplex stream.
//!
//! This demo shows:
//! - Building an [`InvocationContext`] per inbound call
//! - Routing method outcomes through [`ResponseEncoder::write_result`]
//! - Falling back to an `INTERNAL` error envelope when a result cannot be serialized
//! - Reading the framed envelopes back with [`MessageBuffer`]
//!
//! Run with `RUST_LOG=hubwire_server=debug cargo run --example echo_hub` to
//! see the encoder's logs.

use std::sync::Arc;

use bytes::Bytes;
use hubwire_server::codec::MsgPackCodec;
use hubwire_server::hub::{
    DuplexConnection, EncoderOptions, InvocationContext, InvocationError, InvocationResult,
    ResponseEncoder,
};
use hubwire_server::protocol::{MessageBuffer, ResponseFrame};
use hubwire_server::writer::spawn_writer_task_default;
use hubwire_server::{status, HubError};
use serde::de::IgnoredAny;
use serde::{Serialize, Serializer};
use tokio::io::{duplex, AsyncReadExt};
use tracing_subscriber::EnvFilter;

const ECHO: i32 = 0;
const NOTIFY: i32 = 1;
const DIVIDE: i32 = 2;
const SNAPSHOT: i32 = 3;

/// A value whose serialization always fails.
struct Snapshot;

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("snapshot holds a live handle"))
    }
}

fn divide(ctx: &InvocationContext) -> Result<f64, InvocationError> {
    let (a, b): (f64, f64) = MsgPackCodec::decode(ctx.request())
        .map_err(|e| InvocationError::new(status::INVALID_ARGUMENT, "expected [a, b]").with_source(e))?;

    if b == 0.0 {
        return Err(InvocationError::new(status::OUT_OF_RANGE, "division by zero"));
    }
    Ok(a / b)
}

async fn dispatch(ctx: &InvocationContext, options: &EncoderOptions) -> hubwire_server::Result<()> {
    let written = match ctx.method_id() {
        ECHO => {
            let request = ctx.request().clone();
            ResponseEncoder::write_response(ctx, async move {
                MsgPackCodec::decode::<(String,)>(&request)
                    .map(|(text,)| text)
                    .unwrap_or_default()
            })
            .await
        }
        NOTIFY => ResponseEncoder::write_response_nil(ctx, async {}).await,
        DIVIDE => ResponseEncoder::write_result(ctx, divide(ctx).into(), options),
        SNAPSHOT => ResponseEncoder::write_result(ctx, InvocationResult::Success(Snapshot), options),
        other => ResponseEncoder::write_error(
            ctx,
            status::UNIMPLEMENTED,
            &format!("method {other} is not implemented"),
            None,
            false,
        ),
    };

    match written {
        Err(HubError::MsgPackEncode(e)) => {
            let source: &(dyn std::error::Error + 'static) = &e;
            ResponseEncoder::write_error(
                ctx,
                status::INTERNAL,
                "internal error",
                Some(source),
                options.include_stack_trace,
            )
        }
        other => other,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hubwire_server=debug")),
        )
        .init();

    let (client, mut server) = duplex(64 * 1024);
    let (writer, task) = spawn_writer_task_default(client);
    let connection = Arc::new(DuplexConnection::new(writer));
    let options = EncoderOptions::default().include_stack_trace(true);

    let calls: Vec<(i32, i32, &str, Vec<u8>)> = vec![
        (1, ECHO, "EchoHub/Echo", MsgPackCodec::encode(&("hello",))?),
        (2, NOTIFY, "EchoHub/Notify", MsgPackCodec::encode(&())?),
        (-1, ECHO, "EchoHub/Echo", MsgPackCodec::encode(&("ignored",))?),
        (3, DIVIDE, "EchoHub/Divide", MsgPackCodec::encode(&(7.0, 2.0))?),
        (4, DIVIDE, "EchoHub/Divide", MsgPackCodec::encode(&(1.0, 0.0))?),
        (5, SNAPSHOT, "EchoHub/Snapshot", MsgPackCodec::encode(&())?),
        (6, 99, "EchoHub/Missing", MsgPackCodec::encode(&())?),
    ];

    for (invocation_id, method_id, path, request) in calls {
        let ctx = InvocationContext::builder(connection.clone(), invocation_id, method_id)
            .path(path)
            .request(Bytes::from(request))
            .build();
        dispatch(&ctx, &options).await?;
    }

    // Closing the last handle lets the writer flush and shut down.
    drop(connection);
    task.await??;

    let mut raw = Vec::new();
    server.read_to_end(&mut raw).await?;

    for message in MessageBuffer::new().push(&raw)? {
        match ResponseFrame::<IgnoredAny>::decode(&message)? {
            ResponseFrame::Success {
                invocation_id,
                method_id,
                ..
            } => println!("ok    id={invocation_id} method={method_id} bytes={:02x?}", &message[..]),
            ResponseFrame::Error {
                invocation_id,
                status_code,
                detail,
                error_detail,
            } => {
                println!(
                    "error id={invocation_id} status={} detail={detail:?}",
                    status::name(status_code)
                );
                if let Some(text) = error_detail {
                    println!("      {}", text.replace('\n', "\n      "));
                }
            }
        }
    }

    Ok(())
}
