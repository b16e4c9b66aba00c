//! Dedicated writer task for a connection's outbound queue.
//!
//! Response envelopes from many concurrently completing invocations are
//! funnelled through one mpsc channel into a single task that owns the write
//! half of the duplex stream. Submission order is write order.
//!
//! # Architecture
//!
//! ```text
//! Invocation 1 ─┐
//! Invocation 2 ─┼─► mpsc::Sender<OutboundMessage> ─► Writer Task ─► Stream
//! Invocation N ─┘
//! ```
//!
//! Queueing is synchronous: [`WriterHandle::queue_write`] never waits. When
//! the pending limit is reached it fails with [`HubError::Backpressure`]
//! and the caller decides what to do with that invocation.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{HubError, Result};
use crate::protocol::{encode_length_prefix, LENGTH_PREFIX_SIZE};

/// Default maximum pending messages before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_MESSAGES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum messages to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A length-prefixed envelope ready to be written.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Big Endian body length.
    pub prefix: [u8; LENGTH_PREFIX_SIZE],
    /// Envelope bytes.
    pub body: Bytes,
}

impl OutboundMessage {
    /// Wrap an envelope.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the body is larger than the wire allows.
    #[inline]
    pub fn new(body: Bytes) -> Result<Self> {
        Ok(Self {
            prefix: encode_length_prefix(body.len())?,
            body,
        })
    }

    /// Total size on the wire (prefix + body).
    #[inline]
    pub fn size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.body.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued-but-unwritten messages.
    pub max_pending_messages: usize,
    /// Channel capacity for the message queue.
    pub channel_capacity: usize,
}

impl WriterConfig {
    /// Set the pending message limit.
    pub fn max_pending_messages(mut self, limit: usize) -> Self {
        self.max_pending_messages = limit;
        self
    }

    /// Set the channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_messages: DEFAULT_MAX_PENDING_MESSAGES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing messages to the writer task.
///
/// Cheaply cloneable; every invocation on a connection holds one.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundMessage>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundMessage>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
        }
    }

    /// Queue an envelope for writing without waiting.
    ///
    /// # Errors
    ///
    /// - `Backpressure` if the pending limit or channel capacity is reached
    /// - `ConnectionClosed` if the writer task has stopped
    pub fn queue_write(&self, body: Bytes) -> Result<()> {
        let message = OutboundMessage::new(body)?;

        // Reserve a slot only while under the limit.
        let max_pending = self.max_pending;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max_pending).then_some(current + 1)
            })
            .map_err(|_| HubError::Backpressure)?;

        self.tx.try_send(message).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => HubError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => HubError::ConnectionClosed,
            }
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending message count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Check if the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing messages.
///
/// The `JoinHandle` resolves when every `WriterHandle` has been dropped and
/// the queue is drained, or when a write fails.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_messages);

    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer, pending).await;
        if let Err(e) = &result {
            tracing::error!("Writer task failed: {}", e);
        }
        result
    });

    (handle, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundMessage>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        let Some(first) = rx.recv().await else {
            // All handles dropped
            writer.shutdown().await?;
            return Ok(());
        };

        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;
        batch.clear();

        pending.fetch_sub(batch_size, Ordering::Release);
        tracing::trace!(messages = batch_size, "Wrote batch");
    }
}

/// Write a batch with scatter/gather I/O, continuing after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundMessage]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|m| m.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(HubError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice list for everything after the first `skip_bytes`.
fn build_remaining_slices(batch: &[OutboundMessage], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for message in batch {
        for part in [&message.prefix[..], &message.body[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
