//! The owning connection as seen by one invocation.

use bytes::Bytes;
use uuid::Uuid;

use crate::error::Result;
use crate::writer::WriterHandle;

/// Outbound side of a duplex streaming connection.
///
/// Implementations must be non-blocking and preserve submission order.
pub trait StreamingServiceContext: Send + Sync {
    /// Stable id of the connection.
    fn connection_id(&self) -> Uuid;

    /// Queue one response envelope for writing.
    fn queue_response_write(&self, frame: Bytes) -> Result<()>;
}

/// A connection backed by a writer task.
#[derive(Clone)]
pub struct DuplexConnection {
    id: Uuid,
    writer: WriterHandle,
}

impl DuplexConnection {
    /// Create a connection with a fresh random id.
    pub fn new(writer: WriterHandle) -> Self {
        Self::with_id(Uuid::new_v4(), writer)
    }

    pub fn with_id(id: Uuid, writer: WriterHandle) -> Self {
        Self { id, writer }
    }

    /// The underlying writer handle.
    pub fn writer(&self) -> &WriterHandle {
        &self.writer
    }
}

impl StreamingServiceContext for DuplexConnection {
    fn connection_id(&self) -> Uuid {
        self.id
    }

    fn queue_response_write(&self, frame: Bytes) -> Result<()> {
        self.writer.queue_write(frame)
    }
}

impl std::fmt::Debug for DuplexConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexConnection")
            .field("id", &self.id)
            .field("pending", &self.writer.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::spawn_writer_task_default;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let (client, _server) = duplex(64);
        let (writer, _task) = spawn_writer_task_default(client);

        let a = DuplexConnection::new(writer.clone());
        let b = DuplexConnection::new(writer);
        assert_ne!(a.connection_id(), b.connection_id());
    }

    #[tokio::test]
    async fn test_queue_response_write_goes_to_writer() {
        let (client, mut server) = duplex(64);
        let (writer, _task) = spawn_writer_task_default(client);
        let id = Uuid::new_v4();
        let connection = DuplexConnection::with_id(id, writer);

        assert_eq!(connection.connection_id(), id);
        connection
            .queue_response_write(Bytes::from_static(&[0x93, 0x01, 0x02, 0xc0]))
            .unwrap();

        let mut buf = [0u8; 8];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0, 0, 0, 4, 0x93, 0x01, 0x02, 0xc0]);
    }
}
