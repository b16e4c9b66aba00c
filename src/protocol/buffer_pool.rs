//! Reusable byte buffers for frame building.
//!
//! Every envelope is built into a rented `Vec<u8>`, copied out into owned
//! `Bytes`, and the rented buffer goes back to the pool when its guard drops.
//!
//! # Design
//!
//! - Each thread owns a small free list ([`BufferPool`]); no locking on the
//!   hot path.
//! - Every rent pops a distinct buffer (or allocates one), so concurrent
//!   builds never share a buffer.
//! - Buffers are cleared on return. Oversized buffers are dropped instead of
//!   kept, so one large response does not pin memory forever.
//!
//! # Usage
//!
//! ```
//! use hubwire_server::protocol::buffer_pool;
//!
//! let bytes = {
//!     let mut buf = buffer_pool::rent();
//!     buf.extend_from_slice(&[0x93, 0x01, 0x02, 0xc0]);
//!     buf.to_bytes()
//! }; // buffer released here
//! assert_eq!(&bytes[..], &[0x93, 0x01, 0x02, 0xc0]);
//! ```

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

use bytes::Bytes;

/// Maximum buffers retained per thread.
pub const MAX_POOLED_BUFFERS: usize = 16;

/// Initial capacity of a freshly allocated buffer.
pub const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Buffers that grew beyond this are dropped on release.
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// A free list of reusable buffers.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
}

impl BufferPool {
    /// Create an empty pool.
    #[inline]
    pub const fn new() -> Self {
        Self { free: Vec::new() }
    }

    /// Take a buffer from the pool, allocating if none is free.
    ///
    /// The returned buffer is always empty.
    pub fn acquire(&mut self) -> Vec<u8> {
        self.free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(INITIAL_BUFFER_CAPACITY))
    }

    /// Return a buffer to the pool.
    pub fn release(&mut self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY || self.free.len() >= MAX_POOLED_BUFFERS {
            return;
        }
        buf.clear();
        self.free.push(buf);
    }

    /// Number of idle buffers.
    #[inline]
    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

thread_local! {
    static THREAD_LOCAL_POOL: RefCell<BufferPool> = const { RefCell::new(BufferPool::new()) };
}

/// Rent a buffer from the current thread's pool.
///
/// The buffer is returned when the guard drops, whether or not the build
/// that used it succeeded.
#[inline]
pub fn rent() -> PooledBuffer {
    let buf = THREAD_LOCAL_POOL.with(|pool| pool.borrow_mut().acquire());
    PooledBuffer { buf }
}

/// Idle buffers in the current thread's pool.
pub fn idle_buffers() -> usize {
    THREAD_LOCAL_POOL.with(|pool| pool.borrow().idle())
}

/// RAII guard around a rented buffer.
///
/// Derefs to `Vec<u8>`. The bytes must be copied out with
/// [`to_bytes`](Self::to_bytes) before the guard is dropped.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
}

impl PooledBuffer {
    /// Copy the written bytes into an owned, immutable `Bytes`.
    #[inline]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        // The guard can outlive the thread-local during thread teardown.
        let _ = THREAD_LOCAL_POOL.try_with(|pool| {
            if let Ok(mut pool) = pool.try_borrow_mut() {
                pool.release(buf);
            }
        });
    }
}
