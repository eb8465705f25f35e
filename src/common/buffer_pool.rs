//! Bounded pool of relay buffers
//!
//! Every forwarding direction borrows one buffer for its lifetime, so the
//! pool also acts as a crude cap on concurrent relay memory. Buffers are
//! handed back when the borrow is dropped.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A pool of reusable relay buffers
///
/// Cloning the pool shares the underlying capacity.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    /// Limits how many buffers can be out at once
    semaphore: Arc<Semaphore>,
    /// Capacity of each buffer handed out
    buffer_capacity: usize,
}

/// A buffer borrowed from the pool
///
/// Returned to the pool when dropped.
pub struct PooledBuffer {
    pub buffer: BytesMut,
    _permit: OwnedSemaphorePermit,
}

impl BufferPool {
    /// Create a pool handing out up to `max_buffers` buffers of
    /// `buffer_capacity` bytes each.
    pub fn new(max_buffers: usize, buffer_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                semaphore: Arc::new(Semaphore::new(max_buffers)),
                buffer_capacity,
            }),
        }
    }

    /// Borrow a buffer, waiting if the pool is at capacity
    pub async fn get_buffer(&self) -> PooledBuffer {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .expect("buffer pool semaphore closed");

        let mut buffer = BytesMut::with_capacity(self.inner.buffer_capacity);
        buffer.resize(self.inner.buffer_capacity, 0);

        PooledBuffer { buffer, _permit: permit }
    }

    /// Borrow a buffer without waiting
    pub fn try_get_buffer(&self) -> Option<PooledBuffer> {
        let permit = Arc::clone(&self.inner.semaphore).try_acquire_owned().ok()?;

        let mut buffer = BytesMut::with_capacity(self.inner.buffer_capacity);
        buffer.resize(self.inner.buffer_capacity, 0);

        Some(PooledBuffer { buffer, _permit: permit })
    }

    /// Capacity of the buffers handed out by this pool
    pub fn buffer_capacity(&self) -> usize {
        self.inner.buffer_capacity
    }
}
