//! Reusable render buffers.
//!
//! Every request renders its log header into a byte buffer. Allocating one
//! per request is wasted work, so each [`AppLogger`](crate::middleware::AppLogger)
//! owns a pool and hands out buffers for the duration of a single render.
//!
//! The pool is a bounded lock-free queue (`crossbeam_queue::ArrayQueue`).
//! `acquire` never blocks: when the queue is empty a fresh buffer is
//! allocated, and when it is full a released buffer is simply dropped.

use std::io::{self, Write};
use std::ops::{Deref, DerefMut};

use crossbeam_queue::ArrayQueue;
use tracing::trace;

/// Capacity of a freshly allocated buffer.
pub const INITIAL_CAPACITY: usize = 256;

/// Buffers that grew past this are not returned to the pool.
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

/// Idle buffers a pool keeps by default.
pub const DEFAULT_POOL_SIZE: usize = 64;

pub struct BufferPool {
    idle: ArrayQueue<Vec<u8>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_SIZE)
    }

    /// A pool that keeps at most `max_idle` buffers around (minimum 1).
    pub fn with_capacity(max_idle: usize) -> Self {
        Self { idle: ArrayQueue::new(max_idle.max(1)) }
    }

    /// Takes an empty buffer out of the pool, allocating if none is idle.
    ///
    /// The buffer goes back to the pool when the guard is dropped, on every
    /// exit path of the caller.
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self
            .idle
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(INITIAL_CAPACITY));
        PooledBuf { buf, pool: self }
    }

    /// Clears `buf` and makes it available to the next `acquire`.
    pub fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            trace!(capacity = buf.capacity(), "dropping oversized log buffer");
            return;
        }
        buf.clear();
        // A full queue means enough buffers are already idle.
        let _ = self.idle.push(buf);
    }

    /// Number of buffers currently sitting idle in the pool.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self { Self::new() }
}

/// A buffer checked out of a [`BufferPool`]. Exclusively owned until dropped.
pub struct PooledBuf<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuf<'_> {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> { &self.buf }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> { &mut self.buf }
}

impl Write for PooledBuf<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.write(data)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_buffers_start_empty() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"leftover");
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= INITIAL_CAPACITY);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn buffer_is_reused() {
        let pool = BufferPool::new();
        let ptr = {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"abc");
            buf.as_ptr()
        };
        assert_eq!(pool.acquire().as_ptr(), ptr);
    }

    #[test]
    fn oversized_buffers_are_dropped() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire();
            buf.reserve(MAX_RETAINED_CAPACITY + 1);
        }
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn full_pool_drops_extra_buffers() {
        let pool = BufferPool::with_capacity(2);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        drop((a, b, c));
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn concurrent_renders_never_share_buffers() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 500;

        let pool = BufferPool::new();
        std::thread::scope(|s| {
            for id in 0..THREADS {
                let pool = &pool;
                s.spawn(move || {
                    let marker = [id as u8; 16];
                    for _ in 0..ROUNDS {
                        let mut buf = pool.acquire();
                        assert!(buf.is_empty());
                        buf.write_all(&marker).unwrap();
                        std::thread::yield_now();
                        assert_eq!(&buf[..], &marker[..]);
                    }
                });
            }
        });

        // At most one buffer per concurrently running render was ever created.
        assert!(pool.idle() <= THREADS);
    }
}
