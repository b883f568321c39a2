//! Reusable byte buffers.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// A bounded pool of scratch buffers.
///
/// A buffer is owned by exactly one caller between [`BufferPool::checkout`]
/// and the drop of the returned guard, so no call ever sees another call's
/// bytes. The pool lock is held only to pop or push a buffer.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<BytesMut>>,
    max_idle: usize,
    initial_capacity: usize,
    max_retained_capacity: usize,
}

impl BufferPool {
    /// Creates an empty pool.
    ///
    /// At most `max_idle` buffers are kept between calls, and a buffer that
    /// grew past `max_retained_capacity` is freed instead of returned.
    #[must_use]
    pub fn new(max_idle: usize, initial_capacity: usize, max_retained_capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
            initial_capacity,
            max_retained_capacity,
        }
    }

    /// Takes a cleared buffer out of the pool, allocating if none is idle.
    pub fn checkout(&self) -> PooledBuffer<'_> {
        let buf = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.initial_capacity));

        let mut guard = PooledBuffer { buf, pool: self };
        guard.buf.clear();
        guard
    }

    /// Returns the number of idle buffers.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, mut buf: BytesMut) {
        if buf.capacity() > self.max_retained_capacity {
            return;
        }
        buf.clear();

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }
}

/// A buffer checked out of a [`BufferPool`]; returned on drop.
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    buf: BytesMut,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.give_back(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_is_always_empty() {
        let pool = BufferPool::new(2, 16, 1024);
        {
            let mut buf = pool.checkout();
            buf.extend_from_slice(b"leftover");
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.checkout();
        assert!(buf.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn idle_count_is_bounded() {
        let pool = BufferPool::new(2, 16, 1024);
        {
            let _a = pool.checkout();
            let _b = pool.checkout();
            let _c = pool.checkout();
        }
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn oversized_buffers_are_not_retained() {
        let pool = BufferPool::new(4, 16, 64);
        {
            let mut buf = pool.checkout();
            buf.extend_from_slice(&[0u8; 512]);
        }
        assert_eq!(pool.idle(), 0);
    }
}
