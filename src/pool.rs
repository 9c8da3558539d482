// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The process-wide buffer pool that backs pool-origin descriptors (§3,
//! "descriptors are created ... from a memory pool (by copying payload)").
//!
//! Modeled on the free list in `dispatch/pool.rs`'s `Free<T>`: a simple
//! `Vec` used as a stack so the most recently freed buffer is reused first,
//! which tends to keep the working set cache-warm. Unlike the teacher's
//! pool, which hands out fixed-size descriptor slabs up front, our buffers
//! vary with fragment size, so we keep a capacity cap and let oversized
//! allocations fall back to the global allocator rather than growing the
//! pool without bound.
use parking_lot::Mutex;
use std::sync::Arc;

/// Buffers larger than this are never pooled; they are allocated directly
/// and dropped directly.
const MAX_POOLED_CAPACITY: usize = 64 * 1024;

/// Maximum number of free buffers retained before we start dropping them.
const MAX_FREE_BUFFERS: usize = 256;

#[derive(Default)]
struct Inner {
    free: Vec<Vec<u8>>,
}

/// A shared pool of reusable byte buffers for the descriptor allocator
/// (§4.3 step 3, "otherwise, allocate from the pool and memcpy the
/// residue").
#[derive(Clone, Default)]
pub struct BufferPool {
    inner: Arc<Mutex<Inner>>,
}

impl BufferPool {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pool pre-seeded with `count` buffers of `page_size`
    /// capacity, mirroring the page-size/capacity knobs the teacher's
    /// `Pool::new(stream_capacity, control_capacity)` exposes for its own
    /// fixed-size slab pool (§10.3's `WorkerConfig`).
    pub fn with_initial_pages(page_size: usize, count: usize) -> Self {
        let pool = Self::default();
        if page_size > 0 {
            let mut inner = pool.inner.lock();
            inner.free.extend((0..count).map(|_| Vec::with_capacity(page_size)));
        }
        pool
    }

    /// Allocates a buffer able to hold at least `len` bytes and copies
    /// `src` into it.
    #[inline]
    pub(crate) fn alloc_copy(&self, src: &[u8]) -> Vec<u8> {
        let mut buf = self.alloc(src.len());
        buf.extend_from_slice(src);
        buf
    }

    #[inline]
    fn alloc(&self, min_capacity: usize) -> Vec<u8> {
        let mut inner = self.inner.lock();
        while let Some(buf) = inner.free.pop() {
            if buf.capacity() >= min_capacity {
                tracing::trace!(capacity = buf.capacity(), "pool hit");
                return buf;
            }
            // too small to be useful; drop it on the floor instead of
            // pushing it back, since it would just be skipped again.
        }
        tracing::trace!(min_capacity, "pool miss");
        Vec::with_capacity(min_capacity)
    }

    /// Returns a buffer's storage to the pool once its descriptor is
    /// released.
    #[inline]
    pub(crate) fn free(&self, mut buf: Vec<u8>) {
        if buf.capacity() == 0 || buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let mut inner = self.inner.lock();
        if inner.free.len() < MAX_FREE_BUFFERS {
            inner.free.push(buf);
        }
    }

    #[cfg(test)]
    pub(crate) fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_capacity() {
        let pool = BufferPool::new();
        let buf = pool.alloc_copy(b"hello");
        assert_eq!(&buf[..], b"hello");
        let cap = buf.capacity();
        pool.free(buf);
        assert_eq!(pool.free_count(), 1);

        let buf2 = pool.alloc_copy(b"world");
        assert_eq!(&buf2[..], b"world");
        assert!(buf2.capacity() >= cap || pool.free_count() == 0);
    }

    #[test]
    fn oversized_buffers_are_not_pooled() {
        let pool = BufferPool::new();
        let big = vec![0u8; MAX_POOLED_CAPACITY + 1];
        pool.free(big);
        assert_eq!(pool.free_count(), 0);
    }
}
