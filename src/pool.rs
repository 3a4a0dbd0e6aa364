//! Fixed-class shard buffer pool.
//!
//! Shard reads are all-or-nothing on memory: a Get that cannot obtain a
//! buffer fails outright instead of degrading. Buffers are recycled
//! through per-size-class free lists and zero-filled on every hand-out,
//! so a reused buffer can never leak a previous blob's bytes.
//!
//! Ownership contract: a buffer obtained from [`MemPool::alloc`] is owned
//! by exactly one holder at a time and must come back through
//! [`MemPool::put`] on every exit path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Default size classes: class capacity → pooled buffer count.
pub fn default_classes() -> BTreeMap<usize, usize> {
    BTreeMap::from([
        (2 << 10, 1024),
        (64 << 10, 512),
        (512 << 10, 128),
        (2 << 20, 64),
        (8 << 20, 16),
    ])
}

struct ClassPool {
    /// Buffer capacity of this class
    capacity: usize,
    /// Max buffers kept on the free list
    limit: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// Process-wide shard buffer pool.
pub struct MemPool {
    classes: BTreeMap<usize, ClassPool>,
    allocated: AtomicU64,
    released: AtomicU64,
    in_use: AtomicI64,
}

impl MemPool {
    /// Build a pool from `class capacity → pooled count` entries.
    pub fn new(classes: BTreeMap<usize, usize>) -> Self {
        let classes = classes
            .into_iter()
            .map(|(capacity, limit)| {
                (
                    capacity,
                    ClassPool {
                        capacity,
                        limit,
                        free: Mutex::new(Vec::new()),
                    },
                )
            })
            .collect();
        MemPool {
            classes,
            allocated: AtomicU64::new(0),
            released: AtomicU64::new(0),
            in_use: AtomicI64::new(0),
        }
    }

    /// Get a zeroed buffer of exactly `size` bytes.
    ///
    /// The smallest class whose capacity covers `size` serves the
    /// request; if none does, the current Get is out of luck.
    pub fn alloc(&self, size: usize) -> Result<Vec<u8>> {
        let (_, class) = self
            .classes
            .range(size..)
            .next()
            .ok_or_else(|| Error::Internal(format!("no buffer class covers size {size}")))?;

        let mut buf = match class.free.lock().pop() {
            Some(buf) => buf,
            None => Vec::with_capacity(class.capacity),
        };
        buf.clear();
        buf.resize(size, 0);

        self.allocated.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(buf)
    }

    /// Return a buffer to its class.
    ///
    /// Buffers beyond the class limit are dropped.
    pub fn put(&self, buf: Vec<u8>) {
        self.released.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_sub(1, Ordering::Relaxed);

        if let Some((_, class)) = self.classes.range(..=buf.capacity()).next_back() {
            let mut free = class.free.lock();
            if free.len() < class.limit {
                free.push(buf);
            }
        }
    }

    /// Fully zero a buffer in place.
    pub fn zero(buf: &mut [u8]) {
        buf.fill(0);
    }

    /// Buffers currently handed out and not yet returned.
    pub fn in_use(&self) -> i64 {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Counters snapshot.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            allocated: self.allocated.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemPool {
    fn default() -> Self {
        Self::new(default_classes())
    }
}

/// Snapshot of pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub allocated: u64,
    pub released: u64,
    pub in_use: i64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_exact_size() {
        let pool = MemPool::default();
        let buf = pool.alloc(1000).unwrap();
        assert_eq!(buf.len(), 1000);
        assert!(buf.capacity() >= 2 << 10);
        pool.put(buf);
    }

    #[test]
    fn test_alloc_picks_smallest_class() {
        let pool = MemPool::new(BTreeMap::from([(1024, 4), (4096, 4)]));
        let buf = pool.alloc(1024).unwrap();
        assert_eq!(buf.capacity(), 1024);
        pool.put(buf);
        let buf = pool.alloc(1025).unwrap();
        assert_eq!(buf.capacity(), 4096);
        pool.put(buf);
    }

    #[test]
    fn test_alloc_oversize_fails() {
        let pool = MemPool::new(BTreeMap::from([(1024, 4)]));
        assert!(matches!(pool.alloc(2048), Err(Error::Internal(_))));
    }

    #[test]
    fn test_reuse_is_zeroed() {
        let pool = MemPool::new(BTreeMap::from([(1024, 4)]));
        let mut buf = pool.alloc(512).unwrap();
        buf.iter_mut().for_each(|b| *b = 0xAB);
        pool.put(buf);

        let buf = pool.alloc(1024).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        pool.put(buf);
    }

    #[test]
    fn test_zero() {
        let mut buf = vec![0xFFu8; 64];
        MemPool::zero(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_accounting_balances() {
        let pool = MemPool::default();
        let a = pool.alloc(100).unwrap();
        let b = pool.alloc(200).unwrap();
        assert_eq!(pool.in_use(), 2);
        pool.put(a);
        pool.put(b);
        assert_eq!(pool.in_use(), 0);

        let snap = pool.snapshot();
        assert_eq!(snap.allocated, 2);
        assert_eq!(snap.released, 2);
    }

    #[test]
    fn test_free_list_bounded() {
        let pool = MemPool::new(BTreeMap::from([(1024, 1)]));
        let a = pool.alloc(1024).unwrap();
        let b = pool.alloc(1024).unwrap();
        pool.put(a);
        // second return exceeds the class limit and is dropped
        pool.put(b);
        assert_eq!(pool.in_use(), 0);
    }
}
