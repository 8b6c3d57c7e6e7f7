use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};

use crate::error::{Error, Result};

// Buffer — Reference-counted device memory
//
// A Buffer models one allocation on the device. Multiple arrays may share a
// single buffer (views at different offsets); the allocation is released
// when the last referencing array is dropped. The host-visible byte storage
// here stands in for device memory: a hardware backend would wrap its native
// handle the same way.
//
// There is no per-buffer lock protecting concurrent writers. Correctness
// relies on the dispatch layer's invariant that views written by different
// operations occupy disjoint byte ranges.

struct BufferInner {
    len: usize,
    data: RwLock<Vec<u8>>,
    /// Accounting hook back to the owning allocator, if any. Buffers
    /// created directly from host data are untracked.
    allocator: Option<Weak<AllocState>>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        if let Some(state) = self.allocator.as_ref().and_then(Weak::upgrade) {
            state.release(self.len);
        }
    }
}

/// A reference-counted byte buffer shared by one or more arrays.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// Wrap host bytes in an untracked buffer (test and host-constructor path).
    pub fn from_vec(data: Vec<u8>) -> Buffer {
        Buffer {
            inner: Arc::new(BufferInner {
                len: data.len(),
                data: RwLock::new(data),
                allocator: None,
            }),
        }
    }

    fn tracked(nbytes: usize, allocator: Weak<AllocState>) -> Buffer {
        Buffer {
            inner: Arc::new(BufferInner {
                len: nbytes,
                data: RwLock::new(vec![0u8; nbytes]),
                allocator: Some(allocator),
            }),
        }
    }

    /// Allocated size in bytes.
    pub fn size(&self) -> usize {
        self.inner.len
    }

    /// Whether two handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read `len` bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let data = self.inner.data.read().unwrap();
        data[offset..offset + len].to_vec()
    }

    /// Copy the full contents out.
    pub fn read_all(&self) -> Vec<u8> {
        self.inner.data.read().unwrap().clone()
    }

    /// Write bytes starting at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.inner.data.write().unwrap();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer({} bytes)", self.inner.len)
    }
}

// Allocator — Blocking device memory acquisition
//
// The allocator is the only suspension point in the dispatch layer:
// `malloc_or_wait` blocks the calling thread until enough memory has been
// reclaimed, and fails only when the request can never be satisfied. No
// retry policy lives here; that belongs to the graph evaluator.

/// Device memory allocator interface consumed by the dispatch layer.
pub trait Allocator: Send + Sync {
    /// Allocate `nbytes`, blocking until memory is available. Returns an
    /// error only if the request exceeds what the device could ever hold.
    fn malloc_or_wait(&self, nbytes: usize) -> Result<Buffer>;

    /// Bytes currently held by live buffers.
    fn bytes_in_use(&self) -> usize;
}

struct AllocState {
    capacity: usize,
    used: Mutex<AllocCounters>,
    reclaimed: Condvar,
}

#[derive(Default)]
struct AllocCounters {
    in_use: usize,
    peak: usize,
}

impl AllocState {
    fn release(&self, nbytes: usize) {
        let mut counters = self.used.lock().unwrap();
        counters.in_use -= nbytes;
        drop(counters);
        self.reclaimed.notify_all();
    }
}

/// Snapshot of allocator statistics.
#[derive(Debug, Clone, Copy)]
pub struct AllocStats {
    pub in_use: usize,
    pub peak: usize,
    pub capacity: usize,
}

/// A capacity-tracked host allocator.
///
/// Zero-initializes storage and debits a byte budget; when the budget is
/// exhausted, `malloc_or_wait` parks the caller until another buffer is
/// dropped. Clonable — clones share the same budget.
#[derive(Clone)]
pub struct HostAllocator {
    state: Arc<AllocState>,
}

impl HostAllocator {
    /// Allocator with a fixed byte capacity.
    pub fn new(capacity: usize) -> HostAllocator {
        HostAllocator {
            state: Arc::new(AllocState {
                capacity,
                used: Mutex::new(AllocCounters::default()),
                reclaimed: Condvar::new(),
            }),
        }
    }

    /// Allocator that never blocks.
    pub fn unbounded() -> HostAllocator {
        HostAllocator::new(usize::MAX)
    }

    /// Return a snapshot of allocation statistics.
    pub fn stats(&self) -> AllocStats {
        let counters = self.state.used.lock().unwrap();
        AllocStats {
            in_use: counters.in_use,
            peak: counters.peak,
            capacity: self.state.capacity,
        }
    }
}

impl Allocator for HostAllocator {
    fn malloc_or_wait(&self, nbytes: usize) -> Result<Buffer> {
        if nbytes > self.state.capacity {
            return Err(Error::AllocationFailed {
                requested: nbytes,
                capacity: self.state.capacity,
            });
        }
        let mut counters = self.state.used.lock().unwrap();
        while counters.in_use.saturating_add(nbytes) > self.state.capacity {
            counters = self.state.reclaimed.wait(counters).unwrap();
        }
        counters.in_use += nbytes;
        counters.peak = counters.peak.max(counters.in_use);
        drop(counters);
        Ok(Buffer::tracked(nbytes, Arc::downgrade(&self.state)))
    }

    fn bytes_in_use(&self) -> usize {
        self.state.used.lock().unwrap().in_use
    }
}
