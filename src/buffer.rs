// CLASSIFICATION: COMMUNITY
// Filename: buffer.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Pixel storage shared between kernel-side copies and user mappings, and
//! the allocator that hands out per-namespace backing buffers.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};

use crate::config::BackingStrategy;
use crate::error::{FbNsError, FbResult};
use crate::fbns_types::PAGE_SIZE;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

struct BufferInner {
    id: u64,
    len: usize,
    aliased: bool,
    bytes: RwLock<Vec<u8>>,
}

/// Reference-counted pixel memory.
///
/// Clones alias the same storage. A single-page buffer presents `len`
/// logical bytes backed by one page, so every page of the logical range
/// reads and writes the same physical bytes.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<BufferInner>,
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.inner.id)
            .field("len", &self.inner.len)
            .field("aliased", &self.inner.aliased)
            .finish()
    }
}

impl SharedBuffer {
    /// Allocate `len` zeroed bytes, reporting allocation failure.
    pub fn zeroed(len: usize) -> FbResult<Self> {
        Self::with_storage(len, len, false)
    }

    /// Allocate one zeroed page that stands in for `len` logical bytes.
    pub fn single_page(len: usize) -> FbResult<Self> {
        Self::with_storage(len, len.min(PAGE_SIZE), true)
    }

    fn with_storage(len: usize, storage: usize, aliased: bool) -> FbResult<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(storage)
            .map_err(|_| FbNsError::OutOfMemory { what: "pixel buffer" })?;
        bytes.resize(storage, 0);
        Ok(Self {
            inner: Arc::new(BufferInner {
                id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                len,
                aliased,
                bytes: RwLock::new(bytes),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Logical length in bytes.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Whether both handles refer to the same storage.
    pub fn same_as(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy bytes starting at `offset` into `out`. Returns the count copied.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> usize {
        let n = self.span(offset, out.len());
        let bytes = self.inner.bytes.read().unwrap_or_else(PoisonError::into_inner);
        if self.inner.aliased {
            for (i, slot) in out[..n].iter_mut().enumerate() {
                *slot = bytes[(offset + i) % bytes.len()];
            }
        } else {
            out[..n].copy_from_slice(&bytes[offset..offset + n]);
        }
        n
    }

    /// Store `data` starting at `offset`. Returns the count written.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> usize {
        let n = self.span(offset, data.len());
        let mut bytes = self.inner.bytes.write().unwrap_or_else(PoisonError::into_inner);
        if self.inner.aliased {
            let storage = bytes.len();
            for (i, b) in data[..n].iter().enumerate() {
                bytes[(offset + i) % storage] = *b;
            }
        } else {
            bytes[offset..offset + n].copy_from_slice(&data[..n]);
        }
        n
    }

    /// Fill the whole logical range with `value`.
    pub fn fill(&self, value: u8) {
        let mut bytes = self.inner.bytes.write().unwrap_or_else(PoisonError::into_inner);
        bytes.iter_mut().for_each(|b| *b = value);
    }

    /// Snapshot of the logical contents.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len()];
        self.read_at(0, &mut out);
        out
    }

    /// Copy the overlapping prefix of `src` into this buffer.
    ///
    /// The source is snapshotted first so two buffers never hold each
    /// other's locks.
    pub fn copy_from(&self, src: &SharedBuffer) -> usize {
        if self.same_as(src) {
            return self.len();
        }
        let n = self.len().min(src.len());
        let mut data = vec![0u8; n];
        src.read_at(0, &mut data);
        self.write_at(0, &data)
    }

    fn span(&self, offset: usize, want: usize) -> usize {
        if offset >= self.inner.len {
            0
        } else {
            want.min(self.inner.len - offset)
        }
    }
}

/// Allocation counters exposed for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Buffers allocated and not yet freed.
    pub live: usize,
    /// Buffers allocated since the allocator was created.
    pub total: usize,
    /// Bytes charged by live buffers.
    pub bytes: usize,
}

#[derive(Default)]
struct AllocCounters {
    live: AtomicUsize,
    total: AtomicUsize,
    bytes: AtomicUsize,
}

/// Hands out backing buffers under an optional memory ceiling.
pub struct BackingAllocator {
    strategy: BackingStrategy,
    limit: Option<usize>,
    counters: Arc<AllocCounters>,
}

impl BackingAllocator {
    pub fn new(strategy: BackingStrategy, limit: Option<usize>) -> Self {
        Self {
            strategy,
            limit,
            counters: Arc::new(AllocCounters::default()),
        }
    }

    pub fn strategy(&self) -> BackingStrategy {
        self.strategy
    }

    /// Allocate a backing buffer standing in for `len` bytes of hardware.
    ///
    /// Fails with `OutOfMemory` when the ceiling would be exceeded or the
    /// heap refuses; nothing is charged in that case.
    pub fn allocate(&self, len: usize) -> FbResult<BackingBuffer> {
        let charge = match self.strategy {
            BackingStrategy::Full => len,
            BackingStrategy::SinglePage => len.min(PAGE_SIZE),
        };
        self.charge(charge)?;
        let buffer = match self.strategy {
            BackingStrategy::Full => SharedBuffer::zeroed(len),
            BackingStrategy::SinglePage => SharedBuffer::single_page(len),
        };
        let buffer = match buffer {
            Ok(b) => b,
            Err(e) => {
                self.counters.bytes.fetch_sub(charge, Ordering::AcqRel);
                return Err(e);
            }
        };
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        self.counters.total.fetch_add(1, Ordering::AcqRel);
        info!(
            "allocated {} bytes ({:?}) for back buffer {}",
            charge,
            self.strategy,
            buffer.id()
        );
        Ok(BackingBuffer {
            buffer,
            charge,
            counters: Arc::clone(&self.counters),
        })
    }

    fn charge(&self, bytes: usize) -> FbResult<()> {
        let limit = self.limit;
        self.counters
            .bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                let next = cur.checked_add(bytes)?;
                match limit {
                    Some(max) if next > max => None,
                    _ => Some(next),
                }
            })
            .map(|_| ())
            .map_err(|_| FbNsError::OutOfMemory {
                what: "backing buffer",
            })
    }

    pub fn stats(&self) -> AllocStats {
        AllocStats {
            live: self.counters.live.load(Ordering::Acquire),
            total: self.counters.total.load(Ordering::Acquire),
            bytes: self.counters.bytes.load(Ordering::Acquire),
        }
    }
}

/// A backing buffer exclusively owned by one shadow record.
///
/// Dropping it returns its charge to the allocator. Existing user mappings
/// hold their own [`SharedBuffer`] handle and stay valid.
pub struct BackingBuffer {
    buffer: SharedBuffer,
    charge: usize,
    counters: Arc<AllocCounters>,
}

impl BackingBuffer {
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl fmt::Debug for BackingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackingBuffer")
            .field("buffer", &self.buffer)
            .field("charge", &self.charge)
            .finish()
    }
}

impl Drop for BackingBuffer {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
        self.counters.bytes.fetch_sub(self.charge, Ordering::AcqRel);
        debug!("freed back buffer {} ({} bytes)", self.buffer.id(), self.charge);
    }
}
