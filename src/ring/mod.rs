//! A pull-style, non-restartable iterator over one mmapped
//! `perf_event_mmap_page`-backed ring.
//!
//! The page migrator is the only consumer, and its PEBS samples are a
//! fixed, small record the kernel guarantees won't straddle the ring end
//! for this event family, so this reader assumes non-wrap alignment
//! rather than carrying general wrap-handling machinery.

mod arena;

use std::fs::File;
use std::io;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};

use arena::Arena;

use crate::ffi::bindings as b;
use crate::ffi::deref_offset;

/// One decoded record from the ring. Throttle/unthrottle records are
/// surfaced only so a caller can log them; the migrator does not act on
/// them.
#[derive(Debug, Clone, Copy)]
pub enum Record {
    /// A `PERF_RECORD_SAMPLE`, decoded under the fixed field layout this
    /// crate always requests: `TID | ADDR | PHYS_ADDR`.
    Sample { pid: u32, addr: u64, phys_addr: u64 },
    Throttle,
    Unthrottle,
}

/// A memory-mapped hardware-counter ring: one header page followed by
/// `data_pages` pages of record data. The migrator owns its per-CPU ring
/// mappings.
pub struct Ring {
    arena: Arena,
    logged_other: AtomicBool,
}

impl Ring {
    /// `data_pages` must be a power of two, matching the `mmap` length the
    /// kernel expects for `perf_event_open` rings.
    pub fn new(file: &File, data_pages: usize) -> io::Result<Self> {
        let page_size = page_size();
        let arena = Arena::new(file, data_pages, page_size)?;
        Ok(Self {
            arena,
            logged_other: AtomicBool::new(false),
        })
    }

    fn header(&self) -> &b::perf_event_mmap_page {
        unsafe { &*(self.arena.as_slice().as_ptr() as *const b::perf_event_mmap_page) }
    }

    pub fn is_empty(&self) -> bool {
        fence(Ordering::SeqCst);
        let hdr = self.header();
        let tail = unsafe { AtomicU64::from_ptr(&hdr.data_tail as *const u64 as *mut u64) }.load(Ordering::Relaxed);
        let head = unsafe { AtomicU64::from_ptr(&hdr.data_head as *const u64 as *mut u64) }.load(Ordering::Acquire);
        head == tail
    }

    /// Pulls zero or one record. Never blocks; returns `None` when the
    /// ring is caught up to `data_head`.
    pub fn next(&self) -> Option<Record> {
        fence(Ordering::SeqCst);
        let hdr = self.header();
        let tail_atomic = unsafe { AtomicU64::from_ptr(&hdr.data_tail as *const u64 as *mut u64) };
        let head_atomic = unsafe { AtomicU64::from_ptr(&hdr.data_head as *const u64 as *mut u64) };

        let tail = tail_atomic.load(Ordering::Relaxed);
        let head = head_atomic.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        let data_size = hdr.data_size;
        let data_offset = hdr.data_offset as usize;
        let base = self.arena.as_slice();
        let data = &base[data_offset..data_offset + data_size as usize];

        let pos = (tail % data_size) as usize;
        let header_ptr = data.as_ptr().wrapping_add(pos);
        let record_header = unsafe { std::ptr::read_unaligned(header_ptr as *const b::perf_event_header) };

        let mut body = data.as_ptr().wrapping_add(pos + size_of::<b::perf_event_header>());
        let record = match record_header.type_ {
            b::PERF_RECORD_SAMPLE => unsafe {
                let pid: u32 = deref_offset(&mut body);
                let _tid: u32 = deref_offset(&mut body);
                let addr: u64 = deref_offset(&mut body);
                let phys_addr: u64 = deref_offset(&mut body);
                Some(Record::Sample { pid, addr, phys_addr })
            },
            b::PERF_RECORD_THROTTLE => Some(Record::Throttle),
            b::PERF_RECORD_UNTHROTTLE => Some(Record::Unthrottle),
            other => {
                if !self.logged_other.swap(true, Ordering::Relaxed) {
                    log::warn!("unexpected ring record type {other}, ignoring (logged once)");
                }
                None
            }
        };

        // Advance past this record regardless of whether it decoded to
        // something the caller acts on -- the reader must never read the
        // same bytes twice.
        tail_atomic.store(tail + record_header.size as u64, Ordering::Release);

        match record {
            Some(r) => Some(r),
            None => self.next(),
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
