use std::fs::File;
use std::io::Result;
use std::ptr::{null_mut, NonNull};
use std::slice;

use crate::ffi::syscall::{mmap, munmap};

/// One mmapped ring: the kernel-owned header page followed by `data_pages`
/// pages of sample data.
pub struct Arena {
    ptr: NonNull<u8>,
    len: usize,
}

impl Arena {
    pub fn new(file: &File, data_pages: usize, page_size: usize) -> Result<Self> {
        let len = (1 + data_pages) * page_size;
        let prot = libc::PROT_READ | libc::PROT_WRITE;
        let flags = libc::MAP_SHARED;
        let ptr = unsafe { mmap(null_mut(), len, prot, flags, file, 0) }?.cast();
        Ok(Self { ptr, len })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.ptr.as_ptr() as _, self.len) } {
            log::warn!("failed to unmap ring arena: {e}");
        }
    }
}

// `Arena::ptr` stays valid for the lifetime of the owning `Ring`.
unsafe impl Send for Arena {}
