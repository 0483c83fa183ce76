use std::fs::File;
use std::io::{Error, Result};
use std::os::fd::{AsRawFd, FromRawFd};

use super::Attr;

pub fn perf_event_open(attr: &Attr, pid: i32, cpu: i32, group_fd: i32, flags: u64) -> Result<File> {
    let num = libc::SYS_perf_event_open;
    let fd = unsafe { libc::syscall(num, attr, pid, cpu, group_fd, flags) };
    if fd != -1 {
        Ok(unsafe { File::from_raw_fd(fd as _) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ioctl_arg(file: &File, op: u64, arg: u64) -> Result<i32> {
    let fd = file.as_raw_fd();
    let result = unsafe { libc::ioctl(fd, op as _, arg) };
    if result != -1 {
        Ok(result)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn read_u64(file: &File) -> Result<u64> {
    let fd = file.as_raw_fd();
    let mut count: u64 = 0;
    let ptr = &mut count as *mut u64 as *mut libc::c_void;
    let bytes = unsafe { libc::read(fd, ptr, size_of::<u64>()) };
    if bytes != -1 {
        Ok(count)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn mmap<T>(
    ptr: *mut (),
    len: usize,
    prot: i32,
    flags: i32,
    file: &File,
    offset: i64,
) -> Result<*mut T> {
    let ptr = libc::mmap(ptr as _, len, prot, flags, file.as_raw_fd(), offset);
    if ptr != libc::MAP_FAILED {
        Ok(ptr as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn munmap<T>(ptr: *mut T, len: usize) -> Result<()> {
    let result = libc::munmap(ptr as _, len);
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

/// `move_pages(2)`: batched page migration by physical (file-backed virtual,
/// in this crate's case the aligned anonymous address) address.
///
/// `pages` and `nodes` must be the same length; `status` receives one
/// per-page result code and must be the same length too.
pub fn move_pages(pid: i32, pages: &[*mut libc::c_void], nodes: &[i32], status: &mut [i32]) -> Result<()> {
    let count = pages.len();
    let result = unsafe {
        libc::syscall(
            libc::SYS_move_pages,
            pid,
            count as libc::c_ulong,
            pages.as_ptr(),
            nodes.as_ptr(),
            status.as_mut_ptr(),
            super::bindings::MPOL_MF_MOVE,
        )
    };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}
