//! Hand-rolled subset of `<linux/perf_event.h>`.
//!
//! The upstream library this crate grew out of generates these via `bindgen`
//! against a matrix of kernel header versions. We only ever read CAS-count
//! totals and `PERF_RECORD_SAMPLE`/`PERF_RECORD_THROTTLE` records out of raw
//! uncore and `MEM_LOAD_RETIRED_L3_MISS` events, so the handful of fields
//! below is kept in sync with the kernel UAPI by hand instead of pulling in
//! a build-time codegen step for layouts we never exercise.
#![allow(non_camel_case_types)]

pub const PERF_TYPE_RAW: u32 = 4;

pub const PERF_SAMPLE_IP: u64 = 1 << 0;
pub const PERF_SAMPLE_TID: u64 = 1 << 1;
pub const PERF_SAMPLE_ADDR: u64 = 1 << 3;
pub const PERF_SAMPLE_PHYS_ADDR: u64 = 1 << 19;

pub const PERF_RECORD_SAMPLE: u32 = 9;
pub const PERF_RECORD_THROTTLE: u32 = 5;
pub const PERF_RECORD_UNTHROTTLE: u32 = 6;

pub const PERF_EVENT_IOC_ENABLE: u64 = 0x2400;
pub const PERF_EVENT_IOC_DISABLE: u64 = 0x2401;
pub const PERF_EVENT_IOC_RESET: u64 = 0x2403;

/// `move_pages(2)` flag: migrate pages even if they are mapped by more than
/// one process. Matches `<linux/mempolicy.h>` `MPOL_MF_MOVE`.
pub const MPOL_MF_MOVE: libc::c_ulong = 1 << 1;

/// `struct perf_event_attr`, trimmed to the fields this crate sets.
///
/// Layout must match the kernel UAPI exactly: this is handed to
/// `perf_event_open(2)` by raw pointer.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct perf_event_attr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    /// Packs the single-bit flags the kernel expects, in declaration order:
    /// disabled, inherit, pinned, exclusive, exclude_user, exclude_kernel,
    /// exclude_hv, exclude_idle, mmap, comm, freq, ...
    pub flags: u64,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
}

pub const ATTR_FLAG_DISABLED: u64 = 1 << 0;
pub const ATTR_FLAG_INHERIT: u64 = 1 << 1;

impl perf_event_attr {
    pub fn new(type_: u32, config: u64) -> Self {
        Self {
            type_,
            size: size_of::<Self>() as u32,
            config,
            flags: ATTR_FLAG_DISABLED | ATTR_FLAG_INHERIT,
            ..Default::default()
        }
    }
}

/// `struct perf_event_header`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct perf_event_header {
    pub type_: u32,
    pub misc: u16,
    pub size: u16,
}

/// `struct perf_event_mmap_page`, trimmed to the ring-buffer bookkeeping
/// fields every record family uses. The reserved padding is kept so that
/// `data_offset`/`data_head`/`data_tail`/`data_size` land at the real kernel
/// offsets.
#[repr(C)]
pub struct perf_event_mmap_page {
    pub version: u32,
    pub compat_version: u32,
    pub lock: u32,
    pub index: u32,
    pub offset: i64,
    pub time_enabled: u64,
    pub time_running: u64,
    pub capabilities: u64,
    pub pmc_width: u16,
    pub time_shift: u16,
    pub time_mult: u32,
    pub time_offset: u64,
    pub time_zero: u64,
    pub size: u32,
    pub __reserved_1: u32,
    pub time_cycles: u64,
    pub time_mask: u64,
    pub __reserved: [u8; 116 * 8],
    pub data_head: u64,
    pub data_tail: u64,
    pub data_offset: u64,
    pub data_size: u64,
    pub aux_head: u64,
    pub aux_tail: u64,
    pub aux_offset: u64,
    pub aux_size: u64,
}
