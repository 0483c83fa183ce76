use std::fs::File;

use log::warn;

use crate::ffi::bindings as b;
use crate::ffi::syscall::{ioctl_arg, perf_event_open, read_u64};

/// One opened hardware counter, pinned to a single representative CPU.
///
/// Owned by exactly one [`super::CounterGroup`]; closed (via `Drop` on the
/// underlying `File`) on group teardown. A handle is always either
/// disabled-with-reset-pending, enabled, or disabled-with-valid-count --
/// [`Self::reset`]/[`Self::enable`]/[`Self::disable`] are the only state
/// transitions, and `read` never changes state.
pub struct CounterHandle {
    file: File,
}

impl CounterHandle {
    /// Opens one raw-PMU counter for `(type_, config)`, pinned to
    /// `cpu`, disabled and inheriting into children.
    ///
    /// Returns `None` rather than an error: individual open failures are
    /// skipped with a warning by the caller, the whole discovery call never
    /// fails because one (type, config) pair didn't open.
    pub fn open(cpu: i32, type_: u32, config: u64) -> Option<Self> {
        let attr = b::perf_event_attr::new(type_, config);
        match perf_event_open(&attr, -1, cpu, -1, 0) {
            Ok(file) => Some(Self { file }),
            Err(e) => {
                warn!("failed to open uncore counter type={type_} config={config:#x} cpu={cpu}: {e}");
                None
            }
        }
    }

    /// Opens a raw-PMU sampling counter (non-zero `sample_period`), used by
    /// the page migrator for `MEM_LOAD_RETIRED_L3_MISS`.
    pub fn open_sampling(cpu: i32, config: u64, sample_period: u64, sample_type: u64) -> Option<Self> {
        let mut attr = b::perf_event_attr::new(b::PERF_TYPE_RAW, config);
        attr.sample_period = sample_period;
        attr.sample_type = sample_type;
        match perf_event_open(&attr, -1, cpu, -1, 0) {
            Ok(file) => Some(Self { file }),
            Err(e) => {
                warn!("failed to open sampling counter config={config:#x} cpu={cpu}: {e}");
                None
            }
        }
    }

    pub fn reset(&self) {
        if let Err(e) = ioctl_arg(&self.file, b::PERF_EVENT_IOC_RESET, 0) {
            warn!("PERF_EVENT_IOC_RESET failed: {e}");
        }
    }

    pub fn enable(&self) {
        if let Err(e) = ioctl_arg(&self.file, b::PERF_EVENT_IOC_ENABLE, 0) {
            warn!("PERF_EVENT_IOC_ENABLE failed: {e}");
        }
    }

    pub fn disable(&self) {
        if let Err(e) = ioctl_arg(&self.file, b::PERF_EVENT_IOC_DISABLE, 0) {
            warn!("PERF_EVENT_IOC_DISABLE failed: {e}");
        }
    }

    /// Reads the 64-bit monotonic count since the last reset. A transient
    /// read failure degrades to 0 rather than propagating: if a counter
    /// read fails, the sample for this handle is skipped.
    pub fn read(&self) -> u64 {
        match read_u64(&self.file) {
            Ok(count) => count,
            Err(e) => {
                warn!("counter read failed: {e}");
                0
            }
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}
