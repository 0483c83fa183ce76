//! The optional page migrator: consumes PEBS `L3_MISS` load samples per
//! CPU, tracks per-process per-page hit counts, and periodically issues a
//! batched `move_pages` migration whose destination is a pure function of
//! each page's physical address and the current ratio.

mod pages;

use std::fs;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

pub use pages::{PageInfo, PerProcessPages};

use crate::ffi::bindings::{PERF_SAMPLE_ADDR, PERF_SAMPLE_PHYS_ADDR, PERF_SAMPLE_TID};
use crate::ffi::syscall::move_pages;
use crate::ring::{Record, Ring};
use crate::uncore::CounterHandle;

/// `MEM_LOAD_RETIRED.L3_MISS`, raw event encoding.
pub const L3_MISS_EVENT: u64 = 0x20D1;
/// Samples every 5000 occurrences of the event.
pub const SAMPLE_PERIOD: u64 = 5000;
/// Ring data region: 2^DATA_PAGES_EXP pages, a `perf_event_open` ring size
/// must be a power of two.
const DATA_PAGES_EXP: u32 = 7;

const PAGE_SHIFT: u32 = 12;
const HUGE_PAGE_SHIFT: u32 = 21;
const PAGE_MASK: u64 = !((1u64 << PAGE_SHIFT) - 1);
const HUGE_PAGE_MASK: u64 = !((1u64 << HUGE_PAGE_SHIFT) - 1);

const KPF_ANON: u64 = 1 << 12;
const KPF_THP: u64 = 1 << 22;

/// Default cadence between migration passes.
pub const DEFAULT_MIGRATE_INTERVAL: Duration = Duration::from_millis(1000);
/// At most this many (address, node) pairs per process per pass.
const MAX_BATCH: usize = 100_000;
/// `count *= 0.67` each pass, kept as an integer-preserving multiply-then-
/// divide rather than floating point.
const DAMP_NUM: u64 = 67;
const DAMP_DEN: u64 = 100;

/// The kernel's per-PFN flags table: a flat binary file of 8-byte
/// little-endian entries, indexed by PFN.
struct KpageFlags {
    file: fs::File,
}

impl KpageFlags {
    fn open() -> io::Result<Self> {
        Ok(Self {
            file: fs::File::open("/proc/kpageflags")?,
        })
    }

    fn read(&self, pfn: u64) -> io::Result<u64> {
        use std::io::{Read, Seek, SeekFrom};
        let mut f = &self.file;
        f.seek(SeekFrom::Start(pfn * 8))?;
        let mut buf = [0u8; 8];
        f.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// One per-CPU PEBS counter and its mapped ring.
struct CpuSampler {
    ring: Ring,
    handle: CounterHandle,
}

/// Owns every per-CPU ring and the per-process page maps; runs the sample
/// loop and periodic migration pass.
///
/// The only thing shared with the control task is `current_ratio`, a
/// relaxed atomic the ratio controller writes and this type reads.
pub struct Migrator {
    cpus: Vec<CpuSampler>,
    kpageflags: KpageFlags,
    pages: PerProcessPages,
    migrate_interval: Duration,
    deadline: Instant,
}

impl Migrator {
    /// Opens one sampling counter + ring per online CPU.
    pub fn setup(migrate_interval: Duration) -> io::Result<Self> {
        let sample_type = PERF_SAMPLE_TID | PERF_SAMPLE_ADDR | PERF_SAMPLE_PHYS_ADDR;
        let mut cpus = Vec::new();
        for cpu in online_cpus()? {
            let Some(handle) = CounterHandle::open_sampling(cpu as i32, L3_MISS_EVENT, SAMPLE_PERIOD, sample_type)
            else {
                continue;
            };
            let ring = Ring::new(handle.file(), 1 << DATA_PAGES_EXP)?;
            handle.enable();
            cpus.push(CpuSampler { ring, handle });
        }
        Ok(Self {
            cpus,
            kpageflags: KpageFlags::open()?,
            pages: PerProcessPages::new(),
            migrate_interval,
            deadline: Instant::now() + migrate_interval,
        })
    }

    /// Drains every non-empty ring once, upserting hit counts, then runs a
    /// migration pass if the deadline has passed. Sleeps 1ms if every ring
    /// was empty.
    pub fn run_once(&mut self, current_ratio: &AtomicU8) {
        let mut saw_sample = false;
        for cpu in &self.cpus {
            if let Some(Record::Sample { pid, phys_addr, .. }) = cpu.ring.next() {
                saw_sample = true;
                if let Err(e) = self.record_sample(pid, phys_addr) {
                    log::warn!("failed to classify sample pid={pid} phys_addr={phys_addr:#x}: {e}");
                }
            }
        }

        if Instant::now() >= self.deadline {
            self.migrate(current_ratio.load(Ordering::Relaxed));
            self.deadline = Instant::now() + self.migrate_interval;
        }

        if !saw_sample {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn record_sample(&mut self, pid: u32, phys_addr: u64) -> io::Result<()> {
        let pfn = phys_addr >> PAGE_SHIFT;
        let flags = self.kpageflags.read(pfn)?;
        if flags & KPF_ANON == 0 {
            return Ok(());
        }

        let (aligned_addr, shift, huge) = if flags & KPF_THP != 0 {
            (phys_addr & HUGE_PAGE_MASK, HUGE_PAGE_SHIFT, true)
        } else {
            (phys_addr & PAGE_MASK, PAGE_SHIFT, false)
        };
        let addr_mod_100 = ((aligned_addr >> shift) % 100) as u8;
        self.pages.record(pid, aligned_addr, addr_mod_100, huge);
        Ok(())
    }

    fn migrate(&mut self, ratio: u8) {
        for h in &self.cpus {
            h.handle.disable();
        }

        let pids: Vec<u32> = self.pages.pids().copied().collect();
        for pid in pids {
            let Some(page_map) = self.pages.pages_for(pid) else { continue };
            let mut addrs: Vec<*mut libc::c_void> = Vec::new();
            let mut nodes: Vec<i32> = Vec::new();
            for (&addr, info) in page_map.iter().take(MAX_BATCH) {
                addrs.push(addr as *mut libc::c_void);
                nodes.push(destination_node(info.addr_mod_100, ratio) as i32);
            }
            if addrs.is_empty() {
                continue;
            }
            let mut status = vec![0i32; addrs.len()];
            if let Err(e) = move_pages(pid as i32, &addrs, &nodes, &mut status) {
                log::warn!("move_pages failed for pid={pid}: {e}");
            }
        }

        self.pages.dampen_and_prune(DAMP_NUM, DAMP_DEN);

        for h in &self.cpus {
            h.handle.enable();
        }
    }
}

/// Pure: same (addr_mod_100, ratio) always yields the same destination.
pub fn destination_node(addr_mod_100: u8, ratio: u8) -> u8 {
    if (addr_mod_100 as u16) < ratio as u16 { 0 } else { 1 }
}

/// Parses `/sys/devices/system/cpu/online`, expanding hyphen ranges (see
/// DESIGN.md for why the uncore `cpumask` parser, unlike this one,
/// deliberately does not expand ranges).
fn online_cpus() -> io::Result<Vec<u32>> {
    let s = fs::read_to_string("/sys/devices/system/cpu/online")?;
    let mut cpus = Vec::new();
    for token in s.trim().split(',') {
        if let Some((lo, hi)) = token.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad cpu range"))?;
            let hi: u32 = hi.parse().map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad cpu range"))?;
            cpus.extend(lo..=hi);
        } else if !token.is_empty() {
            cpus.push(token.parse().map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad cpu id"))?);
        }
    }
    Ok(cpus)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn destination_node_splits_on_modulo_against_ratio() {
        // PFN=0x12340 -> addr_mod_100 = 74560 % 100 = 60.
        let addr_mod_100 = (0x12340u64 % 100) as u8;
        assert_eq!(addr_mod_100, 60);
        assert_eq!(destination_node(addr_mod_100, 70), 0);
        assert_eq!(destination_node(addr_mod_100, 50), 1);
    }

    #[test]
    fn destination_is_pure_and_deterministic() {
        for ratio in 0..=100u8 {
            let a = destination_node(32, ratio);
            let b = destination_node(32, ratio);
            assert_eq!(a, b);
        }
    }
}
