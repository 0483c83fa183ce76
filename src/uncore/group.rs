use super::{CounterHandle, UncoreTopology};

/// An ordered set of counter handles treated as a unit for a single
/// reset/enable/disable/read barrier. No uniqueness requirement across
/// groups -- the same handle never appears twice in one group, but the
/// bandwidth sampler holds two disjoint groups (read, write) built from
/// the same topology.
#[derive(Default)]
pub struct CounterGroup {
    handles: Vec<CounterHandle>,
}

impl CounterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: Option<CounterHandle>) {
        if let Some(h) = handle {
            self.handles.push(h);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Opens one counter per (socket CPU, IMC type, config) triple against
    /// `configs` (the read- or write-CAS config list). Individual open
    /// failures are skipped; this call itself never fails.
    pub fn open_for_sockets(topology: &UncoreTopology, configs: &[u64]) -> Self {
        let mut group = Self::new();
        for &cpu in &topology.socket_cpus {
            group.extend_for_cpu(cpu, &topology.types, configs);
        }
        group
    }

    /// Opens one counter per (IMC type, config) pair, all pinned to a
    /// single representative CPU -- the per-node slice of
    /// [`Self::open_for_sockets`], useful when a caller wants one group per
    /// socket instead of one group spanning every socket.
    pub fn open_for_cpu(cpu: u32, types: &[u32], configs: &[u64]) -> Self {
        let mut group = Self::new();
        group.extend_for_cpu(cpu, types, configs);
        group
    }

    fn extend_for_cpu(&mut self, cpu: u32, types: &[u32], configs: &[u64]) {
        for &type_ in types {
            for &config in configs {
                self.push(CounterHandle::open(cpu as i32, type_, config));
            }
        }
    }

    /// Opens the fixed CXL bandwidth-monitor counters, pinned to CPU 0, the
    /// same as the DRAM IMC counters. No-op if the topology has no CXL
    /// extensions (i.e. the `gnr` feature is disabled).
    pub fn extend_with_cxl(&mut self, topology: &UncoreTopology, configs_of: impl Fn(&super::CxlExtensions) -> &[u64]) {
        if let Some(cxl) = &topology.cxl {
            for &type_ in &cxl.types {
                for &config in configs_of(cxl) {
                    self.push(CounterHandle::open(0, type_, config));
                }
            }
        }
    }

    /// Best-effort reset of every handle in the group; individual ioctl
    /// failures are logged and otherwise ignored.
    pub fn reset(&self) {
        for h in &self.handles {
            h.reset();
        }
    }

    pub fn enable(&self) {
        for h in &self.handles {
            h.enable();
        }
    }

    pub fn disable(&self) {
        for h in &self.handles {
            h.disable();
        }
    }

    /// Sums every handle's 64-bit count.
    pub fn read_sum(&self) -> u64 {
        self.handles.iter().map(|h| h.read()).sum()
    }
}
