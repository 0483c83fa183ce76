//! The only place the controller touches the kernel's weighted-interleave
//! control surface: a direct write to each node's control file, no
//! shelling out to `echo`/`tee`.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

/// Persists a `(local, remote)` weight pair. No read-back, no side effect
/// beyond the writes themselves.
pub trait WeightSink {
    fn set_weights(&mut self, local: u8, remote: u8);
}

/// Writes decimal ASCII byte values to the kernel's
/// `weighted_interleave/node{0,1}` control files.
///
/// A write failure is logged and otherwise ignored: the controller
/// continues at the last successfully committed ratio.
pub struct KernelWeightSink {
    node0: PathBuf,
    node1: PathBuf,
}

impl KernelWeightSink {
    pub fn new() -> Self {
        Self::at(Path::new("/sys/kernel/mm/mempolicy/weighted_interleave"))
    }

    /// Same as [`Self::new`] but rooted at an arbitrary directory, so tests
    /// can point it at a scratch directory instead of the real sysfs tree.
    pub fn at(dir: &Path) -> Self {
        Self {
            node0: dir.join("node0"),
            node1: dir.join("node1"),
        }
    }
}

impl Default for KernelWeightSink {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightSink for KernelWeightSink {
    fn set_weights(&mut self, local: u8, remote: u8) {
        if let Err(e) = fs::write(&self.node0, local.to_string()) {
            warn!("failed to write {}: {e}", self.node0.display());
        }
        if let Err(e) = fs::write(&self.node1, remote.to_string()) {
            warn!("failed to write {}: {e}", self.node1.display());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct MockSink {
        calls: Vec<(u8, u8)>,
    }

    impl WeightSink for MockSink {
        fn set_weights(&mut self, local: u8, remote: u8) {
            self.calls.push((local, remote));
        }
    }

    #[test]
    fn mock_sink_records_the_committed_pair() {
        let mut sink = MockSink { calls: Vec::new() };
        sink.set_weights(255, 1);
        assert_eq!(sink.calls, vec![(255, 1)]);
    }

    #[test]
    fn kernel_sink_writes_both_node_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = KernelWeightSink::at(dir.path());
        sink.set_weights(70, 30);
        assert_eq!(fs::read_to_string(dir.path().join("node0")).unwrap(), "70");
        assert_eq!(fs::read_to_string(dir.path().join("node1")).unwrap(), "30");
    }
}
