//! Uncore IMC counter discovery and the counter-handle/group primitives
//! built on top of it: an immutable discovery result, then handles opened
//! against it.

pub mod group;
pub mod handle;

use std::fs;
use std::path::Path;

pub use group::CounterGroup;
pub use handle::CounterHandle;

use crate::error::{Error, Result};

const MAX_IMC_INDEX: u32 = 12;

/// CXL uncore event configuration, hard-wired for the platform generation
/// enabled at build time via the `gnr` feature.
#[derive(Debug, Clone)]
pub struct CxlExtensions {
    pub types: Vec<u32>,
    pub read_configs: Vec<u64>,
    pub write_configs: Vec<u64>,
}

#[cfg(feature = "gnr")]
impl CxlExtensions {
    /// Fixed CXL.mem bandwidth monitor event codes for the GNR uncore PMU
    /// generation. Opened pinned to CPU 0, same as the DRAM IMC counters.
    fn discover() -> Self {
        Self {
            types: vec![0x33],
            read_configs: vec![0x0704],
            write_configs: vec![0x0804],
        }
    }
}

/// Immutable result of probing the host's uncore IMC device tree.
///
/// Built once at startup; every field is discovery-time data, never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct UncoreTopology {
    pub types: Vec<u32>,
    pub read_configs: Vec<u64>,
    pub write_configs: Vec<u64>,
    pub socket_cpus: Vec<u32>,
    pub cxl: Option<CxlExtensions>,
}

impl UncoreTopology {
    /// Probes `/sys/devices` for `uncore_imc_{0..12}` units.
    pub fn discover() -> Result<Self> {
        Self::discover_under(Path::new("/sys/devices"))
    }

    /// Same as [`Self::discover`] but rooted at an arbitrary directory, so
    /// tests can point it at a fabricated sysfs tree.
    pub fn discover_under(base: &Path) -> Result<Self> {
        let mut types = Vec::new();
        let mut read_configs = Vec::new();
        let mut write_configs = Vec::new();
        let mut socket_cpus = Vec::new();

        // uncore_imc_ indices go from 0 to 11 with gaps on some platforms,
        // so every index is tried rather than stopping at the first miss.
        for i in 0..MAX_IMC_INDEX {
            let unit_dir = base.join(format!("uncore_imc_{i}"));

            let type_ = match read_decimal(&unit_dir.join("type")) {
                Ok(t) => t,
                Err(_) => continue,
            };
            types.push(type_);

            // Only the last IMC we can fully read contributes the CAS
            // event descriptors and cpumask -- they're identical across
            // units on homogeneous sockets.
            if let (Ok(cpus), Ok(rd), Ok(wr)) = (
                read_cpumask(&unit_dir.join("cpumask")),
                read_cas_event(&unit_dir.join("events/cas_count_read")),
                read_cas_event(&unit_dir.join("events/cas_count_write")),
            ) {
                socket_cpus = cpus;
                read_configs = vec![rd];
                write_configs = vec![wr];

                // "Quick hack: In SPR and GNR, there are two channels for
                // reads and writes, SCH0 and SCH1. SCH0 is found in the
                // file. The event for SCH1 is just one larger than SCH0."
                #[cfg(feature = "gnr")]
                {
                    read_configs.push(rd + 1);
                    write_configs.push(wr + 1);
                }
            }
        }

        if types.is_empty() {
            return Err(Error::Discovery(format!(
                "no uncore_imc_* units found under {}",
                base.display()
            )));
        }
        if socket_cpus.is_empty() {
            return Err(Error::Discovery(
                "no readable cpumask/cas_count_* files among discovered IMC units".into(),
            ));
        }

        #[cfg(feature = "gnr")]
        let cxl = Some(CxlExtensions::discover());
        #[cfg(not(feature = "gnr"))]
        let cxl = None;

        Ok(Self {
            types,
            read_configs,
            write_configs,
            socket_cpus,
            cxl,
        })
    }
}

fn read_decimal(path: &Path) -> Result<u32> {
    let s = fs::read_to_string(path).map_err(Error::Io)?;
    s.trim()
        .parse()
        .map_err(|e| Error::Discovery(format!("{}: not a decimal integer: {e}", path.display())))
}

/// Parses a `cpumask` file: a comma-separated list of decimal CPU ids.
///
/// Deliberately does not expand `a-b` ranges: each comma-delimited token is
/// parsed as a decimal integer that stops at the first non-digit
/// character, so a token like `0-3` yields just CPU `0` and the rest of
/// that token (`-3`) is discarded rather than expanded. A mask of
/// `0-3,8-11` therefore yields `[0, 8]`, not `[0,1,2,3,8,9,10,11]`. See
/// DESIGN.md for why this stays narrow instead of expanding ranges.
fn read_cpumask(path: &Path) -> Result<Vec<u32>> {
    let s = fs::read_to_string(path).map_err(Error::Io)?;
    s.trim()
        .split(',')
        .map(|tok| {
            let digits: String = tok.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits
                .parse()
                .map_err(|e| Error::Discovery(format!("{}: bad cpu id {tok:?}: {e}", path.display())))
        })
        .collect()
}

/// Parses an `events/cas_count_{read,write}` file of the form
/// `event=<hex>,umask=<hex>` into the opened counter's `config` word.
fn read_cas_event(path: &Path) -> Result<u64> {
    let s = fs::read_to_string(path).map_err(Error::Io)?;
    let s = s.trim();

    let mut event = None;
    let mut umask = None;
    for part in s.split(',') {
        let (key, val) = part
            .split_once('=')
            .ok_or_else(|| Error::Discovery(format!("{path:?}: malformed event descriptor {s:?}")))?;
        let val = u64::from_str_radix(val.trim_start_matches("0x"), 16)
            .map_err(|e| Error::Discovery(format!("{path:?}: bad hex in {s:?}: {e}")))?;
        match key {
            "event" => event = Some(val),
            "umask" => umask = Some(val),
            _ => {}
        }
    }

    let event = event.ok_or_else(|| Error::Discovery(format!("{path:?}: missing event=")))?;
    let umask = umask.ok_or_else(|| Error::Discovery(format!("{path:?}: missing umask=")))?;
    Ok((umask << 8) | event)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn discovers_types_and_configs_across_gapped_indices() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();

        write(&base.join("uncore_imc_0/type"), "18\n");
        write(&base.join("uncore_imc_0/cpumask"), "0,36\n");
        write(&base.join("uncore_imc_0/events/cas_count_read"), "event=0x04,umask=0xcf\n");
        write(&base.join("uncore_imc_0/events/cas_count_write"), "event=0x04,umask=0x30\n");
        // Gap at index 1, another unit at index 3.
        write(&base.join("uncore_imc_3/type"), "19\n");

        let topo = UncoreTopology::discover_under(base).unwrap();
        assert_eq!(topo.types, vec![18, 19]);
        assert_eq!(topo.socket_cpus, vec![0, 36]);
        assert_eq!(topo.read_configs, vec![(0xcf << 8) | 0x04]);
        assert_eq!(topo.write_configs, vec![(0x30 << 8) | 0x04]);
    }

    #[test]
    fn hyphen_range_in_cpumask_only_takes_first_cpu() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        write(&base.join("uncore_imc_0/type"), "18\n");
        write(&base.join("uncore_imc_0/cpumask"), "0-3\n");
        write(&base.join("uncore_imc_0/events/cas_count_read"), "event=0x04,umask=0xcf\n");
        write(&base.join("uncore_imc_0/events/cas_count_write"), "event=0x04,umask=0x30\n");

        let topo = UncoreTopology::discover_under(base).unwrap();
        // Documented restriction: "0-3" is not expanded to [0,1,2,3].
        assert_eq!(topo.socket_cpus, vec![0]);
    }

    #[test]
    fn missing_tree_is_a_discovery_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = UncoreTopology::discover_under(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }
}
