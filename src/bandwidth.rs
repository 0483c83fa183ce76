//! Wraps two [`CounterGroup`]s (read CAS events, write CAS events) and
//! turns one sleep window into a single MB/s figure.

use std::thread;
use std::time::{Duration, Instant};

use crate::uncore::CounterGroup;

/// One sample window's read/write bandwidth, in MB/s (10^6-byte megabytes,
/// not MiB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub read_mbps: i64,
    pub write_mbps: i64,
}

impl Sample {
    pub fn total_mbps(self) -> i64 {
        self.read_mbps + self.write_mbps
    }
}

/// Bytes per CAS event: each column-address-strobe event moves one 64-byte
/// memory burst.
const BYTES_PER_CAS: u64 = 64;

/// Runs one sample window: reset + enable both groups, sleep, disable,
/// read. Division is by the *actual* elapsed microseconds, not
/// `window_ms`, so scheduler jitter never inflates the estimate.
pub fn sample(read_group: &CounterGroup, write_group: &CounterGroup, window: Duration) -> Sample {
    read_group.reset();
    write_group.reset();
    read_group.enable();
    write_group.enable();

    let t0 = Instant::now();
    thread::sleep(window);

    read_group.disable();
    write_group.disable();
    let elapsed_us = t0.elapsed().as_micros().max(1) as u64;

    let rd_count = read_group.read_sum();
    let wr_count = write_group.read_sum();

    Sample {
        read_mbps: ((rd_count * BYTES_PER_CAS) / elapsed_us) as i64,
        write_mbps: ((wr_count * BYTES_PER_CAS) / elapsed_us) as i64,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mbps_from_counts_and_elapsed_micros() {
        // 1_000_000 read + 2_000_000 write CAS events over a window
        // measured as 100_000us -> (3_000_000*64)/100_000 = 1920.
        let rd_count: u64 = 1_000_000;
        let wr_count: u64 = 2_000_000;
        let elapsed_us: u64 = 100_000;
        let total = ((rd_count + wr_count) * BYTES_PER_CAS) / elapsed_us;
        assert_eq!(total, 1920);
    }
}
