//! The controller CLI.
//!
//! `cipp <sample_int_ms> <adjust_int_ms> <bw_saturation_cutoff_MBps> [migrate_flag]`

use std::env;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cipp::bandwidth;
use cipp::controller::{self, ControllerState, SampleHistory};
use cipp::migrate::{self, Migrator};
use cipp::sink::{KernelWeightSink, WeightSink};
use cipp::uncore::{CounterGroup, UncoreTopology};

fn usage() -> ! {
    eprintln!("Usage: cipp <sample int (ms)> <adjust int (ms)> <bw saturation cutoff (MB/s)> [migrate]");
    std::process::exit(-1);
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        usage();
    }

    let Ok(sample_int_ms) = args[1].parse::<u64>() else { usage() };
    let Ok(adjust_int_ms) = args[2].parse::<u64>() else { usage() };
    let Ok(bw_cutoff) = args[3].parse::<i64>() else { usage() };
    let migrate_enabled = args.get(4).is_some();

    println!(
        "Running with\n\tSample interval: {sample_int_ms} ms\n\tAdjust interval: {adjust_int_ms} ms\n\tBandwidth saturation cutoff: {bw_cutoff} MB/s"
    );

    let topology = match UncoreTopology::discover() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("uncore discovery failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut read_group = CounterGroup::open_for_sockets(&topology, &topology.read_configs);
    read_group.extend_with_cxl(&topology, |cxl| &cxl.read_configs);
    let mut write_group = CounterGroup::open_for_sockets(&topology, &topology.write_configs);
    write_group.extend_with_cxl(&topology, |cxl| &cxl.write_configs);

    let current_ratio = Arc::new(AtomicU8::new(100));

    if migrate_enabled {
        let current_ratio = Arc::clone(&current_ratio);
        std::thread::spawn(move || match Migrator::setup(migrate::DEFAULT_MIGRATE_INTERVAL) {
            Ok(mut migrator) => loop {
                migrator.run_once(&current_ratio);
            },
            Err(e) => log::error!("page migrator setup failed, running without it: {e}"),
        });
    }

    let capacity = (adjust_int_ms / sample_int_ms.max(1)).max(1) as usize;
    let mut history = SampleHistory::new(capacity);
    let mut state = ControllerState::default();
    let mut sink = KernelWeightSink::new();

    loop {
        let sample = bandwidth::sample(&read_group, &write_group, Duration::from_millis(sample_int_ms));
        history.push(sample.total_mbps());

        if history.is_full() {
            let adj = controller::adjust(&mut state, history.as_slice(), bw_cutoff);
            history.clear();

            let (local, remote) = controller::weights_for(adj.ratio);
            sink.set_weights(local, remote);
            current_ratio.store(adj.ratio, Ordering::Relaxed);

            println!(
                "Target ratio: {} BW Change: {} Int Change: {} BW: {}",
                adj.ratio, adj.bw_change, adj.interleave_change, adj.cur_bw
            );
        }
    }
}
