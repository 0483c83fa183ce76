//! The bandwidth monitor CLI.
//!
//! `bwmon <sample_interval_ms> [out_file] [pid_or_cmd ...]`
//!
//! With a single argument, samples indefinitely to stdout. With three or
//! more, writes to `out_file` and stops once the tracked child exits.

use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::process::{Child, Command};
use std::time::Duration;

use cipp::bandwidth;
use cipp::uncore::{CounterGroup, UncoreTopology};

enum Sink {
    Stdout,
    File(File),
}

impl Sink {
    fn write_line(&mut self, line: &str) {
        let result = match self {
            Sink::Stdout => {
                let mut out = io::stdout();
                writeln!(out, "{line}")
            }
            Sink::File(f) => writeln!(f, "{line}"),
        };
        if let Err(e) = result {
            log::warn!("failed to write sample line: {e}");
        }
    }
}

/// What to wait on before stopping, per the third-and-later CLI argument.
enum Tracked {
    None,
    Pid(i32),
    Child(Child),
}

impl Tracked {
    /// A child-reap poll. Tracking a foreign pid has no waitable fd
    /// without `pidfd_open`, and polling keeps both cases uniform.
    fn has_exited(&mut self) -> bool {
        match self {
            Tracked::None => false,
            Tracked::Pid(pid) => !std::path::Path::new(&format!("/proc/{pid}")).exists(),
            Tracked::Child(child) => matches!(child.try_wait(), Ok(Some(_))),
        }
    }
}

fn usage() -> ! {
    eprintln!("Usage: bwmon <sample interval (ms)> [out file] [pid or cmd and args]");
    std::process::exit(-1);
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage();
    }
    let Ok(sample_interval_ms) = args[1].parse::<u64>() else { usage() };

    let (mut sink, mut tracked) = if args.len() >= 4 {
        let out_file = match File::create(&args[2]) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("could not open {} for writing: {e}", args[2]);
                std::process::exit(-1);
            }
        };
        let tracked = spawn_or_attach(&args[3..]);
        (Sink::File(out_file), tracked)
    } else {
        (Sink::Stdout, Tracked::None)
    };

    let topology = match UncoreTopology::discover() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("uncore discovery failed: {e}");
            std::process::exit(1);
        }
    };

    let mut node_groups: Vec<(CounterGroup, CounterGroup)> = topology
        .socket_cpus
        .iter()
        .map(|&cpu| {
            let rd = CounterGroup::open_for_cpu(cpu, &topology.types, &topology.read_configs);
            let wr = CounterGroup::open_for_cpu(cpu, &topology.types, &topology.write_configs);
            (rd, wr)
        })
        .collect();

    loop {
        let mut total = 0i64;
        for (i, (rd, wr)) in node_groups.iter_mut().enumerate() {
            let sample = bandwidth::sample(rd, wr, Duration::from_millis(sample_interval_ms));
            total += sample.total_mbps();
            sink.write_line(&format!(
                "Node {i}: Read {} Write {} Total {} MB/s",
                sample.read_mbps,
                sample.write_mbps,
                sample.total_mbps()
            ));
        }
        sink.write_line(&format!("Aggregate BW: {total}"));
        sink.write_line("");

        if tracked.has_exited() {
            break;
        }
    }
}

fn spawn_or_attach(rest: &[String]) -> Tracked {
    if rest.len() == 1 {
        if let Ok(pid) = rest[0].parse::<i32>() {
            return Tracked::Pid(pid);
        }
    }
    match Command::new(&rest[0]).args(&rest[1..]).spawn() {
        Ok(child) => Tracked::Child(child),
        Err(e) => {
            eprintln!("failed to launch {}: {e}", rest[0]);
            std::process::exit(-1);
        }
    }
}
