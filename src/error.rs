use std::io;

use thiserror::Error;

/// Crate-wide error type.
///
/// Per the fault model, most of these are logged and swallowed by callers
/// rather than propagated: only [`Error::Config`] is meant to reach `main`
/// and abort the process. In practice the two binaries catch malformed
/// argv before any `Result`-returning call runs (see `usage()` in each),
/// so this variant is exercised by library callers that validate
/// configuration values past simple argv parsing (e.g. a future caller
/// rejecting an out-of-range ratio), not by the CLIs' own argv checks.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration. Fatal: the caller should print [`Self`] and exit
    /// non-zero.
    #[error("{0}")]
    Config(String),

    /// A single uncore IMC or sysfs descriptor was missing or malformed.
    /// Callers skip the affected unit and continue discovery.
    #[error("uncore discovery: {0}")]
    Discovery(String),

    /// `perf_event_open`, an ioctl, or a read/write on an opened handle
    /// failed. Always non-fatal; the sample or commit degrades.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
