//! Closed-loop bandwidth controller for tiered-memory (NUMA/CXL) weighted
//! interleave: watches uncore memory-controller bandwidth and adapts the
//! kernel's local:remote interleave ratio to keep the local tier from
//! saturating while still pushing traffic to the remote tier.
//!
//! See [`uncore`] for counter discovery/handles, [`bandwidth`] for turning
//! counts into a MB/s figure, [`controller`] for the adaptive ratio search,
//! [`sink`] for committing a ratio to the kernel, and [`ring`]/[`migrate`]
//! for the optional PEBS-driven page migrator.

pub mod bandwidth;
pub mod controller;
pub mod error;
pub mod ffi;
pub mod migrate;
pub mod ring;
pub mod sink;
pub mod uncore;

pub use error::{Error, Result};
