//! # Netbench Core
//!
//! The measurement core of an Ethernet benchmark traffic generator and
//! analyzer: a rate-paced send/receive trial engine, the wire-format
//! codec it drives, and the orchestrators that turn a test
//! specification into a sequence of trials (binary-search throughput,
//! latency-at-loads, frame-loss sweep, back-to-back burst capacity,
//! system recovery, and SLA service-activation testing).
//!
//! This crate is deliberately narrow: command-line parsing, YAML
//! configuration loading, terminal/web UIs, output marshalling, and the
//! concrete packet I/O back-end all live outside it. The only contract
//! this crate has with packet I/O is [`io_adapter::IoAdapter`].

pub mod api;
pub mod codec;
pub mod context;
pub mod error;
pub mod io_adapter;
pub mod latency;
pub mod orchestrators;
pub mod pacer;
pub mod seq_tracker;
pub mod timer;
pub mod trial;
pub mod utils;
pub mod workers;

pub use api::{TestOutcome, TestType};
pub use context::{RunConfig, RunContext, RunState};
pub use error::{BenchError, Result};
pub use io_adapter::{IoAdapter, IoConfig, LoopbackAdapter, Packet};
pub use orchestrators::{Service, ServiceSla};
pub use trial::{FrameAddresses, TrialEngine, TrialResult, TrialSpec};

/// The current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Standard frame sizes a full test suite sweeps over (SPEC_FULL.md
/// §6). 9000 (jumbo) is opt-in, not part of the standard set.
///
/// 64 is listed for completeness but [`codec::PacketCodec::create_template`]
/// rejects it: the mandatory header stack plus payload header needs at
/// least [`codec::MIN_FRAME_SIZE`] bytes (see DESIGN.md's Open Question
/// decision #5). Callers sweeping this list for real trials should skip
/// sizes below that floor.
pub const STANDARD_FRAME_SIZES: [usize; 7] = [64, 128, 256, 512, 1024, 1280, 1518];

/// Optional jumbo frame size, usable anywhere a frame size list is
/// built but excluded from [`STANDARD_FRAME_SIZES`].
pub const JUMBO_FRAME_SIZE: usize = 9000;

/// Default offered loads for the latency-at-loads orchestrator: 10% ..=
/// 100% in 10% steps (SPEC_FULL.md §6).
pub fn default_loads_pct() -> Vec<f64> {
    orchestrators::latency_sweep::default_loads()
}
