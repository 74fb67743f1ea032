//! Error kinds shared by every component in this crate.
//!
//! Per-packet TX/RX failures are *not* represented here — they are counted
//! on the worker and folded into loss statistics, never surfaced as an
//! `Err`. These variants are reserved for conditions that abort a trial or
//! a run outright.

use thiserror::Error;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Rejected configuration, or an operation that would divide by a
    /// zero line rate.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `configure` was called while the run context was `RUNNING`.
    #[error("context is busy (a run is already in progress)")]
    Busy,

    /// The I/O adapter failed to initialize or suffered a catastrophic
    /// send/receive error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An allocation needed to start or continue a trial failed.
    #[error("out of memory")]
    OutOfMemory,

    /// The run's cancellation flag was observed set.
    #[error("cancelled")]
    Cancelled,

    /// Cancellation was observed partway through a multi-step test.
    /// Carries whatever steps completed before the flag was seen, so a
    /// caller does not lose them the way a bare `Cancelled` would lose
    /// everything (SPEC_FULL.md §4.10: "preserve any completed step
    /// results").
    #[error("cancelled after {} step(s) completed", .0.len())]
    CancelledWithSteps(Vec<crate::orchestrators::sla::SlaStepResult>),

    /// No I/O adapter is available for the requested configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// `cleanup` exceeded its 10 s shutdown budget.
    #[error("timed out waiting for shutdown")]
    Timeout,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BenchError>;
