//! HEAD probing plumbing: the `Prober` seam consumed by workers, the
//! reqwest-backed `HttpProber`, transport options, and the outcome types that
//! travel from workers to the reorder buffer.

pub mod client;
pub mod options;
pub mod outcome;

pub use client::{HttpProber, ProbeError, ProbeFuture, Prober};
pub use options::ProberOptions;
pub use outcome::{ProbeOutcome, StatusOutcome, Submission};
