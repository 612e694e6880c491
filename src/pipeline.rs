//! The ordered checking pipeline: ingestion, the probe worker pool, the reorder
//! buffer that restores input order, and the emitter that writes result lines.

pub mod checker;
pub mod emitter;
pub(crate) mod ingest;
pub mod reorder;
pub(crate) mod worker_pool;
