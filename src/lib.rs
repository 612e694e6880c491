pub mod pipeline;
pub mod probe;
pub mod runtime;

pub use pipeline::checker::{HeadChecker, RunSummary};
pub use pipeline::emitter::{render_line, OutputStyle, ParseStyleError, SENTINEL};
pub use pipeline::reorder::{ReorderBuffer, ReorderCounts, Released};
pub use probe::{
    HttpProber, ProbeError, ProbeFuture, ProbeOutcome, Prober, ProberOptions, StatusOutcome,
    Submission,
};
pub use runtime::config::{PipelineConfig, PipelineConfigBuilder, PipelineConfigParams};
pub use runtime::coordinator::{Coordinator, Termination};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
