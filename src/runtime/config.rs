use crate::pipeline::emitter::OutputStyle;
use crate::pipeline::reorder::DEFAULT_REORDER_WINDOW;
use crate::probe::options::DEFAULT_PROBE_TIMEOUT_SECS;
use crate::runtime::telemetry;
use anyhow::{bail, Result};
use std::num::NonZeroUsize;
use std::time::Duration;

const MAX_JOBS: usize = 4_096;

/// Runtime configuration for a URL check run.
///
/// All instances must be constructed via [`PipelineConfig::builder`] or [`PipelineConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    jobs: usize,
    probe_timeout: Duration,
    reorder_window: usize,
    metrics_interval: Duration,
    output_style: OutputStyle,
}

pub struct PipelineConfigParams {
    pub jobs: usize,
    pub probe_timeout: Duration,
    pub reorder_window: usize,
    pub metrics_interval: Duration,
    pub output_style: OutputStyle,
}

/// Worker count used when none is configured: one per available processing unit.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

impl PipelineConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values, running validation.
    pub fn new(params: PipelineConfigParams) -> Result<Self> {
        let PipelineConfigParams {
            jobs,
            probe_timeout,
            reorder_window,
            metrics_interval,
            output_style,
        } = params;

        let config = Self {
            jobs,
            probe_timeout,
            reorder_window,
            metrics_interval,
            output_style,
        };

        config.validate()?;
        Ok(config)
    }

    /// Number of concurrent probe workers; also the intake queue capacity.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Deadline applied to every individual probe.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Maximum number of submissions that may be outstanding (read but not yet written).
    pub fn reorder_window(&self) -> usize {
        self.reorder_window
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn output_style(&self) -> OutputStyle {
        self.output_style
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            bail!("jobs must be greater than 0");
        }

        if self.jobs > MAX_JOBS {
            bail!("jobs must be at most {MAX_JOBS}");
        }

        if self.probe_timeout.is_zero() {
            bail!("probe_timeout must be greater than 0");
        }

        if self.reorder_window == 0 {
            bail!("reorder_window must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PipelineConfigBuilder {
    jobs: Option<usize>,
    probe_timeout: Option<Duration>,
    reorder_window: Option<usize>,
    metrics_interval: Option<Duration>,
    output_style: Option<OutputStyle>,
}

impl PipelineConfigBuilder {
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = Some(window);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn output_style(mut self, style: OutputStyle) -> Self {
        self.output_style = Some(style);
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let params = PipelineConfigParams {
            jobs: self.jobs.unwrap_or_else(default_jobs),
            probe_timeout: self
                .probe_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS)),
            reorder_window: self.reorder_window.unwrap_or(DEFAULT_REORDER_WINDOW),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            output_style: self.output_style.unwrap_or_default(),
        };

        PipelineConfig::new(params)
    }
}
