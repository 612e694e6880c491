use crate::pipeline::emitter::{EmitSummary, Emitter};
use crate::pipeline::ingest::Ingestor;
use crate::pipeline::reorder::ReorderBuffer;
use crate::pipeline::worker_pool::{WorkerPool, WorkerPoolParams};
use crate::probe::{HttpProber, Prober};
use crate::runtime::config::PipelineConfig;
use crate::runtime::coordinator::{Coordinator, Termination};
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Totals for one completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: u64,
    pub emitted: u64,
    /// Lines written with the sentinel status.
    pub failed: u64,
    /// The run stopped before every submission was written (Ctrl-C or closed output).
    pub interrupted: bool,
}

/// Probes every URL read from an input and writes one status line per URL, in input order.
pub struct HeadChecker {
    config: PipelineConfig,
    prober: Arc<dyn Prober>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl HeadChecker {
    pub fn new(config: PipelineConfig, prober: Arc<dyn Prober>) -> Self {
        Self::with_cancellation_token(config, prober, CancellationToken::new())
    }

    /// Builds a checker backed by the reqwest HEAD prober, using the configured probe timeout.
    pub fn with_http_prober(config: PipelineConfig) -> Result<Self> {
        let prober = HttpProber::from_config(&config).context("failed to build HTTP prober")?;
        Ok(Self::new(config, Arc::new(prober)))
    }

    /// Creates a checker whose runs are children of `shutdown`; cancelling it interrupts the
    /// current run after flushing what is already in order.
    pub fn with_cancellation_token(
        config: PipelineConfig,
        prober: Arc<dyn Prober>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            prober,
            telemetry: Arc::new(Telemetry::default()),
            shutdown,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Swaps the root token that future runs derive their cancellation from.
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        self.shutdown = shutdown;
    }

    /// Runs one full check: ingest `input`, probe with `jobs` workers, write to `output`.
    ///
    /// Returns once every submitted URL has been written, or earlier if the run is interrupted
    /// or a fatal error is captured. Probe failures are never errors; they appear as sentinel
    /// lines in the output.
    pub async fn run<R, W>(&self, input: R, output: W) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send,
    {
        self.config.validate()?;

        let run_token = self.shutdown.child_token();
        let coordinator = Coordinator::new(run_token.clone());
        let buffer = Arc::new(ReorderBuffer::with_window(self.config.reorder_window()));
        let jobs = self.config.jobs();

        let (intake_tx, intake_rx) = mpsc::channel(jobs);
        let (completion_tx, completion_rx) = mpsc::channel(jobs);

        let metrics = spawn_metrics_reporter(
            self.telemetry.clone(),
            buffer.clone(),
            run_token.clone(),
            self.config.metrics_interval(),
        );

        let mut pool = WorkerPool::new(WorkerPoolParams {
            jobs,
            probe_timeout: self.config.probe_timeout(),
            prober: self.prober.clone(),
            telemetry: self.telemetry.clone(),
        });
        pool.launch(intake_rx, completion_tx, coordinator.clone());

        let ingestor = Ingestor::new(
            input,
            buffer.clone(),
            intake_tx,
            self.telemetry.clone(),
            run_token.clone(),
        );
        let ingest = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                ingestor
                    .run()
                    .await
                    .map_err(|err| coordinator.abort("input ingestion failed", err))
            })
        };

        tracing::info!(
            jobs,
            window = buffer.window(),
            probe_timeout = ?self.config.probe_timeout(),
            "url checks started"
        );

        let mut emitter = Emitter::new(output, self.config.output_style(), self.telemetry.clone());
        let emitted = match emitter.run(buffer.clone().drain(completion_rx)).await {
            Ok(summary) => {
                settle(&coordinator, &buffer, &run_token, summary).await;
                summary
            }
            Err(err) => {
                let _ = coordinator.abort("failed to write results", err);
                EmitSummary::default()
            }
        };

        pool.shutdown().await;
        if let Err(err) = ingest.await {
            let _ = coordinator.abort(
                "input ingestion panicked",
                anyhow!("ingestion task failed: {err}"),
            );
        }
        if let Err(err) = metrics.await {
            tracing::warn!(error = %err, "metrics reporter failed to join");
        }

        if let Some(err) = coordinator.error() {
            return Err(err).context("url check pipeline aborted");
        }

        let counts = buffer.counts().await;
        let summary = RunSummary {
            submitted: counts.submitted,
            emitted: emitted.emitted,
            failed: emitted.failed,
            interrupted: coordinator.termination() == Some(Termination::Interrupted),
        };

        tracing::info!(
            submitted = summary.submitted,
            emitted = summary.emitted,
            failed = summary.failed,
            interrupted = summary.interrupted,
            peak_in_flight = self.telemetry.peak_in_flight(),
            "url checks finished"
        );

        Ok(summary)
    }
}

/// Decides how the run ended once the ordered stream is exhausted.
async fn settle(
    coordinator: &Coordinator,
    buffer: &ReorderBuffer,
    run_token: &CancellationToken,
    summary: EmitSummary,
) {
    if buffer.is_quiescent().await {
        coordinator.quiesce();
    } else if summary.output_closed {
        coordinator.interrupt("output closed");
    } else if run_token.is_cancelled() {
        coordinator.interrupt("shutdown requested");
    } else {
        let counts = buffer.counts().await;
        let _ = coordinator.abort(
            "result stream ended early",
            anyhow!(
                "completion channel closed with {} of {} submissions emitted",
                counts.emitted,
                counts.submitted
            ),
        );
    }
}
