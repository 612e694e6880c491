use crate::pipeline::checker::{HeadChecker, RunSummary};
use crate::probe::{HttpProber, Prober};
use crate::runtime::config::PipelineConfig;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives a [`HeadChecker`] and turns OS signals into a graceful interruption.
pub struct Runner {
    checker: HeadChecker,
    shutdown: CancellationToken,
}

impl Runner {
    /// Creates a new runner and wires a root [`CancellationToken`] that propagates
    /// through the entire pipeline (ingestor, workers, emitter, metrics reporter).
    pub fn new(config: PipelineConfig, prober: Arc<dyn Prober>) -> Self {
        let shutdown = CancellationToken::new();
        let checker = HeadChecker::with_cancellation_token(config, prober, shutdown.clone());
        Self { checker, shutdown }
    }

    pub fn with_http_prober(config: PipelineConfig) -> Result<Self> {
        let prober = HttpProber::from_config(&config)?;
        Ok(Self::new(config, Arc::new(prober)))
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs one check to completion, or until the root token is cancelled elsewhere.
    pub async fn run<R, W>(&mut self, input: R, output: W) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send,
    {
        let result = self.checker.run(input, output).await;
        if self.shutdown.is_cancelled() {
            self.reinitialize_shutdown_token();
        }
        result
    }

    /// Runs one check and interrupts it on Ctrl-C (SIGINT).
    ///
    /// Results already in order are still written before this returns, and an interruption is
    /// reported through [`RunSummary::interrupted`] rather than as an error.
    pub async fn run_until_ctrl_c<R, W>(&mut self, input: R, output: W) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send,
    {
        let shutdown = self.shutdown.clone();
        let result = {
            let run = self.checker.run(input, output);
            tokio::pin!(run);

            tokio::select! {
                result = &mut run => result,
                signal = signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("Ctrl-C received; flushing ordered results and stopping");
                            shutdown.cancel();
                        }
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                "failed to listen for Ctrl-C; running to completion"
                            );
                        }
                    }
                    run.as_mut().await
                }
            }
        };

        if self.shutdown.is_cancelled() {
            self.reinitialize_shutdown_token();
        }
        result
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.checker.replace_shutdown_root(self.shutdown.clone());
    }
}
