//! Fixed-size pool of probe workers.
//!
//! Workers share one intake receiver, so at most `jobs` probes are ever in flight. Each
//! completion is forwarded to the reorder buffer's channel; a worker that errors or panics
//! aborts the whole run through the coordinator.

use crate::probe::{ProbeError, ProbeOutcome, Prober, Submission};
use crate::runtime::coordinator::Coordinator;
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type SharedIntake = Arc<Mutex<mpsc::Receiver<Submission>>>;

pub(crate) struct WorkerPool {
    jobs: usize,
    probe_timeout: Duration,
    prober: Arc<dyn Prober>,
    telemetry: Arc<Telemetry>,
    workers: Vec<JoinHandle<()>>,
}

pub(crate) struct WorkerPoolParams {
    pub jobs: usize,
    pub probe_timeout: Duration,
    pub prober: Arc<dyn Prober>,
    pub telemetry: Arc<Telemetry>,
}

impl WorkerPool {
    pub(crate) fn new(params: WorkerPoolParams) -> Self {
        Self {
            jobs: params.jobs.max(1),
            probe_timeout: params.probe_timeout,
            prober: params.prober,
            telemetry: params.telemetry,
            workers: Vec::new(),
        }
    }

    /// Spawns `jobs` workers pulling from `intake` and reporting on `completions`.
    pub(crate) fn launch(
        &mut self,
        intake: mpsc::Receiver<Submission>,
        completions: mpsc::Sender<ProbeOutcome>,
        coordinator: Coordinator,
    ) {
        self.workers.clear();
        let intake: SharedIntake = Arc::new(Mutex::new(intake));

        for worker_id in 0..self.jobs {
            let worker = Worker {
                id: worker_id,
                intake: intake.clone(),
                completions: completions.clone(),
                prober: self.prober.clone(),
                telemetry: self.telemetry.clone(),
                probe_timeout: self.probe_timeout,
                shutdown: coordinator.shutdown_token(),
            };
            let coordinator = coordinator.clone();
            // Holds the completion channel open until a failure has been recorded.
            let completions_open = completions.clone();

            let handle = tokio::spawn(async move {
                let result = std::panic::AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::error!(
                            worker = worker_id,
                            error = %err,
                            "worker task exited with error"
                        );
                        let context = format!("worker {worker_id} exited with error");
                        let err = err.context(context.clone());
                        let _ = coordinator.abort(context.as_str(), err);
                    }
                    Err(panic_payload) => {
                        let panic_msg = panic_message(panic_payload.as_ref());
                        tracing::error!(
                            worker = worker_id,
                            panic = %panic_msg,
                            "worker task panicked"
                        );
                        let context = format!("worker {worker_id} panicked");
                        let panic_error =
                            anyhow::anyhow!("worker {worker_id} panicked: {panic_msg}");
                        let _ = coordinator.abort(context.as_str(), panic_error);
                    }
                }
                drop(completions_open);
            });

            self.workers.push(handle);
        }

        tracing::debug!(jobs = self.jobs, "worker pool launched");
    }

    /// Waits for every worker to exit. Workers stop once the shutdown token is cancelled or the
    /// intake is closed and drained.
    pub(crate) async fn shutdown(&mut self) {
        let handles = std::mem::take(&mut self.workers);
        for (worker_id, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(err) = result {
                tracing::warn!(worker = worker_id, error = %err, "worker task failed to join");
            }
        }
    }
}

struct Worker {
    id: usize,
    intake: SharedIntake,
    completions: mpsc::Sender<ProbeOutcome>,
    prober: Arc<dyn Prober>,
    telemetry: Arc<Telemetry>,
    probe_timeout: Duration,
    shutdown: CancellationToken,
}

impl Worker {
    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id))]
    async fn run(self) -> Result<()> {
        tracing::debug!(worker = self.id, "worker task started");
        let shutdown = self.shutdown.clone();

        loop {
            let submission = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = next_submission(&self.intake) => match next {
                    Some(submission) => submission,
                    None => {
                        tracing::debug!(worker = self.id, "intake closed; exiting worker loop");
                        break;
                    }
                },
            };

            let seq = submission.seq();
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!(
                        worker = self.id,
                        seq,
                        "shutdown requested mid-probe; abandoning"
                    );
                    break;
                }
                outcome = self.probe(submission) => outcome,
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = self.completions.send(outcome) => {
                    if sent.is_err() {
                        tracing::debug!(worker = self.id, "completion channel closed; exiting worker loop");
                        break;
                    }
                }
            }
        }

        tracing::debug!(worker = self.id, "worker task stopped");
        Ok(())
    }

    async fn probe(&self, submission: Submission) -> ProbeOutcome {
        let _in_flight = self.telemetry.enter_probe();
        let result = tokio::time::timeout(self.probe_timeout, self.prober.probe(submission.url()))
            .await
            .unwrap_or_else(|_| {
                Err(ProbeError::Timeout {
                    after: self.probe_timeout,
                })
            });

        if let Err(err) = &result {
            if err.is_timeout() {
                self.telemetry.record_probe_timeout();
            } else {
                self.telemetry.record_probe_failure();
            }
            tracing::warn!(
                worker = self.id,
                seq = submission.seq(),
                url = submission.url(),
                error = %err,
                "probe failed"
            );
        }

        ProbeOutcome::new(submission, result)
    }
}

async fn next_submission(intake: &SharedIntake) -> Option<Submission> {
    intake.lock().await.recv().await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
