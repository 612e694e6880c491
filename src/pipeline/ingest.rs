use crate::pipeline::reorder::ReorderBuffer;
use crate::probe::Submission;
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Reads one URL per line and hands each to the worker pool.
///
/// Every line is registered with the reorder buffer before it is queued, so the buffer knows the
/// submission order regardless of which worker finishes first. Blank lines are submitted too;
/// they fail to probe and still produce a line of output.
pub(crate) struct Ingestor<R> {
    reader: R,
    buffer: Arc<ReorderBuffer>,
    intake: mpsc::Sender<Submission>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl<R> Ingestor<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub(crate) fn new(
        reader: R,
        buffer: Arc<ReorderBuffer>,
        intake: mpsc::Sender<Submission>,
        telemetry: Arc<Telemetry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader,
            buffer,
            intake,
            telemetry,
            shutdown,
        }
    }

    /// Runs until end of input, a read error, or cancellation. Returns the number of submissions.
    pub(crate) async fn run(self) -> Result<u64> {
        let Self {
            mut reader,
            buffer,
            intake,
            telemetry,
            shutdown,
        } = self;

        let mut submitted = 0u64;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!(submitted, "shutdown requested; ingestion stopped");
                    break;
                }
                read = reader.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        submitted,
                        error = %err,
                        "failed to read input; treating as end of input"
                    );
                    break;
                }
            }

            let url = String::from_utf8_lossy(&line).trim_end().to_string();

            let submission = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                registered = buffer.register(url) => registered?,
            };
            telemetry.record_submitted();
            submitted += 1;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = intake.send(submission) => {
                    if sent.is_err() {
                        tracing::debug!(submitted, "intake closed; ingestion stopped");
                        break;
                    }
                }
            }
        }

        // End of input is recorded before the intake closes so the completion channel never
        // closes on a buffer that still expects submissions.
        buffer.close_input().await;
        drop(intake);

        tracing::debug!(submitted, "input exhausted");
        Ok(submitted)
    }
}
