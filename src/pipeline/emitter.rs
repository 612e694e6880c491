use crate::probe::ProbeOutcome;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use std::fmt;
use std::io::ErrorKind;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Status column written for a probe that never received a response.
pub const SENTINEL: &str = "???";

/// How the status column of a result line is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStyle {
    /// Bare numeric code, e.g. `404`.
    #[default]
    Code,
    /// Code followed by its canonical reason phrase, e.g. `404 Not Found`.
    Reason,
}

impl OutputStyle {
    pub fn render_status(self, outcome: &ProbeOutcome) -> String {
        let Some(code) = outcome.status() else {
            return SENTINEL.to_string();
        };

        match self {
            OutputStyle::Code => code.to_string(),
            OutputStyle::Reason => match StatusCode::from_u16(code)
                .ok()
                .and_then(|status| status.canonical_reason())
            {
                Some(reason) => format!("{code} {reason}"),
                None => code.to_string(),
            },
        }
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStyle::Code => f.write_str("code"),
            OutputStyle::Reason => f.write_str("reason"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStyleError {
    input: String,
}

impl fmt::Display for ParseStyleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown output style {:?} (expected \"code\" or \"reason\")",
            self.input
        )
    }
}

impl std::error::Error for ParseStyleError {}

impl FromStr for OutputStyle {
    type Err = ParseStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(OutputStyle::Code),
            "reason" => Ok(OutputStyle::Reason),
            _ => Err(ParseStyleError {
                input: s.to_string(),
            }),
        }
    }
}

/// Formats one result line, without the trailing newline.
pub fn render_line(outcome: &ProbeOutcome, style: OutputStyle) -> String {
    format!("{}\t{}", style.render_status(outcome), outcome.url())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EmitSummary {
    pub emitted: u64,
    pub failed: u64,
    /// The reader went away (broken pipe) before the stream ended.
    pub output_closed: bool,
}

/// Writes ordered outcomes to the output sink, one flushed line per outcome.
pub(crate) struct Emitter<W> {
    writer: BufWriter<W>,
    style: OutputStyle,
    telemetry: Arc<Telemetry>,
}

impl<W> Emitter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(writer: W, style: OutputStyle, telemetry: Arc<Telemetry>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            style,
            telemetry,
        }
    }

    pub(crate) async fn run<S>(&mut self, outcomes: S) -> Result<EmitSummary>
    where
        S: Stream<Item = ProbeOutcome>,
    {
        let mut summary = EmitSummary::default();
        futures::pin_mut!(outcomes);

        while let Some(outcome) = outcomes.next().await {
            let line = render_line(&outcome, self.style);
            match self.write_line(&line).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    tracing::debug!(seq = outcome.seq(), "output closed by reader");
                    summary.output_closed = true;
                    return Ok(summary);
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to write result for {}", outcome.url())
                    });
                }
            }

            summary.emitted += 1;
            if outcome.is_failure() {
                summary.failed += 1;
            }
            self.telemetry.record_emitted(1);
        }

        Ok(summary)
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}
