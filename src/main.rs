use anyhow::{Context, Result};
use clap::Parser;
use headcheck::pipeline::reorder::DEFAULT_REORDER_WINDOW;
use headcheck::probe::options::DEFAULT_PROBE_TIMEOUT_SECS;
use headcheck::runtime::telemetry::DEFAULT_METRICS_INTERVAL;
use headcheck::{init_tracing, OutputStyle, PipelineConfig, Runner};
use std::ffi::OsString;
use std::time::Duration;
use tokio::io::BufReader;

/// Check the HTTP status of every URL read from stdin, writing results in input order.
#[derive(Debug, Parser)]
#[command(name = "headcheck", version, about)]
struct Cli {
    /// Number of concurrent probes [default: available parallelism]
    #[arg(short = 'j', long, env = "HEADCHECK_JOBS")]
    jobs: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, env = "HEADCHECK_TIMEOUT", default_value_t = DEFAULT_PROBE_TIMEOUT_SECS)]
    timeout: u64,

    /// Maximum URLs read ahead of the oldest unwritten result
    #[arg(long, env = "HEADCHECK_WINDOW", default_value_t = DEFAULT_REORDER_WINDOW)]
    window: usize,

    /// Status column format: `code` (200) or `reason` (200 OK)
    #[arg(long, env = "HEADCHECK_STYLE", default_value_t = OutputStyle::Code)]
    style: OutputStyle,

    /// Seconds between debug-level metrics snapshots
    #[arg(
        long,
        env = "HEADCHECK_METRICS_INTERVAL",
        default_value_t = DEFAULT_METRICS_INTERVAL.as_secs()
    )]
    metrics_interval: u64,
}

impl Cli {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder()
            .probe_timeout(Duration::from_secs(self.timeout))
            .reorder_window(self.window)
            .output_style(self.style)
            .metrics_interval(Duration::from_secs(self.metrics_interval));
        if let Some(jobs) = self.jobs {
            builder = builder.jobs(jobs);
        }
        builder.build().context("invalid configuration")
    }
}

/// Rewrites the single-dash `-timeout` spelling into `--timeout` so both are accepted.
fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            if passthrough {
                return arg;
            }
            match arg.to_str() {
                Some("--") => {
                    passthrough = true;
                    arg
                }
                Some("-timeout") => OsString::from("--timeout"),
                Some(value) if value.starts_with("-timeout=") => {
                    OsString::from(format!("-{value}"))
                }
                _ => arg,
            }
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args_os()));
    init_tracing();
    let config = cli.into_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(async move {
        let mut runner = Runner::with_http_prober(config)?;
        let input = BufReader::new(tokio::io::stdin());
        runner.run_until_ctrl_c(input, tokio::io::stdout()).await
    });

    // Stdin reads run on a blocking thread that cannot be interrupted; do not wait for it.
    runtime.shutdown_background();

    let summary = result?;
    if summary.interrupted {
        tracing::info!(
            emitted = summary.emitted,
            submitted = summary.submitted,
            "run interrupted before all urls were written"
        );
    }
    Ok(())
}
