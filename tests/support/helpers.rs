use std::{
    collections::{HashMap, VecDeque},
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::Result;
use headcheck::{
    HeadChecker, PipelineConfig, ProbeError, ProbeFuture, Prober, RunSummary, StatusOutcome,
};
use once_cell::sync::Lazy;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

#[derive(Clone, Copy)]
pub enum Reply {
    Status(u16),
    Refused,
    Stall,
    Panic,
}

#[derive(Clone, Copy)]
struct Script {
    delay: Duration,
    reply: Reply,
}

/// Prober stub driven by per-URL scripts. Repeated URLs consume their scripts in call order;
/// unscripted URLs answer 200 immediately.
#[derive(Default)]
pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, url: &str, delay_ms: u64, reply: Reply) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Script {
                delay: Duration::from_millis(delay_ms),
                reply,
            });
        self
    }

    pub fn status(self, url: &str, delay_ms: u64, code: u16) -> Self {
        self.reply(url, delay_ms, Reply::Status(code))
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_script(&self, url: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Script {
                delay: Duration::ZERO,
                reply: Reply::Status(200),
            })
    }
}

struct ActiveCall<'a> {
    current: &'a AtomicUsize,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Prober for ScriptedProber {
    fn probe<'a>(&'a self, url: &'a str) -> ProbeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _active = ActiveCall {
                current: &self.current,
            };

            if url.is_empty() {
                return Err(ProbeError::EmptyUrl);
            }

            let script = self.next_script(url);
            sleep(script.delay).await;
            match script.reply {
                Reply::Status(code) => Ok(StatusOutcome::new(code)),
                Reply::Refused => Err(ProbeError::InvalidUrl {
                    url: url.to_string(),
                    reason: "rejected by script".to_string(),
                }),
                Reply::Stall => futures::future::pending().await,
                Reply::Panic => panic!("scripted panic for {url}"),
            }
        })
    }
}

pub fn config(jobs: usize) -> PipelineConfig {
    PipelineConfig::builder()
        .jobs(jobs)
        .probe_timeout(Duration::from_secs(2))
        .build()
        .expect("test config should validate")
}

/// Runs a checker over `input` and returns what it wrote.
pub async fn check(
    config: PipelineConfig,
    prober: Arc<dyn Prober>,
    input: &str,
) -> Result<(String, RunSummary)> {
    let checker = HeadChecker::new(config, prober);
    let mut output = Vec::new();
    let summary = checker
        .run(Cursor::new(input.as_bytes().to_vec()), &mut output)
        .await?;
    Ok((String::from_utf8(output)?, summary))
}

pub fn lines(output: &str) -> Vec<&str> {
    output.lines().collect()
}
