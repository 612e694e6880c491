use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::support::helpers::{check, config, init_tracing, lines, Reply, ScriptedProber};
use anyhow::Result;
use headcheck::PipelineConfig;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn results_follow_input_order_not_completion_order() -> Result<()> {
    init_tracing();
    let prober = ScriptedProber::new()
        .status("http://a", 60, 200)
        .status("http://b", 5, 404)
        .reply("http://c", 30, Reply::Refused);

    let (output, summary) = check(config(3), Arc::new(prober), "http://a\nhttp://b\nhttp://c\n").await?;

    assert_eq!(output, "200\thttp://a\n404\thttp://b\n???\thttp://c\n");
    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.emitted, 3);
    assert_eq!(summary.failed, 1);
    assert!(!summary.interrupted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded_by_jobs() -> Result<()> {
    init_tracing();
    let mut prober = ScriptedProber::new();
    let mut input = String::new();
    for i in 0..20 {
        let url = format!("http://host/{i}");
        prober = prober.status(&url, 20, 200 + i);
        input.push_str(&url);
        input.push('\n');
    }
    let prober = Arc::new(prober);

    let (output, summary) = check(config(4), prober.clone(), &input).await?;

    assert!(prober.peak_concurrency() <= 4, "peak {}", prober.peak_concurrency());
    assert_eq!(prober.calls(), 20);
    assert_eq!(summary.emitted, 20);
    let expected: Vec<String> = (0..20)
        .map(|i| format!("{}\thttp://host/{i}", 200 + i))
        .collect();
    assert_eq!(lines(&output), expected);
    Ok(())
}

// Single-threaded so each worker picks its script in the same poll that receives its
// submission; script order then matches submission order.
#[tokio::test]
async fn duplicate_urls_keep_their_own_results() -> Result<()> {
    init_tracing();
    let prober = ScriptedProber::new()
        .status("http://x", 40, 500)
        .status("http://x", 5, 200)
        .status("http://y", 10, 404);

    let (output, summary) =
        check(config(3), Arc::new(prober), "http://x\nhttp://y\nhttp://x\n").await?;

    assert_eq!(output, "500\thttp://x\n404\thttp://y\n200\thttp://x\n");
    assert_eq!(summary.emitted, 3);
    Ok(())
}

#[tokio::test]
async fn empty_input_terminates_with_no_output() -> Result<()> {
    init_tracing();
    let prober = Arc::new(ScriptedProber::new());

    let (output, summary) = timeout(Duration::from_secs(2), check(config(2), prober.clone(), ""))
        .await
        .expect("empty input should terminate promptly")?;

    assert!(output.is_empty());
    assert_eq!(summary.submitted, 0);
    assert_eq!(summary.emitted, 0);
    assert_eq!(prober.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn blank_lines_are_reported_as_failures() -> Result<()> {
    init_tracing();
    let (output, summary) = check(
        config(2),
        Arc::new(ScriptedProber::new()),
        "http://a\n\nhttp://b",
    )
    .await?;

    assert_eq!(output, "200\thttp://a\n???\t\n200\thttp://b\n");
    assert_eq!(summary.failed, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hanging_probe_is_cut_off_by_the_deadline() -> Result<()> {
    init_tracing();
    let prober = ScriptedProber::new()
        .reply("http://stall", 0, Reply::Stall)
        .status("http://fast", 0, 204);
    let config = PipelineConfig::builder()
        .jobs(2)
        .probe_timeout(Duration::from_millis(150))
        .build()?;

    let started = Instant::now();
    let (output, summary) = timeout(
        Duration::from_secs(3),
        check(config, Arc::new(prober), "http://stall\nhttp://fast\n"),
    )
    .await
    .expect("timeout should let the run terminate")?;

    assert_eq!(output, "???\thttp://stall\n204\thttp://fast\n");
    assert_eq!(summary.failed, 1);
    assert!(started.elapsed() >= Duration::from_millis(150));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn window_of_one_still_drains_in_order() -> Result<()> {
    init_tracing();
    let mut prober = ScriptedProber::new();
    let mut input = String::new();
    for i in 0..10u64 {
        let url = format!("http://w/{i}");
        prober = prober.status(&url, (10 - i) * 3, 200);
        input.push_str(&url);
        input.push('\n');
    }
    let prober = Arc::new(prober);
    let config = PipelineConfig::builder()
        .jobs(4)
        .reorder_window(1)
        .probe_timeout(Duration::from_secs(2))
        .build()?;

    let (output, summary) = timeout(Duration::from_secs(5), check(config, prober.clone(), &input))
        .await
        .expect("a window of one must not deadlock")?;

    let expected: Vec<String> = (0..10).map(|i| format!("200\thttp://w/{i}")).collect();
    assert_eq!(lines(&output), expected);
    assert_eq!(summary.emitted, 10);
    assert_eq!(prober.peak_concurrency(), 1, "window bounds outstanding probes");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_final_completions_terminate_once() -> Result<()> {
    init_tracing();
    for round in 0..40 {
        let prober = ScriptedProber::new()
            .status("http://left", 2, 200)
            .status("http://right", 2, 201);

        let (output, summary) = timeout(
            Duration::from_secs(2),
            check(config(2), Arc::new(prober), "http://left\nhttp://right\n"),
        )
        .await
        .unwrap_or_else(|_| panic!("round {round} did not terminate"))?;

        assert_eq!(output, "200\thttp://left\n201\thttp://right\n");
        assert_eq!(summary.emitted, summary.submitted);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn large_input_keeps_order_under_jitter() -> Result<()> {
    init_tracing();
    let mut prober = ScriptedProber::new();
    let mut input = String::new();
    for i in 0..400u64 {
        let url = format!("http://jitter/{i}");
        prober = prober.status(&url, (i * 7) % 13, 200 + (i % 3) as u16);
        input.push_str(&url);
        input.push('\n');
    }
    let config = PipelineConfig::builder()
        .jobs(16)
        .reorder_window(32)
        .probe_timeout(Duration::from_secs(2))
        .build()?;

    let (output, summary) = check(config, Arc::new(prober), &input).await?;

    assert_eq!(summary.emitted, 400);
    for (i, line) in lines(&output).into_iter().enumerate() {
        assert_eq!(line, format!("{}\thttp://jitter/{i}", 200 + (i % 3)));
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_panic_aborts_the_run() -> Result<()> {
    init_tracing();
    let prober = ScriptedProber::new()
        .status("http://fine", 0, 200)
        .reply("http://explode", 0, Reply::Panic);

    let err = timeout(
        Duration::from_secs(2),
        check(config(2), Arc::new(prober), "http://fine\nhttp://explode\nhttp://never\n"),
    )
    .await
    .expect("a panic should stop the run")
    .expect_err("a worker panic is fatal");

    let message = format!("{err:#}");
    assert!(
        message.contains("url check pipeline aborted"),
        "unexpected error: {message}"
    );
    assert!(message.contains("scripted panic"), "unexpected error: {message}");
    Ok(())
}
